//! Organizers: units that run other units in order over one state.

use crate::contract::Contract;
use crate::error::UnitError;
use crate::hooks::HookChain;
use crate::state::State;
use crate::unit::{run_strict, Unit, UnitName};
use std::fmt;
use std::rc::Rc;
use tracing::debug;

type UnitFactory = Rc<dyn Fn() -> Box<dyn Unit>>;

/// A unit that runs a declared list of units in order over one state.
///
/// Each run constructs fresh instances of the declared units. Because an
/// organizer is itself a [`Unit`], organizers nest freely: every unit of the
/// tree lands in the same ledger, so a failure anywhere unwinds everything
/// that completed before it, newest first.
///
/// # Examples
///
/// ```
/// use tsunagi::prelude::*;
///
/// define_unit!(Reserve);
/// impl Unit for Reserve {
///     fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
///         state.set("reserved", true);
///         Ok(())
///     }
/// }
///
/// define_unit!(Ship);
/// impl Unit for Ship {
///     fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
///         Err(state.fail())
///     }
/// }
///
/// let checkout = Organizer::builder("Checkout")
///     .add::<Reserve>()
///     .add::<Ship>()
///     .build();
///
/// let outcome = checkout.invoke(Attributes::new())?;
/// assert!(outcome.is_failure());
/// assert_eq!(outcome.state().audit().rolled_back(), vec!["Reserve"]);
/// # Ok::<(), UnitError>(())
/// ```
#[derive(Clone)]
pub struct Organizer {
    name: UnitName,
    units: Vec<(UnitName, UnitFactory)>,
    contract: Contract,
    hooks: HookChain,
}

impl fmt::Debug for Organizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Organizer")
            .field("name", &self.name)
            .field("units", &self.unit_names().collect::<Vec<_>>())
            .finish()
    }
}

impl Organizer {
    /// Creates a new organizer builder.
    pub fn builder(name: impl Into<UnitName>) -> OrganizerBuilder {
        OrganizerBuilder::new(name)
    }

    /// Returns the declared unit names, in run order.
    pub fn unit_names(&self) -> impl Iterator<Item = &UnitName> {
        self.units.iter().map(|(name, _)| name)
    }

    /// Returns the number of declared units.
    pub fn unit_count(&self) -> usize {
        self.units.len()
    }
}

impl Unit for Organizer {
    fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
        for (name, factory) in &self.units {
            debug!("Organizer '{}' running '{}'", self.name, name);
            run_strict(factory(), state)?;
        }
        Ok(())
    }

    fn name(&self) -> UnitName {
        self.name.clone()
    }

    fn contract(&self) -> Contract {
        self.contract.clone()
    }

    fn hooks(&self) -> HookChain {
        self.hooks.clone()
    }
}

/// Builder for constructing [`Organizer`] instances.
pub struct OrganizerBuilder {
    name: UnitName,
    units: Vec<(UnitName, UnitFactory)>,
    contract: Contract,
    hooks: HookChain,
}

impl OrganizerBuilder {
    /// Creates a new empty organizer builder.
    pub fn new(name: impl Into<UnitName>) -> Self {
        Self {
            name: name.into(),
            units: Vec::new(),
            contract: Contract::default(),
            hooks: HookChain::default(),
        }
    }

    /// Adds a unit type, default-constructed on every run.
    pub fn add<U: Unit + Default>(mut self) -> Self {
        let name = U::default().name();
        self.units
            .push((name, Rc::new(|| Box::new(U::default()) as Box<dyn Unit>)));
        self
    }

    /// Adds a unit instance, cloned on every run.
    ///
    /// Use this to nest another [`Organizer`].
    pub fn add_unit<U: Unit + Clone>(mut self, unit: U) -> Self {
        let name = unit.name();
        self.units.push((
            name,
            Rc::new(move || Box::new(unit.clone()) as Box<dyn Unit>),
        ));
        self
    }

    /// Adds a unit built by `factory` on every run.
    pub fn add_with<F>(mut self, name: impl Into<UnitName>, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Unit> + 'static,
    {
        self.units.push((name.into(), Rc::new(factory)));
        self
    }

    /// Sets the organizer's own input/output contract.
    pub fn contract(mut self, contract: Contract) -> Self {
        self.contract = contract;
        self
    }

    /// Sets the hooks wrapped around the whole organized run.
    pub fn hooks(mut self, hooks: HookChain) -> Self {
        self.hooks = hooks;
        self
    }

    /// Builds the organizer.
    pub fn build(self) -> Organizer {
        Organizer {
            name: self.name,
            units: self.units,
            contract: self.contract,
            hooks: self.hooks,
        }
    }
}
