//! The unit trait and the execution protocol around it.

use crate::contract::Contract;
use crate::error::{CallError, Failure, UnitError};
use crate::hooks::HookChain;
use crate::state::State;
use std::fmt::{self, Debug};
use tracing::{debug, debug_span, info, warn};

/// Type-safe unit name wrapper.
///
/// # Examples
///
/// ```
/// use tsunagi::UnitName;
///
/// let name = UnitName::new("ChargeCard");
/// assert_eq!(name.as_str(), "ChargeCard");
///
/// let name: UnitName = "ShipOrder".into();
/// assert_eq!(name.to_string(), "ShipOrder");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UnitName(String);

impl UnitName {
    /// Creates a new UnitName.
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    /// Creates a UnitName from a type's name (extracts last segment)
    pub fn from_type_name<T: ?Sized>() -> Self {
        let full_name = std::any::type_name::<T>();
        let short_name = full_name.split("::").last().unwrap_or("UnknownUnit");
        Self::new(short_name)
    }

    /// Returns the unit name as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UnitName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for UnitName {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for UnitName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for UnitName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl PartialEq<&str> for UnitName {
    fn eq(&self, other: &&str) -> bool {
        self.0 == *other
    }
}

/// A single step of business logic.
///
/// Every method has a default, so the smallest unit is an empty `impl`.
/// Units are run through [`run_strict`] (or one of the [`UnitExt`] entry
/// points); a unit that completes is moved into the state's ledger so its
/// [`rollback`](Unit::rollback) can be invoked if a later unit fails.
///
/// # Examples
///
/// ```
/// use tsunagi::prelude::*;
///
/// define_unit!(Greet);
///
/// impl Unit for Greet {
///     fn contract(&self) -> Contract {
///         Contract::new()
///             .input(Field::new("name").typed::<String>())
///             .output(Field::new("greeting").typed::<String>())
///     }
///
///     fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
///         let name = state.get::<String>("name").cloned().unwrap_or_default();
///         state.set("greeting", format!("Hello, {name}!"));
///         Ok(())
///     }
/// }
///
/// let outcome = Greet::call(Attributes::new().with("name", "Tsunagi".to_string()))?;
/// assert!(outcome.is_success());
/// assert_eq!(
///     outcome.state().get::<String>("greeting").map(String::as_str),
///     Some("Hello, Tsunagi!")
/// );
/// # Ok::<(), UnitError>(())
/// ```
pub trait Unit: Debug + 'static {
    /// Core logic. Defaults to doing nothing.
    ///
    /// Return `Err(state.fail())` to raise the business failure signal.
    fn execute(&mut self, state: &mut State) -> Result<(), UnitError> {
        let _ = state;
        Ok(())
    }

    /// Compensating action invoked when a later unit fails.
    ///
    /// Only called for units that completed. Defaults to doing nothing.
    fn rollback(&mut self, state: &mut State) -> Result<(), UnitError> {
        let _ = state;
        Ok(())
    }

    /// Returns the unit name.
    ///
    /// By default, uses the type name.
    fn name(&self) -> UnitName {
        UnitName::from_type_name::<Self>()
    }

    /// Declared inputs and outputs, checked before and after the core logic.
    fn contract(&self) -> Contract {
        Contract::default()
    }

    /// Hooks wrapped around the core logic.
    fn hooks(&self) -> HookChain {
        HookChain::default()
    }
}

/// What a non-strict call returns.
///
/// Both variants hold the final state; a business failure is never an error
/// at this boundary.
#[derive(Debug)]
pub enum Outcome {
    /// Every unit completed.
    Success(State),
    /// A unit raised the business failure signal and the ledger was unwound.
    Failure(State),
}

impl Outcome {
    /// Returns `true` if the pipeline succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns `true` if the pipeline raised the business failure.
    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    /// Returns the final state.
    pub fn state(&self) -> &State {
        match self {
            Outcome::Success(state) | Outcome::Failure(state) => state,
        }
    }

    /// Consumes the outcome, returning the final state.
    pub fn into_state(self) -> State {
        match self {
            Outcome::Success(state) | Outcome::Failure(state) => state,
        }
    }
}

/// Runs a unit over `state`, propagating every error.
///
/// Inside the unit's hook chain this checks the declared inputs, runs the
/// core logic, checks the declared outputs and appends the unit to the
/// ledger. After hooks run once the unit is ledgered, so an error they raise
/// compensates the unit too. If anything fails, the status becomes
/// `failure` and the whole ledger is unwound before the error is returned.
/// Because the unwind consumes the ledger, nested runs sharing one state
/// unwind it exactly once.
///
/// # Errors
///
/// Returns the error that stopped the unit, or
/// [`UnitError::RollbackFailed`] if the unwind that followed had failing
/// compensations.
pub fn run_strict(unit: Box<dyn Unit>, state: &mut State) -> Result<(), UnitError> {
    let name = unit.name();
    let span = debug_span!("unit", unit = %name);
    let _guard = span.enter();

    debug!("Running unit '{}'", name);
    let result = execute_guarded(unit, state).and_then(|()| {
        if state.is_failure() {
            Err(UnitError::Failed)
        } else {
            Ok(())
        }
    });

    result.map_err(|error| {
        warn!("Unit '{}' failed: {}", name, error);
        state.record_failure(&name);
        state.mark_failed();
        unwind(state, error)
    })
}

/// Runs a unit over `state`, swallowing the business failure signal.
///
/// # Errors
///
/// Returns every error [`run_strict`] returns except [`UnitError::Failed`].
pub fn run(unit: Box<dyn Unit>, state: &mut State) -> Result<(), UnitError> {
    match run_strict(unit, state) {
        Err(UnitError::Failed) => Ok(()),
        other => other,
    }
}

fn execute_guarded(unit: Box<dyn Unit>, state: &mut State) -> Result<(), UnitError> {
    let name = unit.name();
    let contract = unit.contract();
    let hooks = unit.hooks();
    let mut pending = Some(unit);

    hooks.run(state, &mut |state: &mut State| {
        // An around hook may call its continuation more than once; the core runs once.
        let Some(mut unit) = pending.take() else {
            return Ok(());
        };
        contract.check_inputs(&name, state)?;
        unit.execute(state)?;
        contract.check_outputs(&name, state)?;
        if state.is_failure() {
            return Err(UnitError::Failed);
        }
        state.mark_succeeded(unit);
        Ok(())
    })
}

fn unwind(state: &mut State, error: UnitError) -> UnitError {
    match state.rollback() {
        Ok(()) => error,
        Err(rollback_error) => UnitError::RollbackFailed {
            cause: Box::new(error),
            failures: rollback_error.into_failures(),
        },
    }
}

/// Top-level entry points, available on every [`Unit`].
///
/// Each call builds a fresh [`State`] from the given attributes (or takes an
/// existing one unchanged) and runs the unit over it.
pub trait UnitExt: Unit + Sized {
    /// Runs a default-constructed unit; never returns the business failure.
    ///
    /// # Errors
    ///
    /// Contract violations, faults and failed unwinds are always returned.
    fn call(attributes: impl Into<State>) -> Result<Outcome, UnitError>
    where
        Self: Default,
    {
        Self::default().invoke(attributes)
    }

    /// Runs a default-constructed unit, returning the business failure as
    /// [`CallError::Failed`].
    ///
    /// # Errors
    ///
    /// Returns [`CallError::Failed`] carrying the failed state, or
    /// [`CallError::Unit`] for every other error.
    fn call_strict(attributes: impl Into<State>) -> Result<State, CallError>
    where
        Self: Default,
    {
        Self::default().invoke_strict(attributes)
    }

    /// Instance form of [`call`](UnitExt::call).
    ///
    /// # Errors
    ///
    /// Same as [`call`](UnitExt::call).
    fn invoke(self, attributes: impl Into<State>) -> Result<Outcome, UnitError> {
        let mut state = State::build(attributes);
        match run_strict(Box::new(self), &mut state) {
            Ok(()) => {
                state.mark_success();
                info!("Pipeline finished successfully");
                Ok(Outcome::Success(state))
            }
            Err(UnitError::Failed) => {
                info!("Pipeline finished with a failure");
                Ok(Outcome::Failure(state))
            }
            Err(error) => Err(error),
        }
    }

    /// Instance form of [`call_strict`](UnitExt::call_strict).
    ///
    /// # Errors
    ///
    /// Same as [`call_strict`](UnitExt::call_strict).
    fn invoke_strict(self, attributes: impl Into<State>) -> Result<State, CallError> {
        let mut state = State::build(attributes);
        match run_strict(Box::new(self), &mut state) {
            Ok(()) => {
                state.mark_success();
                info!("Pipeline finished successfully");
                Ok(state)
            }
            Err(UnitError::Failed) => {
                info!("Pipeline finished with a failure");
                Err(CallError::Failed(Failure::new(state)))
            }
            Err(error) => Err(CallError::Unit(error)),
        }
    }
}

impl<U: Unit> UnitExt for U {}
