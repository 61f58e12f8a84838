//! Before, after and around hooks wrapped around a unit's core logic.

use crate::error::UnitError;
use crate::state::State;
use std::fmt;
use std::rc::Rc;

/// The continuation an around hook receives.
///
/// Calling it runs the next layer of the chain; not calling it skips the
/// core logic and every around hook declared after this one.
pub type Next<'a> = &'a mut dyn FnMut(&mut State) -> Result<(), UnitError>;

type HookFn = Rc<dyn Fn(&mut State) -> Result<(), UnitError>>;
type AroundFn =
    Rc<dyn Fn(&mut State, &mut dyn FnMut(&mut State) -> Result<(), UnitError>) -> Result<(), UnitError>>;

/// The position a hook takes relative to the core logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Runs before the core logic.
    Before,
    /// Runs after the core logic completed.
    After,
    /// Wraps the core logic.
    Around,
}

impl fmt::Display for HookKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookKind::Before => write!(f, "before"),
            HookKind::After => write!(f, "after"),
            HookKind::Around => write!(f, "around"),
        }
    }
}

#[derive(Clone)]
enum Hook {
    Before(HookFn),
    After(HookFn),
    Around(AroundFn),
}

impl Hook {
    fn kind(&self) -> HookKind {
        match self {
            Hook::Before(_) => HookKind::Before,
            Hook::After(_) => HookKind::After,
            Hook::Around(_) => HookKind::Around,
        }
    }
}

/// An ordered list of hooks attached to a unit type.
///
/// Execution order for a chain is: every `before` hook in declaration order,
/// then the around hooks wrapping the core logic (the first declared is the
/// outermost), then every `after` hook in reverse declaration order. The
/// first error aborts the rest of the chain.
///
/// Chains are append-only: a more specific unit starts from its parent's
/// chain with [`HookChain::inherit`] and adds to it.
///
/// # Examples
///
/// ```
/// use tsunagi::{HookChain, State, UnitError};
///
/// let hooks = HookChain::new()
///     .before(|state| {
///         state.set("started", true);
///         Ok(())
///     })
///     .around(|state, next| {
///         state.set("wrapped", true);
///         next(state)
///     })
///     .after(|state| {
///         state.set("finished", true);
///         Ok(())
///     });
///
/// let mut state = State::new();
/// hooks.run(&mut state, &mut |state: &mut State| {
///     state.set("core", true);
///     Ok(())
/// })?;
///
/// assert_eq!(state.get::<bool>("finished"), Some(&true));
/// # Ok::<(), UnitError>(())
/// ```
#[derive(Clone, Default)]
pub struct HookChain {
    hooks: Vec<Hook>,
}

impl fmt::Debug for HookChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookChain")
            .field("hooks", &self.kinds())
            .finish()
    }
}

impl HookChain {
    /// Creates an empty chain.
    pub fn new() -> Self {
        Self::default()
    }

    /// Copies a parent chain so it can be extended.
    pub fn inherit(parent: &HookChain) -> Self {
        parent.clone()
    }

    /// Appends a hook that runs before the core logic.
    pub fn before<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut State) -> Result<(), UnitError> + 'static,
    {
        self.hooks.push(Hook::Before(Rc::new(hook)));
        self
    }

    /// Appends a hook that runs after the core logic completed.
    pub fn after<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut State) -> Result<(), UnitError> + 'static,
    {
        self.hooks.push(Hook::After(Rc::new(hook)));
        self
    }

    /// Appends a hook that wraps the core logic.
    pub fn around<F>(mut self, hook: F) -> Self
    where
        F: Fn(&mut State, &mut dyn FnMut(&mut State) -> Result<(), UnitError>) -> Result<(), UnitError>
            + 'static,
    {
        self.hooks.push(Hook::Around(Rc::new(hook)));
        self
    }

    /// Returns the kind of every hook, in declaration order.
    pub fn kinds(&self) -> Vec<HookKind> {
        self.hooks.iter().map(Hook::kind).collect()
    }

    /// Returns the number of hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns `true` if the chain has no hooks.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    /// Runs `core` wrapped in this chain.
    ///
    /// # Errors
    ///
    /// Returns the first error raised by a hook or by `core`; nothing after
    /// it in the chain runs.
    pub fn run(&self, state: &mut State, core: Next<'_>) -> Result<(), UnitError> {
        for hook in &self.hooks {
            if let Hook::Before(before) = hook {
                before(state)?;
            }
        }

        let arounds: Vec<&AroundFn> = self
            .hooks
            .iter()
            .filter_map(|hook| match hook {
                Hook::Around(around) => Some(around),
                _ => None,
            })
            .collect();
        run_around(&arounds, state, core)?;

        for hook in self.hooks.iter().rev() {
            if let Hook::After(after) = hook {
                after(state)?;
            }
        }
        Ok(())
    }
}

fn run_around(arounds: &[&AroundFn], state: &mut State, core: Next<'_>) -> Result<(), UnitError> {
    match arounds.split_first() {
        None => core(state),
        Some((outer, inner)) => outer(state, &mut |state: &mut State| {
            run_around(inner, state, &mut *core)
        }),
    }
}
