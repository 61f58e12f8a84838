use crate::state::{State, StateKey};
use crate::unit::UnitName;
use std::fmt;
use thiserror::Error;

/// Which side of a unit's contract a value belongs to.
///
/// Every [`ContractViolation`] is built from one of these, so the set of
/// violation kinds stays closed and is resolved at compile time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// A value the unit reads from the state before running.
    Input,
    /// A value the unit must leave in the state after running.
    Output,
}

impl Direction {
    /// Builds the "missing" violation for this side of the contract.
    pub fn missing(self, unit: UnitName, key: StateKey) -> ContractViolation {
        match self {
            Direction::Input => ContractViolation::MissingInput { unit, key },
            Direction::Output => ContractViolation::MissingOutput { unit, key },
        }
    }

    /// Builds the type mismatch violation for this side of the contract.
    pub fn mismatch(self, unit: UnitName, key: StateKey, expected: &'static str) -> ContractViolation {
        ContractViolation::TypeMismatch {
            unit,
            key,
            direction: self,
            expected,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Input => write!(f, "input"),
            Direction::Output => write!(f, "output"),
        }
    }
}

/// A declared input or output was absent or had the wrong type.
///
/// Contract violations are never swallowed: they escape both
/// [`call`](crate::UnitExt::call) and [`call_strict`](crate::UnitExt::call_strict).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContractViolation {
    /// A required input was not present when the unit started.
    #[error("unit '{unit}' is missing required input '{key}'")]
    MissingInput {
        /// The unit whose contract was violated.
        unit: UnitName,
        /// The missing key.
        key: StateKey,
    },

    /// A required output was not present when the unit finished.
    #[error("unit '{unit}' did not produce required output '{key}'")]
    MissingOutput {
        /// The unit whose contract was violated.
        unit: UnitName,
        /// The missing key.
        key: StateKey,
    },

    /// A value was present but did not match its declared type.
    #[error("unit '{unit}' expected {direction} '{key}' to be {expected}")]
    TypeMismatch {
        /// The unit whose contract was violated.
        unit: UnitName,
        /// The offending key.
        key: StateKey,
        /// Whether the value was checked as an input or an output.
        direction: Direction,
        /// Name of the declared type.
        expected: &'static str,
    },
}

impl ContractViolation {
    /// Returns the unit whose contract was violated.
    pub fn unit(&self) -> &UnitName {
        match self {
            ContractViolation::MissingInput { unit, .. }
            | ContractViolation::MissingOutput { unit, .. }
            | ContractViolation::TypeMismatch { unit, .. } => unit,
        }
    }

    /// Returns the key the violation is about.
    pub fn key(&self) -> &StateKey {
        match self {
            ContractViolation::MissingInput { key, .. }
            | ContractViolation::MissingOutput { key, .. }
            | ContractViolation::TypeMismatch { key, .. } => key,
        }
    }
}

/// Errors raised while a unit, a hook or a rollback runs.
///
/// # Non-Exhaustive
///
/// Always include a wildcard arm when matching:
///
/// ```
/// use tsunagi::UnitError;
///
/// fn describe(error: &UnitError) -> &'static str {
///     match error {
///         UnitError::Failed => "business failure",
///         UnitError::Contract(_) => "contract violation",
///         UnitError::Fault(_) => "unexpected fault",
///         _ => "other",
///     }
/// }
/// ```
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum UnitError {
    /// The expected business failure signal.
    ///
    /// Produced by [`State::fail`] and [`State::fail_with`]; the only error
    /// that [`call`](crate::UnitExt::call) swallows.
    #[error("unit failed")]
    Failed,

    /// A declared input or output contract was violated.
    #[error(transparent)]
    Contract(#[from] ContractViolation),

    /// Any other error raised by core logic or a hook.
    #[error("unexpected fault: {0}")]
    Fault(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// The unwind that followed `cause` had failing compensations.
    #[error("{cause}; {} rollback(s) also failed", .failures.len())]
    RollbackFailed {
        /// The error that started the unwind.
        #[source]
        cause: Box<UnitError>,
        /// Every compensation that failed, in unwind order.
        failures: Vec<CompensationError>,
    },
}

impl UnitError {
    /// Wraps an arbitrary error as an unexpected fault.
    pub fn fault(error: impl Into<Box<dyn std::error::Error + Send + Sync>>) -> Self {
        UnitError::Fault(error.into())
    }

    /// Returns `true` for the business failure signal.
    pub fn is_failure(&self) -> bool {
        matches!(self, UnitError::Failed)
    }

    /// Returns the violation if this is a contract error.
    pub fn as_contract(&self) -> Option<&ContractViolation> {
        match self {
            UnitError::Contract(violation) => Some(violation),
            _ => None,
        }
    }
}

/// A single compensation that failed during an unwind.
#[derive(Debug, Error)]
#[error("rollback failed for unit '{unit}': {source}")]
pub struct CompensationError {
    /// Name of the unit whose rollback failed.
    pub unit: UnitName,
    /// The error the rollback returned.
    #[source]
    pub source: UnitError,
}

/// Aggregate of every compensation that failed during one unwind.
#[derive(Debug, Error)]
#[error("{} rollback(s) failed", .failures.len())]
pub struct RollbackError {
    /// Failed compensations, in unwind order.
    pub failures: Vec<CompensationError>,
}

impl RollbackError {
    /// Consumes the aggregate, returning the individual failures.
    pub fn into_failures(self) -> Vec<CompensationError> {
        self.failures
    }
}

/// The business failure signal at the strict call boundary.
///
/// Carries the state as it was when the pipeline failed, after rollback.
#[derive(Debug)]
pub struct Failure {
    state: State,
}

impl Failure {
    pub(crate) fn new(state: State) -> Self {
        Self { state }
    }

    /// Returns the failed state.
    pub fn state(&self) -> &State {
        &self.state
    }

    /// Consumes the failure, returning the failed state.
    pub fn into_state(self) -> State {
        self.state
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pipeline failed with status '{}'", self.state.status())
    }
}

impl std::error::Error for Failure {}

/// Errors returned by [`call_strict`](crate::UnitExt::call_strict).
#[derive(Debug, Error)]
pub enum CallError {
    /// The pipeline raised the business failure signal.
    #[error(transparent)]
    Failed(Failure),

    /// Any other error; these escape the non-strict entry point too.
    #[error(transparent)]
    Unit(#[from] UnitError),
}

impl CallError {
    /// Returns the business failure, if that is what this error is.
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            CallError::Failed(failure) => Some(failure),
            CallError::Unit(_) => None,
        }
    }

    /// Returns the underlying unit error, if this is not a business failure.
    pub fn unit_error(&self) -> Option<&UnitError> {
        match self {
            CallError::Failed(_) => None,
            CallError::Unit(error) => Some(error),
        }
    }
}
