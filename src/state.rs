//! Shared pipeline state: values, status and the rollback ledger.

use crate::audit::{AuditEvent, AuditLog};
use crate::error::{CompensationError, RollbackError, UnitError};
use crate::unit::{Unit, UnitName};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::fmt;
use std::time::Instant;
use tracing::{debug, warn};

/// Type-safe state key wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateKey(String);

impl StateKey {
    /// Creates a new StateKey.
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Returns the key as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StateKey {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for StateKey {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl AsRef<str> for StateKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::borrow::Borrow<str> for StateKey {
    fn borrow(&self) -> &str {
        &self.0
    }
}

/// Initial values handed to a pipeline, or extra values merged on failure.
///
/// # Examples
///
/// ```
/// use tsunagi::{Attributes, State};
///
/// let attributes = Attributes::new()
///     .with("order_id", 42u64)
///     .with("customer", "alice".to_string());
///
/// let state = State::build(attributes);
/// assert_eq!(state.get::<u64>("order_id"), Some(&42));
/// ```
#[derive(Default)]
pub struct Attributes {
    values: IndexMap<StateKey, Box<dyn Any>>,
}

impl Attributes {
    /// Creates an empty attribute set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a value, replacing any previous value for the key.
    pub fn with<T: Any>(mut self, key: impl Into<StateKey>, value: T) -> Self {
        self.insert(key, value);
        self
    }

    /// Inserts a value, replacing any previous value for the key.
    pub fn insert<T: Any>(&mut self, key: impl Into<StateKey>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Returns the number of attributes.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if there are no attributes.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for Attributes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Attributes")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Lifecycle of a [`State`].
///
/// Moves from `Pending` to either `Success` or `Failure`, never back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    /// The pipeline has not finished yet.
    #[default]
    Pending,
    /// The top-level call completed without a failure.
    Success,
    /// A unit failed; the ledger has been or is being unwound.
    Failure,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Status::Pending => write!(f, "pending"),
            Status::Success => write!(f, "success"),
            Status::Failure => write!(f, "failure"),
        }
    }
}

/// What an unwind does when a compensation itself fails.
///
/// Both policies keep unwinding the remaining ledger entries; they differ
/// only in what [`State::rollback`] reports afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackPolicy {
    /// Finish the unwind, then report every failed compensation together.
    #[default]
    Aggregate,
    /// Finish the unwind, log failed compensations and report success.
    Ignore,
}

/// The state shared by every unit of one pipeline run.
///
/// Holds arbitrary values keyed by name, a tri-state [`Status`] and the
/// ledger of units that completed, which is unwound in reverse on failure.
///
/// # Examples
///
/// ```
/// use tsunagi::State;
///
/// let mut state = State::new();
/// state.set("total", 1200u64);
/// state.set("currency", "EUR".to_string());
///
/// assert!(state.has("total"));
/// assert_eq!(state.get::<u64>("total"), Some(&1200));
///
/// // Wrong type or missing key returns None
/// assert_eq!(state.get::<String>("total"), None);
/// assert_eq!(state.get::<u64>("missing"), None);
/// ```
pub struct State {
    values: IndexMap<StateKey, Box<dyn Any>>,
    status: Status,
    ledger: Vec<Box<dyn Unit>>,
    rolled_back: bool,
    rollback_policy: RollbackPolicy,
    audit: AuditLog,
    started_at: Instant,
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State")
            .field("keys", &self.values.keys().collect::<Vec<_>>())
            .field("status", &self.status)
            .field("ledger", &self.ledger())
            .field("rolled_back", &self.rolled_back)
            .finish()
    }
}

impl Default for State {
    fn default() -> Self {
        Self::new()
    }
}

impl From<Attributes> for State {
    fn from(attributes: Attributes) -> Self {
        let mut state = State::new();
        state.values = attributes.values;
        state
    }
}

impl State {
    /// Creates an empty, pending state.
    pub fn new() -> Self {
        Self {
            values: IndexMap::new(),
            status: Status::Pending,
            ledger: Vec::new(),
            rolled_back: false,
            rollback_policy: RollbackPolicy::default(),
            audit: AuditLog::new(),
            started_at: Instant::now(),
        }
    }

    /// Builds a state from attributes, or returns an existing state unchanged.
    pub fn build(initial: impl Into<State>) -> Self {
        initial.into()
    }

    /// Sets the policy used when a compensation fails.
    pub fn with_rollback_policy(mut self, policy: RollbackPolicy) -> Self {
        self.rollback_policy = policy;
        self
    }

    /// Returns the rollback policy of this run.
    pub fn rollback_policy(&self) -> RollbackPolicy {
        self.rollback_policy
    }

    /// Sets a value, replacing any previous value for the key.
    pub fn set<T: Any>(&mut self, key: impl Into<StateKey>, value: T) {
        self.values.insert(key.into(), Box::new(value));
    }

    /// Returns a reference to the value for the given key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get<T: Any>(&self, key: &str) -> Option<&T> {
        self.values.get(key).and_then(|v| v.downcast_ref::<T>())
    }

    /// Returns a mutable reference to the value for the given key.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn get_mut<T: Any>(&mut self, key: &str) -> Option<&mut T> {
        self.values.get_mut(key).and_then(|v| v.downcast_mut::<T>())
    }

    /// Returns the untyped value for the given key.
    pub fn value(&self, key: &str) -> Option<&dyn Any> {
        self.values.get(key).map(|v| &**v)
    }

    /// Removes a value by key and returns it.
    ///
    /// Returns `None` if the key doesn't exist or the type doesn't match.
    pub fn remove<T: Any>(&mut self, key: &str) -> Option<T> {
        self.values
            .shift_remove(key)
            .and_then(|v| v.downcast::<T>().ok())
            .map(|b| *b)
    }

    /// Returns `true` if the state holds a value for the given key.
    pub fn has(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    /// Returns the keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &StateKey> {
        self.values.keys()
    }

    /// Returns the number of values.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if the state holds no values.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Returns the current status.
    pub fn status(&self) -> Status {
        self.status
    }

    /// Returns `true` while the run has neither succeeded nor failed.
    pub fn is_pending(&self) -> bool {
        self.status == Status::Pending
    }

    /// Returns `true` once the top-level call completed without failure.
    pub fn is_success(&self) -> bool {
        self.status == Status::Success
    }

    /// Returns `true` once any unit failed.
    pub fn is_failure(&self) -> bool {
        self.status == Status::Failure
    }

    /// Flags the run as failed and returns the failure signal.
    ///
    /// Return the signal from the unit (`return Err(state.fail())`) to stop
    /// forward progress and start the unwind. Only a pending state changes:
    /// failing a state that already failed or succeeded leaves it as is.
    #[must_use = "return the signal to stop the pipeline"]
    pub fn fail(&mut self) -> UnitError {
        self.fail_with(Attributes::new())
    }

    /// Like [`fail`](Self::fail), merging `info` into the values first.
    ///
    /// `info` is only merged by the call that flips the status.
    #[must_use = "return the signal to stop the pipeline"]
    pub fn fail_with(&mut self, info: Attributes) -> UnitError {
        if self.status == Status::Pending {
            self.status = Status::Failure;
            self.values.extend(info.values);
            debug!("State marked as failed");
        }
        UnitError::Failed
    }

    /// Appends a unit whose core logic and output checks passed.
    pub fn mark_succeeded(&mut self, unit: Box<dyn Unit>) {
        let name = unit.name();
        debug!("Unit '{}' added to ledger", name);
        self.audit.record(&name, AuditEvent::Succeeded);
        self.ledger.push(unit);
    }

    /// Returns the names of the ledgered units, in completion order.
    pub fn ledger(&self) -> Vec<UnitName> {
        self.ledger.iter().map(|unit| unit.name()).collect()
    }

    /// Returns `true` once an unwind has consumed the ledger.
    pub fn is_rolled_back(&self) -> bool {
        self.rolled_back
    }

    /// Invokes the rollback of every ledgered unit, newest first.
    ///
    /// The ledger is consumed, so a second call only rolls back units that
    /// were ledgered after the first one. A failing compensation never stops
    /// the unwind; see [`RollbackPolicy`] for how failures are reported.
    ///
    /// # Errors
    ///
    /// Returns [`RollbackError`] with every failed compensation under
    /// [`RollbackPolicy::Aggregate`].
    pub fn rollback(&mut self) -> Result<(), RollbackError> {
        let ledger = std::mem::take(&mut self.ledger);
        if ledger.is_empty() {
            return Ok(());
        }
        self.rolled_back = true;

        let mut failures = Vec::new();
        for mut unit in ledger.into_iter().rev() {
            let name = unit.name();
            match unit.rollback(self) {
                Ok(()) => {
                    debug!("Unit '{}' rolled back", name);
                    self.audit.record(&name, AuditEvent::RolledBack);
                }
                Err(error) => {
                    warn!("Rollback of unit '{}' failed: {}", name, error);
                    self.audit.record(&name, AuditEvent::RollbackFailed);
                    failures.push(CompensationError {
                        unit: name,
                        source: error,
                    });
                }
            }
        }

        match self.rollback_policy {
            RollbackPolicy::Aggregate if !failures.is_empty() => Err(RollbackError { failures }),
            _ => Ok(()),
        }
    }

    /// Returns the audit trail of this run.
    pub fn audit(&self) -> &AuditLog {
        &self.audit
    }

    /// Returns the time elapsed since the state was created.
    pub fn elapsed(&self) -> std::time::Duration {
        self.started_at.elapsed()
    }

    pub(crate) fn record_failure(&mut self, unit: &UnitName) {
        self.audit.record(unit, AuditEvent::Failed);
    }

    pub(crate) fn mark_failed(&mut self) {
        if self.status == Status::Pending {
            self.status = Status::Failure;
        }
    }

    pub(crate) fn mark_success(&mut self) {
        if self.status == Status::Pending {
            self.status = Status::Success;
        }
    }
}
