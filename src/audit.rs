//! Audit trail of what happened to each unit during a run.

use crate::unit::UnitName;
use serde::Serialize;
use std::time::Instant;

/// What happened to a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum AuditEvent {
    /// The unit completed and was added to the ledger.
    Succeeded,
    /// An error escaped the unit.
    Failed,
    /// The unit's rollback completed.
    RolledBack,
    /// The unit's rollback returned an error.
    RollbackFailed,
}

/// One entry in the audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    /// Name of the unit.
    pub unit: String,
    /// What happened.
    pub event: AuditEvent,
    /// When it happened.
    #[serde(skip)]
    pub at: Instant,
}

/// Audit trail of a run, in the order events happened.
#[derive(Debug, Default, Serialize)]
pub struct AuditLog {
    records: Vec<AuditRecord>,
}

impl AuditLog {
    /// Create a new empty audit log.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record(&mut self, unit: &UnitName, event: AuditEvent) {
        self.records.push(AuditRecord {
            unit: unit.to_string(),
            event,
            at: Instant::now(),
        });
    }

    /// Get all records.
    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Names of units with the given event, in the order they were recorded.
    pub fn units_with(&self, event: AuditEvent) -> Vec<&str> {
        self.records
            .iter()
            .filter(|record| record.event == event)
            .map(|record| record.unit.as_str())
            .collect()
    }

    /// Names of units that completed, in completion order.
    pub fn succeeded(&self) -> Vec<&str> {
        self.units_with(AuditEvent::Succeeded)
    }

    /// Names of units that were rolled back, in unwind order.
    pub fn rolled_back(&self) -> Vec<&str> {
        self.units_with(AuditEvent::RolledBack)
    }

    /// Returns `true` if nothing was recorded.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }
}
