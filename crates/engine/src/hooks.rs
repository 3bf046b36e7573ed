//! Per-entity mutation hooks
//!
//! Hooks observe each record as it is applied and may veto it. A veto is a
//! value, [`HookOutcome::Veto`], not an error raised through the engine:
//! the engine turns it into the record's `Exception` outcome and rolls back
//! whatever the record had staged.
//!
//! Call order for one record:
//! - `before_*` sees the row as it is before the change
//! - the change is staged
//! - `after_*` sees the row as staged; a veto here still rejects the record
//!
//! `on_commit` runs once per batch after a successful commit, in entity
//! registration order. Its failures are logged and do not change any
//! outcome.

use std::collections::HashMap;

use upsync_core::{
    ColumnName, Entity, EntityName, MutationRecord, Operation, RecordId, RowId, Timestamp,
    UpsyncError, UpsyncResult, Value,
};

/// Verdict of a hook
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum HookOutcome {
    /// Allow the operation
    #[default]
    Proceed,
    /// Reject the record with a reason
    Veto(String),
}

impl HookOutcome {
    /// Veto with `reason`
    pub fn veto(reason: impl Into<String>) -> Self {
        HookOutcome::Veto(reason.into())
    }

    /// True for `Proceed`
    pub fn is_proceed(&self) -> bool {
        matches!(self, HookOutcome::Proceed)
    }

    /// `Vetoed` error for a veto
    ///
    /// # Errors
    ///
    /// `Vetoed` carrying the hook's reason.
    pub fn into_result(self) -> UpsyncResult<()> {
        match self {
            HookOutcome::Proceed => Ok(()),
            HookOutcome::Veto(reason) => Err(UpsyncError::Vetoed { reason }),
        }
    }
}

impl From<UpsyncResult<()>> for HookOutcome {
    fn from(result: UpsyncResult<()>) -> Self {
        match result {
            Ok(()) => HookOutcome::Proceed,
            Err(UpsyncError::Vetoed { reason }) => HookOutcome::Veto(reason),
            Err(e) => HookOutcome::Veto(e.to_string()),
        }
    }
}

/// The record a hook is being called for
#[derive(Debug, Clone, Copy)]
pub struct HookContext<'r> {
    record: &'r MutationRecord,
}

impl<'r> HookContext<'r> {
    /// Context for `record`
    pub fn new(record: &'r MutationRecord) -> Self {
        HookContext { record }
    }

    /// Full record
    pub fn record(&self) -> &'r MutationRecord {
        self.record
    }

    /// Record id
    pub fn record_id(&self) -> RecordId {
        self.record.id
    }

    /// Requested operation
    pub fn operation(&self) -> Operation {
        self.record.operation
    }

    /// Target entity
    pub fn entity(&self) -> &'r EntityName {
        &self.record.entity_name
    }

    /// Target row
    pub fn row_id(&self) -> RowId {
        self.record.entity_row_id
    }

    /// Column written, for updates
    pub fn column(&self) -> Option<&'r ColumnName> {
        self.record.column_name.as_ref()
    }

    /// Untyped value being written
    pub fn new_value(&self) -> &'r Value {
        &self.record.new_value
    }

    /// When the client made the change
    pub fn occurred_at(&self) -> Timestamp {
        self.record.occurred_at
    }

    /// Side-channel value
    pub fn extra(&self, key: &str) -> Option<&'r Value> {
        self.record.extras.get(key)
    }

    /// All side-channel values
    pub fn extras(&self) -> &'r HashMap<String, Value> {
        &self.record.extras
    }
}

/// Hooks for entity `T`
///
/// Every method defaults to allowing the operation, so implementors
/// override only what they need.
pub trait MutationHooks<T: Entity>: Send + Sync {
    /// Before a new row is staged; `row` carries the create payload
    fn before_create(&self, _ctx: &HookContext<'_>, _row: &T) -> HookOutcome {
        HookOutcome::Proceed
    }

    /// After a new row is staged
    fn after_create(&self, _ctx: &HookContext<'_>, _row: &T) -> HookOutcome {
        HookOutcome::Proceed
    }

    /// Before a column write; `row` is the current row
    fn before_update(&self, _ctx: &HookContext<'_>, _row: &T) -> HookOutcome {
        HookOutcome::Proceed
    }

    /// After a column write is staged; `row` holds the new value
    fn after_update(&self, _ctx: &HookContext<'_>, _row: &T) -> HookOutcome {
        HookOutcome::Proceed
    }

    /// Before a row removal; `row` is the row being removed
    fn before_delete(&self, _ctx: &HookContext<'_>, _row: &T) -> HookOutcome {
        HookOutcome::Proceed
    }

    /// After a row removal is staged
    fn after_delete(&self, _ctx: &HookContext<'_>, _row: &T) -> HookOutcome {
        HookOutcome::Proceed
    }

    /// Once per batch, after commit
    ///
    /// # Errors
    ///
    /// Any error is logged by the engine and otherwise ignored.
    fn on_commit(&self) -> UpsyncResult<()> {
        Ok(())
    }
}

/// Hooks that allow everything
#[derive(Debug, Clone, Copy, Default)]
pub struct AllowAll;

impl<T: Entity> MutationHooks<T> for AllowAll {}
