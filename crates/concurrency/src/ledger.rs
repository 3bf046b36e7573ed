//! The change ledger
//!
//! `(table, row, column) -> last_changed_on`, used for nothing but deciding
//! whether an incoming column write is stale. Entries are created on the
//! first applied write to a column and updated in place afterwards.
//!
//! The ledger borrows the unit of work's [`LedgerStore`], so its reads and
//! writes take part in the same transaction as the entity writes they
//! guard. Cross-batch races are settled by that transaction:
//! - under serializable isolation the read of an entry is validated at
//!   commit, and a conflicting batch fails with `Conflict`
//! - the storage unique index turns a lost "first write" insert into
//!   `UniqueViolation`, which [`ChangeLedger::record_change`] retries as an
//!   update

use tracing::{debug, trace};
use upsync_core::{
    ColumnName, EntityName, LedgerKey, LedgerStore, RowId, Timestamp, UpsyncError, UpsyncResult,
};

use crate::freshness::{Freshness, TieBreak};

/// Ledger key for a column of a row; the table name is the entity name
pub fn ledger_key(entity: &EntityName, row_id: RowId, column: &ColumnName) -> LedgerKey {
    LedgerKey::new(entity.clone(), row_id, column.clone())
}

/// How a change was recorded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedAs {
    /// First write to the column
    Inserted,
    /// Existing entry moved forward
    Updated,
    /// Insert lost to a concurrent first write and was retried as an update
    RetriedAsUpdate,
}

/// Change ledger over one unit of work
///
/// `L` is usually `dyn UnitOfWork`; any [`LedgerStore`] works.
pub struct ChangeLedger<'a, L: LedgerStore + ?Sized> {
    store: &'a mut L,
    tie_break: TieBreak,
}

impl<'a, L: LedgerStore + ?Sized> ChangeLedger<'a, L> {
    /// Ledger over `store` using the default tie-break
    pub fn new(store: &'a mut L) -> Self {
        Self::with_tie_break(store, TieBreak::default())
    }

    /// Ledger over `store` with an explicit tie-break
    pub fn with_tie_break(store: &'a mut L, tie_break: TieBreak) -> Self {
        ChangeLedger { store, tie_break }
    }

    /// Tie-break in effect
    pub fn tie_break(&self) -> TieBreak {
        self.tie_break
    }

    /// Last applied write to the column, if any
    ///
    /// # Errors
    ///
    /// Storage errors from the unit of work.
    pub fn last_changed_on(&mut self, key: &LedgerKey) -> UpsyncResult<Option<Timestamp>> {
        Ok(self.store.ledger_get(key)?.map(|entry| entry.last_changed_on))
    }

    /// Decide whether a write at `occurred_at` may proceed
    ///
    /// # Errors
    ///
    /// Storage errors from the unit of work.
    pub fn check(&mut self, key: &LedgerKey, occurred_at: Timestamp) -> UpsyncResult<Freshness> {
        let last = self.last_changed_on(key)?;
        let verdict = Freshness::evaluate(last, occurred_at, self.tie_break);
        trace!(key = %key, occurred_at = %occurred_at, ?verdict, "ledger check");
        Ok(verdict)
    }

    /// Record an applied write at `occurred_at`
    ///
    /// Updates the entry if one is visible, otherwise inserts it. An insert
    /// rejected by the unique index is retried once as an update.
    ///
    /// # Errors
    ///
    /// Storage errors from the unit of work, including a second failure
    /// after the retry.
    pub fn record_change(&mut self, key: LedgerKey, occurred_at: Timestamp) -> UpsyncResult<RecordedAs> {
        if self.store.ledger_get(&key)?.is_some() {
            self.store.ledger_update(&key, occurred_at)?;
            return Ok(RecordedAs::Updated);
        }
        match self.store.ledger_insert(key.clone(), occurred_at) {
            Ok(()) => Ok(RecordedAs::Inserted),
            Err(UpsyncError::UniqueViolation { .. }) => {
                debug!(key = %key, "ledger insert lost a first-write race, retrying as update");
                self.store.ledger_update(&key, occurred_at)?;
                Ok(RecordedAs::RetriedAsUpdate)
            }
            Err(e) => Err(e),
        }
    }
}
