//! Committed row and ledger cells
//!
//! The contract types handed to the engine carry no version; versions are a
//! storage concern used only for commit-time validation. These wrappers pair
//! the committed payload with the commit version that last wrote it.

use std::fmt;

use upsync_core::{AnyRow, EntityName, LedgerEntry, LedgerKey, RowId, Timestamp};

/// Version meaning "absent" in a read set
pub const ABSENT_VERSION: u64 = 0;

/// Address of a row: entity plus stable identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    /// Entity the row belongs to
    pub entity: EntityName,
    /// Row identifier
    pub row_id: RowId,
}

impl RowKey {
    /// Address of `row_id` in `entity`
    pub fn new(entity: EntityName, row_id: RowId) -> Self {
        RowKey { entity, row_id }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.entity, self.row_id)
    }
}

/// A committed row
#[derive(Debug, Clone)]
pub struct StoredRow {
    row: Box<dyn AnyRow>,
    version: u64,
}

impl StoredRow {
    /// Wrap a row committed at `version`
    pub fn new(row: Box<dyn AnyRow>, version: u64) -> Self {
        StoredRow { row, version }
    }

    /// The row
    #[inline]
    pub fn row(&self) -> &dyn AnyRow {
        self.row.as_ref()
    }

    /// Private copy of the row
    pub fn clone_row(&self) -> Box<dyn AnyRow> {
        self.row.clone_row()
    }

    /// Commit version that last wrote this row
    #[inline]
    pub fn version(&self) -> u64 {
        self.version
    }
}

/// A committed ledger entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredLedgerEntry {
    /// Surrogate key
    pub id: u64,
    /// Last applied write to the column
    pub last_changed_on: Timestamp,
    /// Commit version that last wrote this entry
    pub version: u64,
}

impl StoredLedgerEntry {
    /// Contract view of this entry
    pub fn to_entry(&self, key: &LedgerKey) -> LedgerEntry {
        LedgerEntry {
            id: Some(self.id),
            key: key.clone(),
            last_changed_on: self.last_changed_on,
        }
    }
}
