//! Change-ledger entry layout
//!
//! Persisted columns: `TableName`, `RowGuid`, `ColumnName`, `LastChangedOn`
//! and a surrogate `Id`, with a unique index on `(RowGuid, TableName,
//! ColumnName)`. The ledger exists only for conflict detection; it is not an
//! audit trail.

use crate::contract::Timestamp;
use crate::types::LedgerKey;
use serde::{Deserialize, Serialize};

/// One row of the change ledger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Surrogate key; `None` while the entry is staged in an uncommitted unit of work
    pub id: Option<u64>,
    /// Composite unique key
    pub key: LedgerKey,
    /// Timestamp of the last write applied to this column
    pub last_changed_on: Timestamp,
}

impl LedgerEntry {
    /// Entry not yet assigned a surrogate key
    pub fn staged(key: LedgerKey, last_changed_on: Timestamp) -> Self {
        LedgerEntry {
            id: None,
            key,
            last_changed_on,
        }
    }

    /// True once the storage engine assigned a surrogate key
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }
}
