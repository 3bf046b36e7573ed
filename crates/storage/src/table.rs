//! Committed state of the in-memory store
//!
//! - `EntityTables`: one ordered map per entity, keyed by `RowId`
//! - `LedgerTable`: the change ledger, with a surrogate `id` column and the
//!   composite unique index `(row_id, table, column)`
//!
//! Both live behind the store's single `RwLock`, so a commit that touches
//! rows and ledger entries is applied atomically.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use upsync_core::{
    AnyRow, EntityName, LedgerEntry, LedgerKey, RowId, Timestamp,
};

use crate::stored::{StoredLedgerEntry, StoredRow};

/// Committed rows, grouped by entity
#[derive(Debug, Default)]
pub struct EntityTables {
    tables: FxHashMap<EntityName, BTreeMap<RowId, StoredRow>>,
}

impl EntityTables {
    /// Committed row, if present
    pub fn get(&self, entity: &EntityName, row_id: RowId) -> Option<&StoredRow> {
        self.tables.get(entity).and_then(|table| table.get(&row_id))
    }

    /// Insert or replace a row at `version`
    pub fn put(&mut self, entity: &EntityName, row: Box<dyn AnyRow>, version: u64) {
        let row_id = row.erased_row_id();
        self.tables
            .entry(entity.clone())
            .or_default()
            .insert(row_id, StoredRow::new(row, version));
    }

    /// Remove a row; returns true if it was present
    pub fn remove(&mut self, entity: &EntityName, row_id: RowId) -> bool {
        self.tables
            .get_mut(entity)
            .map(|table| table.remove(&row_id).is_some())
            .unwrap_or(false)
    }

    /// Number of rows stored for `entity`
    pub fn len(&self, entity: &EntityName) -> usize {
        self.tables.get(entity).map(BTreeMap::len).unwrap_or(0)
    }

    /// Row ids of `entity`, in order
    pub fn row_ids(&self, entity: &EntityName) -> Vec<RowId> {
        self.tables
            .get(entity)
            .map(|table| table.keys().copied().collect())
            .unwrap_or_default()
    }
}

/// The change ledger
#[derive(Debug)]
pub struct LedgerTable {
    /// Unique index `(row_id, table, column)` -> entry
    entries: BTreeMap<LedgerKey, StoredLedgerEntry>,
    /// Next surrogate key
    next_id: u64,
}

impl Default for LedgerTable {
    fn default() -> Self {
        LedgerTable {
            entries: BTreeMap::new(),
            next_id: 1,
        }
    }
}

impl LedgerTable {
    /// Committed entry, if present
    pub fn get(&self, key: &LedgerKey) -> Option<&StoredLedgerEntry> {
        self.entries.get(key)
    }

    /// Insert, or update in place if the key is taken
    ///
    /// A new key gets the next surrogate id; an existing key keeps its own.
    pub fn upsert(&mut self, key: LedgerKey, last_changed_on: Timestamp, version: u64) {
        let next_id = &mut self.next_id;
        let entry = self.entries.entry(key).or_insert_with(|| {
            let id = *next_id;
            *next_id += 1;
            StoredLedgerEntry {
                id,
                last_changed_on,
                version,
            }
        });
        entry.last_changed_on = last_changed_on;
        entry.version = version;
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if the ledger is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Every entry, in index order
    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries
            .iter()
            .map(|(key, stored)| stored.to_entry(key))
            .collect()
    }
}

/// Everything a commit can change
#[derive(Debug, Default)]
pub struct CommittedState {
    /// Entity rows
    pub tables: EntityTables,
    /// Change ledger
    pub ledger: LedgerTable,
    /// Version of the last commit; 0 before the first
    pub version: u64,
}

impl CommittedState {
    /// Allocate the version for the next commit
    pub fn next_version(&mut self) -> u64 {
        self.version += 1;
        self.version
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(column: &str) -> LedgerKey {
        LedgerKey::new("Customer".into(), RowId::new(), column.into())
    }

    #[test]
    fn test_ledger_new_keys_get_increasing_ids() {
        let mut ledger = LedgerTable::default();
        let (a, b) = (key("Name"), key("Name"));
        ledger.upsert(a.clone(), Timestamp::from_secs(1), 1);
        ledger.upsert(b.clone(), Timestamp::from_secs(1), 1);
        assert!(ledger.get(&b).unwrap().id > ledger.get(&a).unwrap().id);
        assert_eq!(ledger.len(), 2);
    }

    #[test]
    fn test_ledger_one_entry_per_composite_key() {
        let mut ledger = LedgerTable::default();
        let k = key("Name");
        ledger.upsert(k.clone(), Timestamp::from_secs(1), 1);
        let id = ledger.get(&k).unwrap().id;
        ledger.upsert(k.clone(), Timestamp::from_secs(5), 2);

        let stored = ledger.get(&k).unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(stored.id, id);
        assert_eq!(stored.last_changed_on, Timestamp::from_secs(5));
        assert_eq!(stored.version, 2);
    }

    #[test]
    fn test_commit_versions_increase() {
        let mut state = CommittedState::default();
        assert_eq!(state.version, 0);
        assert_eq!(state.next_version(), 1);
        assert_eq!(state.next_version(), 2);
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let mut ledger = LedgerTable::default();
        let k = key("Email");
        ledger.upsert(k.clone(), Timestamp::from_secs(1), 1);
        ledger.upsert(k.clone(), Timestamp::from_secs(3), 2);
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.get(&k).unwrap().last_changed_on, Timestamp::from_secs(3));
    }
}
