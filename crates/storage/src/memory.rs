//! In-memory storage backend
//!
//! All committed state sits behind one `parking_lot::RwLock`. Transactions
//! take the read lock briefly for each read and the write lock once, for
//! validate-and-apply at commit.

use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::trace;
use upsync_core::{
    downcast_ref, EntityName, Entity, Isolation, LedgerEntry, LedgerKey, RowId, Storage,
    UnitOfWork, UpsyncResult,
};

use crate::table::CommittedState;
use crate::transaction::MemoryTransaction;

/// Thread-safe in-memory store
///
/// # Example
///
/// ```ignore
/// let store = MemoryStore::new();
/// let mut uow = store.begin()?;
/// uow.insert(&"Customer".into(), Box::new(customer))?;
/// uow.commit()?;
/// ```
#[derive(Debug)]
pub struct MemoryStore {
    state: RwLock<CommittedState>,
    isolation: Isolation,
    next_txn_id: AtomicU64,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    /// Empty store with serializable isolation
    pub fn new() -> Self {
        Self::with_isolation(Isolation::default())
    }

    /// Empty store with the given isolation
    pub fn with_isolation(isolation: Isolation) -> Self {
        MemoryStore {
            state: RwLock::new(CommittedState::default()),
            isolation,
            next_txn_id: AtomicU64::new(1),
        }
    }

    /// Isolation new transactions run under
    pub fn isolation(&self) -> Isolation {
        self.isolation
    }

    pub(crate) fn read_state(&self) -> RwLockReadGuard<'_, CommittedState> {
        self.state.read()
    }

    pub(crate) fn write_state(&self) -> RwLockWriteGuard<'_, CommittedState> {
        self.state.write()
    }

    /// Open a transaction with its concrete type
    pub fn transaction(&self) -> MemoryTransaction<'_> {
        let txn_id = self.next_txn_id.fetch_add(1, Ordering::Relaxed);
        trace!(txn_id, "begin");
        MemoryTransaction::new(txn_id, self)
    }

    /// Committed copy of a row
    pub fn get<T: Entity>(&self, row_id: RowId) -> Option<T> {
        let state = self.state.read();
        state
            .tables
            .get(&EntityName::from(T::NAME), row_id)
            .and_then(|stored| downcast_ref::<T>(stored.row()).cloned())
    }

    /// Committed ledger entry
    pub fn ledger_entry(&self, key: &LedgerKey) -> Option<LedgerEntry> {
        self.state.read().ledger.get(key).map(|s| s.to_entry(key))
    }

    /// Every committed ledger entry, in index order
    pub fn ledger_entries(&self) -> Vec<LedgerEntry> {
        self.state.read().ledger.entries()
    }

    /// Store a row directly, outside any transaction, as its own commit
    ///
    /// Replaces any row with the same identifier. Intended for fixtures and
    /// initial loads.
    pub fn seed<T: Entity>(&self, row: T) {
        let mut state = self.state.write();
        let version = state.next_version();
        state
            .tables
            .put(&EntityName::from(T::NAME), Box::new(row), version);
    }

    /// Number of committed rows of `entity`
    pub fn row_count(&self, entity: &EntityName) -> usize {
        self.state.read().tables.len(entity)
    }

    /// Committed row ids of `entity`
    pub fn row_ids(&self, entity: &EntityName) -> Vec<RowId> {
        self.state.read().tables.row_ids(entity)
    }

    /// Number of committed ledger entries
    pub fn ledger_len(&self) -> usize {
        self.state.read().ledger.len()
    }

    /// Version of the last commit
    pub fn current_version(&self) -> u64 {
        self.state.read().version
    }
}

impl Storage for MemoryStore {
    fn begin(&self) -> UpsyncResult<Box<dyn UnitOfWork + '_>> {
        Ok(Box::new(self.transaction()))
    }
}
