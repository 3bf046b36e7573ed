//! Unit of work over a [`MemoryStore`]
//!
//! Reads go through the staged changes first and fall back to committed
//! state, recording the version observed the first time each row or ledger
//! entry is read (0 = absent). Writes are buffered until commit.
//!
//! Savepoints are positions in an undo journal: every staged change pushes
//! the buffered value it replaced, and `rollback_to` pops back to the mark.
//!
//! Commit, under the store's write lock:
//! 1. Validate the read set (serializable isolation only)
//! 2. Allocate the commit version
//! 3. Apply every buffered row and ledger change
//!
//! Nothing is applied if validation fails, so a failed commit leaves the
//! committed state untouched.

use rustc_hash::FxHashMap;
use tracing::{debug, trace};
use upsync_core::{
    AnyRow, CommitInfo, EntityName, EntityStore, Isolation, LedgerEntry, LedgerKey, LedgerStore,
    RowId, Savepoint, Timestamp, UnitOfWork, UpsyncError, UpsyncResult,
};

use crate::memory::MemoryStore;
use crate::stored::{RowKey, ABSENT_VERSION};
use crate::validation::validate_reads;

/// Unit of work state machine
///
/// ```text
/// Active -> Validating -> Committed
///    |          |
///    +----------+-----> Aborted
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Accepting reads and writes
    Active,
    /// Commit in progress
    Validating,
    /// Changes applied
    Committed,
    /// Changes discarded
    Aborted {
        /// Why
        reason: String,
    },
}

/// Buffered row change
#[derive(Debug, Clone)]
enum RowWrite {
    Put(Box<dyn AnyRow>),
    Delete,
}

/// Buffered ledger change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct LedgerWrite {
    last_changed_on: Timestamp,
    /// True if the entry did not exist when it was staged
    insert: bool,
}

/// Undo record: what a key's buffered change was before the journaled write
#[derive(Debug)]
enum JournalEntry {
    Row {
        key: RowKey,
        previous: Option<RowWrite>,
    },
    Ledger {
        key: LedgerKey,
        previous: Option<LedgerWrite>,
    },
}

/// Transaction over the in-memory store
pub struct MemoryTransaction<'a> {
    txn_id: u64,
    store: &'a MemoryStore,
    isolation: Isolation,
    status: TransactionStatus,
    row_reads: FxHashMap<RowKey, u64>,
    ledger_reads: FxHashMap<LedgerKey, u64>,
    row_writes: FxHashMap<RowKey, RowWrite>,
    ledger_writes: FxHashMap<LedgerKey, LedgerWrite>,
    journal: Vec<JournalEntry>,
}

impl<'a> MemoryTransaction<'a> {
    pub(crate) fn new(txn_id: u64, store: &'a MemoryStore) -> Self {
        MemoryTransaction {
            txn_id,
            store,
            isolation: store.isolation(),
            status: TransactionStatus::Active,
            row_reads: FxHashMap::default(),
            ledger_reads: FxHashMap::default(),
            row_writes: FxHashMap::default(),
            ledger_writes: FxHashMap::default(),
            journal: Vec::new(),
        }
    }

    /// Transaction identifier, unique per store
    pub fn txn_id(&self) -> u64 {
        self.txn_id
    }

    /// Current state
    pub fn status(&self) -> &TransactionStatus {
        &self.status
    }

    /// True while reads and writes are accepted
    pub fn is_active(&self) -> bool {
        matches!(self.status, TransactionStatus::Active)
    }

    /// Number of buffered row and ledger changes
    pub fn pending_writes(&self) -> usize {
        self.row_writes.len() + self.ledger_writes.len()
    }

    /// Number of distinct rows and ledger entries read from committed state
    pub fn read_set_len(&self) -> usize {
        self.row_reads.len() + self.ledger_reads.len()
    }

    fn ensure_active(&self) -> UpsyncResult<()> {
        if self.is_active() {
            Ok(())
        } else {
            Err(UpsyncError::TransactionNotActive {
                state: format!("{:?}", self.status),
            })
        }
    }

    /// Visible row for `key`: buffered change first, then committed state
    fn visible_row(&mut self, key: &RowKey) -> Option<Box<dyn AnyRow>> {
        if let Some(write) = self.row_writes.get(key) {
            return match write {
                RowWrite::Put(row) => Some(row.clone_row()),
                RowWrite::Delete => None,
            };
        }
        let store = self.store;
        let state = store.read_state();
        let stored = state.tables.get(&key.entity, key.row_id);
        let version = stored.map(|s| s.version()).unwrap_or(ABSENT_VERSION);
        self.row_reads.entry(key.clone()).or_insert(version);
        stored.map(|s| s.clone_row())
    }

    /// Visible ledger entry for `key`
    fn visible_ledger(&mut self, key: &LedgerKey) -> Option<LedgerEntry> {
        let store = self.store;
        let state = store.read_state();
        let committed = state.ledger.get(key);
        if let Some(write) = self.ledger_writes.get(key) {
            return Some(LedgerEntry {
                id: committed.map(|c| c.id),
                key: key.clone(),
                last_changed_on: write.last_changed_on,
            });
        }
        let version = committed.map(|c| c.version).unwrap_or(ABSENT_VERSION);
        self.ledger_reads.entry(key.clone()).or_insert(version);
        committed.map(|c| c.to_entry(key))
    }

    fn stage_row(&mut self, key: RowKey, write: RowWrite) {
        let previous = self.row_writes.insert(key.clone(), write);
        self.journal.push(JournalEntry::Row { key, previous });
    }

    fn stage_ledger(&mut self, key: LedgerKey, write: LedgerWrite) {
        let previous = self.ledger_writes.insert(key.clone(), write);
        self.journal.push(JournalEntry::Ledger { key, previous });
    }

    fn clear_buffers(&mut self) {
        self.row_writes.clear();
        self.ledger_writes.clear();
        self.journal.clear();
    }
}

impl EntityStore for MemoryTransaction<'_> {
    fn find(&mut self, entity: &EntityName, row_id: RowId) -> UpsyncResult<Option<Box<dyn AnyRow>>> {
        self.ensure_active()?;
        Ok(self.visible_row(&RowKey::new(entity.clone(), row_id)))
    }

    fn insert(&mut self, entity: &EntityName, row: Box<dyn AnyRow>) -> UpsyncResult<()> {
        self.ensure_active()?;
        let key = RowKey::new(entity.clone(), row.erased_row_id());
        if self.visible_row(&key).is_some() {
            return Err(UpsyncError::storage(format!("row {} already exists", key)));
        }
        self.stage_row(key, RowWrite::Put(row));
        Ok(())
    }

    fn update(&mut self, entity: &EntityName, row: Box<dyn AnyRow>) -> UpsyncResult<()> {
        self.ensure_active()?;
        let key = RowKey::new(entity.clone(), row.erased_row_id());
        if self.visible_row(&key).is_none() {
            return Err(UpsyncError::storage(format!("row {} does not exist", key)));
        }
        self.stage_row(key, RowWrite::Put(row));
        Ok(())
    }

    fn remove(&mut self, entity: &EntityName, row_id: RowId) -> UpsyncResult<()> {
        self.ensure_active()?;
        let key = RowKey::new(entity.clone(), row_id);
        if self.visible_row(&key).is_none() {
            return Err(UpsyncError::storage(format!("row {} does not exist", key)));
        }
        self.stage_row(key, RowWrite::Delete);
        Ok(())
    }
}

impl LedgerStore for MemoryTransaction<'_> {
    fn ledger_get(&mut self, key: &LedgerKey) -> UpsyncResult<Option<LedgerEntry>> {
        self.ensure_active()?;
        Ok(self.visible_ledger(key))
    }

    fn ledger_insert(&mut self, key: LedgerKey, last_changed_on: Timestamp) -> UpsyncResult<()> {
        self.ensure_active()?;
        if self.visible_ledger(&key).is_some() {
            return Err(UpsyncError::UniqueViolation {
                table: key.table,
                row_id: key.row_id,
                column: key.column,
            });
        }
        self.stage_ledger(
            key,
            LedgerWrite {
                last_changed_on,
                insert: true,
            },
        );
        Ok(())
    }

    fn ledger_update(&mut self, key: &LedgerKey, last_changed_on: Timestamp) -> UpsyncResult<()> {
        self.ensure_active()?;
        if self.visible_ledger(key).is_none() {
            return Err(UpsyncError::storage(format!("no ledger entry for {}", key)));
        }
        let insert = self
            .ledger_writes
            .get(key)
            .map(|w| w.insert)
            .unwrap_or(false);
        self.stage_ledger(
            key.clone(),
            LedgerWrite {
                last_changed_on,
                insert,
            },
        );
        Ok(())
    }
}

impl UnitOfWork for MemoryTransaction<'_> {
    fn savepoint(&mut self) -> Savepoint {
        Savepoint(self.journal.len())
    }

    fn rollback_to(&mut self, savepoint: Savepoint) -> UpsyncResult<()> {
        self.ensure_active()?;
        if savepoint.0 > self.journal.len() {
            return Err(UpsyncError::invalid_input(format!(
                "savepoint {} is past the end of the journal ({})",
                savepoint.0,
                self.journal.len()
            )));
        }
        while self.journal.len() > savepoint.0 {
            match self.journal.pop() {
                Some(JournalEntry::Row { key, previous }) => match previous {
                    Some(write) => {
                        self.row_writes.insert(key, write);
                    }
                    None => {
                        self.row_writes.remove(&key);
                    }
                },
                Some(JournalEntry::Ledger { key, previous }) => match previous {
                    Some(write) => {
                        self.ledger_writes.insert(key, write);
                    }
                    None => {
                        self.ledger_writes.remove(&key);
                    }
                },
                None => break,
            }
        }
        trace!(txn_id = self.txn_id, savepoint = savepoint.0, "rolled back to savepoint");
        Ok(())
    }

    fn commit(&mut self) -> UpsyncResult<CommitInfo> {
        self.ensure_active()?;
        self.status = TransactionStatus::Validating;

        let store = self.store;
        let mut state = store.write_state();

        if self.row_writes.is_empty() && self.ledger_writes.is_empty() {
            self.status = TransactionStatus::Committed;
            return Ok(CommitInfo {
                commit_version: state.version,
                ..CommitInfo::default()
            });
        }

        if self.isolation == Isolation::Serializable {
            let result = validate_reads(&self.row_reads, &self.ledger_reads, &state);
            if !result.is_valid() {
                let reason = result.describe();
                debug!(
                    txn_id = self.txn_id,
                    conflicts = result.conflict_count(),
                    %reason,
                    "validation failed"
                );
                drop(state);
                self.status = TransactionStatus::Aborted {
                    reason: reason.clone(),
                };
                self.clear_buffers();
                return Err(UpsyncError::conflict(reason));
            }
        }

        let version = state.next_version();
        let mut info = CommitInfo {
            commit_version: version,
            ..CommitInfo::default()
        };

        for (key, write) in self.row_writes.drain() {
            match write {
                RowWrite::Put(row) => {
                    state.tables.put(&key.entity, row, version);
                    info.rows_written += 1;
                }
                RowWrite::Delete => {
                    if state.tables.remove(&key.entity, key.row_id) {
                        info.rows_deleted += 1;
                    }
                }
            }
        }

        for (key, write) in self.ledger_writes.drain() {
            // Under read_committed another commit may have created the entry
            // since it was staged as an insert
            state.ledger.upsert(key, write.last_changed_on, version);
            info.ledger_written += 1;
        }

        drop(state);
        self.journal.clear();
        self.status = TransactionStatus::Committed;
        debug!(
            txn_id = self.txn_id,
            commit_version = version,
            rows_written = info.rows_written,
            rows_deleted = info.rows_deleted,
            ledger_written = info.ledger_written,
            "committed"
        );
        Ok(info)
    }

    fn abort(&mut self, reason: &str) {
        if matches!(
            self.status,
            TransactionStatus::Committed | TransactionStatus::Aborted { .. }
        ) {
            return;
        }
        debug!(txn_id = self.txn_id, reason, "aborted");
        self.status = TransactionStatus::Aborted {
            reason: reason.to_string(),
        };
        self.clear_buffers();
    }
}
