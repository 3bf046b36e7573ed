//! Fault injection around a storage backend

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use parking_lot::Mutex;
use rustc_hash::FxHashSet;
use tracing::debug;
use upsync_core::{
    AnyRow, CommitInfo, EntityName, EntityStore, LedgerEntry, LedgerKey, LedgerStore, RowId,
    Savepoint, Storage, Timestamp, UnitOfWork, UpsyncError, UpsyncResult,
};

#[derive(Debug, Default)]
struct FaultPlan {
    unavailable: AtomicBool,
    fail_commits: AtomicUsize,
    conflict_commits: AtomicUsize,
    failing_rows: Mutex<FxHashSet<RowId>>,
    commit_attempts: AtomicUsize,
}

impl FaultPlan {
    /// Consume one pending fault from `counter`; false if none was pending
    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Storage wrapper that fails on demand
///
/// Faults are consumed in order: conflicts first, then commit failures.
/// An injected commit fault aborts the wrapped unit of work, so nothing it
/// staged reaches the inner store.
#[derive(Debug)]
pub struct FaultyStore<S> {
    inner: S,
    plan: FaultPlan,
}

impl<S: Storage> FaultyStore<S> {
    /// Wrap `inner` with no faults armed
    pub fn new(inner: S) -> Self {
        FaultyStore {
            inner,
            plan: FaultPlan::default(),
        }
    }

    /// The wrapped store
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Make `begin` fail with `Unavailable` until cleared
    pub fn set_unavailable(&self, unavailable: bool) {
        self.plan.unavailable.store(unavailable, Ordering::Release);
    }

    /// Fail the next `n` commits with `Commit`
    pub fn fail_next_commits(&self, n: usize) {
        self.plan.fail_commits.store(n, Ordering::Release);
    }

    /// Fail the next `n` commits with `Conflict`
    pub fn conflict_next_commits(&self, n: usize) {
        self.plan.conflict_commits.store(n, Ordering::Release);
    }

    /// Make every `find` of `row_id` fail with a storage error
    pub fn fail_reads_of(&self, row_id: RowId) {
        self.plan.failing_rows.lock().insert(row_id);
    }

    /// Disarm every fault
    pub fn clear_faults(&self) {
        self.set_unavailable(false);
        self.fail_next_commits(0);
        self.conflict_next_commits(0);
        self.plan.failing_rows.lock().clear();
    }

    /// Number of commits attempted through this wrapper
    pub fn commit_attempts(&self) -> usize {
        self.plan.commit_attempts.load(Ordering::Acquire)
    }
}

impl<S: Storage> Storage for FaultyStore<S> {
    fn begin(&self) -> UpsyncResult<Box<dyn UnitOfWork + '_>> {
        if self.plan.unavailable.load(Ordering::Acquire) {
            return Err(UpsyncError::unavailable("injected outage"));
        }
        let inner = self.inner.begin()?;
        Ok(Box::new(FaultyUnitOfWork {
            inner,
            plan: &self.plan,
        }))
    }
}

/// Unit of work handed out by [`FaultyStore`]
pub struct FaultyUnitOfWork<'a> {
    inner: Box<dyn UnitOfWork + 'a>,
    plan: &'a FaultPlan,
}

impl EntityStore for FaultyUnitOfWork<'_> {
    fn find(&mut self, entity: &EntityName, row_id: RowId) -> UpsyncResult<Option<Box<dyn AnyRow>>> {
        if self.plan.failing_rows.lock().contains(&row_id) {
            return Err(UpsyncError::storage(format!(
                "injected read failure for {}[{}]",
                entity, row_id
            )));
        }
        self.inner.find(entity, row_id)
    }

    fn insert(&mut self, entity: &EntityName, row: Box<dyn AnyRow>) -> UpsyncResult<()> {
        self.inner.insert(entity, row)
    }

    fn update(&mut self, entity: &EntityName, row: Box<dyn AnyRow>) -> UpsyncResult<()> {
        self.inner.update(entity, row)
    }

    fn remove(&mut self, entity: &EntityName, row_id: RowId) -> UpsyncResult<()> {
        self.inner.remove(entity, row_id)
    }
}

impl LedgerStore for FaultyUnitOfWork<'_> {
    fn ledger_get(&mut self, key: &LedgerKey) -> UpsyncResult<Option<LedgerEntry>> {
        self.inner.ledger_get(key)
    }

    fn ledger_insert(&mut self, key: LedgerKey, last_changed_on: Timestamp) -> UpsyncResult<()> {
        self.inner.ledger_insert(key, last_changed_on)
    }

    fn ledger_update(&mut self, key: &LedgerKey, last_changed_on: Timestamp) -> UpsyncResult<()> {
        self.inner.ledger_update(key, last_changed_on)
    }
}

impl UnitOfWork for FaultyUnitOfWork<'_> {
    fn savepoint(&mut self) -> Savepoint {
        self.inner.savepoint()
    }

    fn rollback_to(&mut self, savepoint: Savepoint) -> UpsyncResult<()> {
        self.inner.rollback_to(savepoint)
    }

    fn commit(&mut self) -> UpsyncResult<CommitInfo> {
        self.plan.commit_attempts.fetch_add(1, Ordering::AcqRel);
        if FaultPlan::take(&self.plan.conflict_commits) {
            debug!("injecting commit conflict");
            self.inner.abort("injected conflict");
            return Err(UpsyncError::conflict("injected conflict"));
        }
        if FaultPlan::take(&self.plan.fail_commits) {
            debug!("injecting commit failure");
            self.inner.abort("injected commit failure");
            return Err(UpsyncError::commit("injected commit failure"));
        }
        self.inner.commit()
    }

    fn abort(&mut self, reason: &str) {
        self.inner.abort(reason)
    }
}
