//! The reconciliation engine
//!
//! `process` takes one client batch through a single unit of work:
//!
//! 1. Plan the batch (see [`crate::plan`])
//! 2. Begin a unit of work
//! 3. Apply each record inside its own savepoint; anything short of
//!    `NoError` rolls the savepoint back, so a rejected record leaves no
//!    staged rows or ledger entries behind
//! 4. Commit once
//! 5. Run every `on_commit` hook in registration order
//!
//! Record-level failures become that record's outcome. Batch-fatal errors
//! (see [`UpsyncError::is_batch_fatal`]) abort the unit of work and fail
//! the whole call. A `Conflict` at commit re-runs the batch from scratch
//! against fresh state, up to `max_commit_attempts` times.

use std::sync::Arc;

use tracing::{debug, error, info, info_span, warn};
use upsync_concurrency::TieBreak;
use upsync_core::{
    BatchOutcome, CommitInfo, MutationOutcome, MutationRecord, Operation, RecordId, Storage,
    UnitOfWork, UpsyncError, UpsyncResult,
};
use upsync_storage::MemoryStore;

use crate::config::EngineConfig;
use crate::plan::BatchPlan;
use crate::registry::EntityRegistry;

/// Applies client batches to storage
///
/// The engine holds no per-batch state; one instance can serve concurrent
/// `process` calls from many threads; cross-batch consistency comes from
/// the storage's isolation level.
pub struct ReconciliationEngine<S: Storage + ?Sized> {
    storage: Arc<S>,
    registry: Arc<EntityRegistry>,
    config: EngineConfig,
}

impl<S: Storage + ?Sized> std::fmt::Debug for ReconciliationEngine<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReconciliationEngine")
            .field("registry", &self.registry)
            .field("config", &self.config)
            .finish()
    }
}

impl ReconciliationEngine<MemoryStore> {
    /// Engine over a fresh in-memory store using `config.isolation`
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid.
    pub fn in_memory(registry: Arc<EntityRegistry>, config: EngineConfig) -> UpsyncResult<Self> {
        let storage = Arc::new(MemoryStore::with_isolation(config.isolation));
        Self::new(storage, registry, config)
    }
}

impl<S: Storage + ?Sized> ReconciliationEngine<S> {
    /// Engine over `storage`
    ///
    /// # Errors
    ///
    /// `Config` if the configuration is invalid.
    pub fn new(storage: Arc<S>, registry: Arc<EntityRegistry>, config: EngineConfig) -> UpsyncResult<Self> {
        config.validate()?;
        info!(
            target: "upsync::engine",
            entities = registry.len(),
            isolation = %config.isolation,
            max_commit_attempts = config.max_commit_attempts,
            "Reconciliation engine ready"
        );
        Ok(ReconciliationEngine {
            storage,
            registry,
            config,
        })
    }

    /// Registered entities
    pub fn registry(&self) -> &Arc<EntityRegistry> {
        &self.registry
    }

    /// Active configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Backing storage
    pub fn storage(&self) -> &Arc<S> {
        &self.storage
    }

    /// Reconcile one batch
    ///
    /// Returns one outcome per submitted record. An empty batch returns an
    /// empty map without touching storage or hooks.
    ///
    /// # Errors
    ///
    /// - `InvalidInput` if two records share an id
    /// - `Conflict` once every commit attempt lost a race
    /// - `Unavailable`, `Commit`, `TransactionNotActive` from storage
    ///
    /// Nothing the batch staged is committed when an error is returned.
    pub fn process(&self, records: Vec<MutationRecord>) -> UpsyncResult<BatchOutcome> {
        if records.is_empty() {
            debug!(target: "upsync::engine", "Empty batch, nothing to reconcile");
            return Ok(BatchOutcome::new());
        }

        let plan = BatchPlan::build(records)?;
        let tie_break = self.config.tie_break();
        let max_attempts = self.config.max_commit_attempts;
        debug!(
            target: "upsync::engine",
            submitted = plan.submitted(),
            partitions = plan.partitions().len(),
            steps = plan.step_count(),
            rejected = plan.rejected().len(),
            "Batch planned"
        );

        let mut attempt = 1;
        loop {
            let span = info_span!("reconcile", batch_len = plan.submitted(), attempt);
            let _guard = span.enter();

            match self.run_attempt(&plan, tie_break) {
                Ok((outcomes, commit)) => {
                    let summary = outcomes.summary();
                    info!(
                        target: "upsync::engine",
                        commit_version = commit.commit_version,
                        changes = commit.total_changes(),
                        %summary,
                        "Batch committed"
                    );
                    self.fire_on_commit();
                    return Ok(outcomes);
                }
                Err(e) if e.is_retryable() && attempt < max_attempts => {
                    warn!(
                        target: "upsync::engine",
                        attempt,
                        max_attempts,
                        error = %e,
                        "Commit conflict, retrying batch"
                    );
                    attempt += 1;
                }
                Err(e) => {
                    error!(
                        target: "upsync::engine",
                        attempt,
                        error = %e,
                        "Batch failed"
                    );
                    return Err(e);
                }
            }
        }
    }

    /// One pass over the plan inside one unit of work
    fn run_attempt(&self, plan: &BatchPlan, tie_break: TieBreak) -> UpsyncResult<(BatchOutcome, CommitInfo)> {
        let mut uow = self.storage.begin()?;
        let mut outcomes = BatchOutcome::with_capacity(plan.submitted());

        for (id, outcome) in plan.rejected() {
            self.log_outcome(*id, outcome);
            outcomes.insert(*id, outcome.clone());
        }

        for record in plan.steps() {
            let outcome = match self.apply_record(uow.as_mut(), record, tie_break) {
                Ok(outcome) => outcome,
                Err(e) => {
                    uow.abort(&e.to_string());
                    return Err(e);
                }
            };
            self.log_outcome(record.id, &outcome);
            outcomes.insert(record.id, outcome);
        }

        let commit = uow.commit()?;
        Ok((outcomes, commit))
    }

    /// Apply one record inside a savepoint
    ///
    /// Returns `Err` only for batch-fatal errors.
    fn apply_record(
        &self,
        uow: &mut dyn UnitOfWork,
        record: &MutationRecord,
        tie_break: TieBreak,
    ) -> UpsyncResult<MutationOutcome> {
        let Some(handler) = self.registry.get(record.entity_name.as_str()) else {
            return Ok(MutationOutcome::from_error(&UpsyncError::UnknownEntity {
                entity: record.entity_name.clone(),
            }));
        };

        let savepoint = uow.savepoint();
        let result = match record.operation {
            Operation::Create => handler.apply_create(uow, record),
            Operation::Update => handler.apply_update(uow, record, tie_break),
            Operation::Delete => handler.apply_delete(uow, record),
            Operation::None => Err(UpsyncError::invalid_input("operation not specified")),
        };

        let outcome = match result {
            Ok(kind) => MutationOutcome::new(kind),
            Err(e) if e.is_batch_fatal() => return Err(e),
            Err(e) => MutationOutcome::from_error(&e),
        };
        if !outcome.is_ok() {
            uow.rollback_to(savepoint)?;
        }
        Ok(outcome)
    }

    fn fire_on_commit(&self) {
        for handler in self.registry.handlers() {
            if let Err(e) = handler.on_commit() {
                warn!(
                    target: "upsync::engine",
                    entity = %handler.entity_name(),
                    error = %e,
                    "on_commit hook failed"
                );
            }
        }
    }

    fn log_outcome(&self, id: RecordId, outcome: &MutationOutcome) {
        if self.config.log_outcomes {
            debug!(
                target: "upsync::engine",
                record_id = %id,
                outcome = %outcome.error,
                extra = outcome.extra.as_deref().unwrap_or(""),
                "Record reconciled"
            );
        }
    }
}
