//! Upsync - upload-queue reconciliation for offline-first clients
//!
//! Clients capture changes while offline and upload them later as a batch of
//! [`MutationRecord`]s. Upsync applies the batch to storage and returns one
//! [`MutationOutcome`] per record, rejecting changes that a newer write to
//! the same column has already superseded.
//!
//! # Quick Start
//!
//! ```ignore
//! use std::sync::Arc;
//! use upsync::{EngineConfig, EntityRegistry, EntitySchema, MutationRecord, ReconciliationEngine};
//!
//! let registry = EntityRegistry::builder()
//!     .register(EntitySchema::<Customer>::new()
//!         .column("Name", |c: &mut Customer, v: String| c.name = v))?
//!     .build();
//! let engine = ReconciliationEngine::in_memory(Arc::new(registry), EngineConfig::default())?;
//!
//! let outcomes = engine.process(vec![
//!     MutationRecord::create("Customer", row, t1),
//!     MutationRecord::update("Customer", row, "Name", "Bob", t2),
//! ])?;
//! ```
//!
//! # Architecture
//!
//! - `upsync-core`: identifiers, values, records, outcomes, errors, storage traits
//! - `upsync-storage`: in-memory reference store with OCC units of work
//! - `upsync-concurrency`: the change ledger and stale-write detection
//! - `upsync-engine`: schemas, hooks, registry, planner, engine, configuration

pub use upsync_concurrency::{ledger_key, ChangeLedger, Freshness, RecordedAs, TieBreak};
pub use upsync_core::{
    AnyRow, BatchOutcome, ColumnName, CommitInfo, Entity, EntityName, EntityStore, FromValue,
    Isolation, LedgerEntry, LedgerKey, LedgerStore, MutationOutcome, MutationRecord, Operation,
    OutcomeKind, OutcomeSummary, RecordId, RowId, Savepoint, Storage, Timestamp, UnitOfWork,
    UpsyncError, UpsyncResult, Value,
};
pub use upsync_engine::{
    AllowAll, BatchPlan, EngineConfig, EntityHandler, EntityRegistry, EntityRegistryBuilder,
    EntitySchema, HookContext, HookOutcome, MutationHooks, Partition, ReconciliationEngine,
    CONFIG_FILE_NAME,
};
pub use upsync_storage::MemoryStore;

/// Fault injection for tests of code built on upsync
pub mod testing {
    pub use upsync_storage::testing::FaultyStore;
}
