//! Core types and traits for upsync
//!
//! This crate defines the vocabulary shared by every layer:
//! - Identifiers: RowId, RecordId, EntityName, ColumnName, LedgerKey
//! - Timestamp: microsecond wall-clock time used for conflict ordering
//! - Value: untyped record payload, and FromValue coercion into column types
//! - MutationRecord / Operation: one client-captured change
//! - OutcomeKind / MutationOutcome / BatchOutcome: per-record verdicts
//! - LedgerEntry: persisted change-ledger row
//! - Error: UpsyncError and UpsyncResult
//! - Traits: Entity, AnyRow, EntityStore, LedgerStore, UnitOfWork, Storage

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod coerce;
pub mod contract;
pub mod error;
pub mod ledger;
pub mod outcome;
pub mod record;
pub mod traits;
pub mod types;
pub mod value;

pub use coerce::{CoercionFailure, FromValue};
pub use contract::Timestamp;
pub use error::{UpsyncError, UpsyncResult};
pub use ledger::LedgerEntry;
pub use outcome::{BatchOutcome, MutationOutcome, OutcomeKind, OutcomeSummary};
pub use record::{MutationRecord, Operation};
pub use traits::{
    downcast_ref, downcast_row, AnyRow, CommitInfo, Entity, EntityStore, Isolation, LedgerStore,
    Savepoint, Storage, UnitOfWork,
};
pub use types::{ColumnName, EntityName, LedgerKey, RecordId, RowId};
pub use value::Value;
