//! Storage layer for upsync
//!
//! This crate implements the in-memory storage backend with:
//! - MemoryStore: entity tables and the change ledger behind one RwLock
//! - MemoryTransaction: buffered writes, undo-journal savepoints, and
//!   commit-time read-set validation (first committer wins)
//! - Validation: row and ledger read-set conflict detection
//! - Testing: FaultyStore for injecting outages and commit failures
//!
//! # Isolation
//!
//! `Isolation::Serializable` validates every row and ledger entry a
//! transaction read; a concurrent change to any of them fails the commit
//! with `Conflict`. `Isolation::ReadCommitted` skips validation and the
//! last commit wins.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod memory;
pub mod stored;
pub mod table;
pub mod testing;
pub mod transaction;
pub mod validation;

pub use memory::MemoryStore;
pub use stored::{RowKey, StoredLedgerEntry, StoredRow, ABSENT_VERSION};
pub use table::{CommittedState, EntityTables, LedgerTable};
pub use transaction::{MemoryTransaction, TransactionStatus};
pub use validation::{ConflictType, ValidationResult};
