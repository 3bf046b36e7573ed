//! Concurrency layer for upsync
//!
//! This crate implements column-level optimistic conflict detection with:
//! - ChangeLedger: `(table, row, column) -> last_changed_on` lookups and
//!   upserts over a unit of work
//! - Freshness: the stale-write verdict for one incoming column write
//! - TieBreak: policy for writes whose timestamp equals the ledger's
//!
//! Cross-batch isolation is delegated to the unit of work; see
//! `upsync_storage` for the serializable read-set validation that makes
//! "read ledger, decide, write ledger" safe across concurrent batches.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod freshness;
pub mod ledger;

pub use freshness::{Freshness, TieBreak};
pub use ledger::{ledger_key, ChangeLedger, RecordedAs};
