//! Testing utilities for storage failure handling
//!
//! - **FaultyStore**: wraps any [`Storage`](upsync_core::Storage) and injects
//!   unavailability, commit failures, commit conflicts and per-row read errors
//!
//! # Example
//!
//! ```ignore
//! use upsync_storage::{testing::FaultyStore, MemoryStore};
//!
//! let store = FaultyStore::new(MemoryStore::new());
//! store.fail_next_commits(1);
//! // the next commit returns UpsyncError::Commit and applies nothing
//! ```

mod faults;

pub use faults::{FaultyStore, FaultyUnitOfWork};
