//! Error types for upsync
//!
//! One error enum covers every layer. Whether an error is fatal to the whole
//! batch or only to the record that raised it is decided by
//! [`UpsyncError::is_batch_fatal`], not by which layer produced it.
//! We use `thiserror` for the `Display` and `Error` implementations.

use crate::types::{ColumnName, EntityName, RecordId, RowId};
use thiserror::Error;

/// Result alias used throughout the workspace
pub type UpsyncResult<T> = std::result::Result<T, UpsyncError>;

/// Error type for reconciliation, storage and configuration
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpsyncError {
    /// Unclassified storage failure on a single operation
    #[error("Storage error: {message}")]
    Storage {
        /// Description from the storage layer
        message: String,
    },

    /// Storage cannot be reached at all
    #[error("Storage unavailable: {message}")]
    Unavailable {
        /// Description from the storage layer
        message: String,
    },

    /// A ledger entry with this composite key already exists
    #[error("Unique index violation on ledger entry {table}[{row_id}].{column}")]
    UniqueViolation {
        /// Table name part of the key
        table: EntityName,
        /// Row part of the key
        row_id: RowId,
        /// Column part of the key
        column: ColumnName,
    },

    /// Commit-time validation found that another batch changed data this one read
    #[error("Commit conflict: {reason}")]
    Conflict {
        /// Which row or ledger entry moved
        reason: String,
    },

    /// Commit failed for a reason other than a validation conflict
    #[error("Commit failed: {reason}")]
    Commit {
        /// Failure description
        reason: String,
    },

    /// Operation attempted on a unit of work that is no longer active
    #[error("Unit of work is not active (state: {state})")]
    TransactionNotActive {
        /// Current state, for diagnostics
        state: String,
    },

    /// Record names an entity type nothing registered
    #[error("Unknown entity '{entity}'")]
    UnknownEntity {
        /// Requested entity name
        entity: EntityName,
    },

    /// Record names a column the entity's schema does not declare
    #[error("Unknown column '{column}' on entity '{entity}'")]
    UnknownColumn {
        /// Entity name
        entity: EntityName,
        /// Requested column
        column: ColumnName,
    },

    /// Update record without a column name
    #[error("Update record {record} does not name a column")]
    MissingColumn {
        /// Offending record
        record: RecordId,
    },

    /// Value could not be converted to the column's declared type
    #[error("Cannot coerce {found} into {expected} for column '{column}'")]
    Coercion {
        /// Target column
        column: ColumnName,
        /// Declared Rust type of the column
        expected: &'static str,
        /// Kind of value supplied
        found: &'static str,
    },

    /// A hook refused the operation
    #[error("Vetoed: {reason}")]
    Vetoed {
        /// Reason given by the hook
        reason: String,
    },

    /// Caller supplied malformed input
    #[error("Invalid input: {message}")]
    InvalidInput {
        /// What was wrong
        message: String,
    },

    /// Configuration could not be read or is invalid
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong
        message: String,
    },

    /// Startup registration named the same thing twice
    #[error("Duplicate registration of '{name}'")]
    DuplicateRegistration {
        /// Entity or column name
        name: String,
    },
}

impl UpsyncError {
    /// Unclassified storage failure
    pub fn storage(message: impl Into<String>) -> Self {
        UpsyncError::Storage {
            message: message.into(),
        }
    }

    /// Storage unreachable
    pub fn unavailable(message: impl Into<String>) -> Self {
        UpsyncError::Unavailable {
            message: message.into(),
        }
    }

    /// Commit-time conflict
    pub fn conflict(reason: impl Into<String>) -> Self {
        UpsyncError::Conflict {
            reason: reason.into(),
        }
    }

    /// Commit failure
    pub fn commit(reason: impl Into<String>) -> Self {
        UpsyncError::Commit {
            reason: reason.into(),
        }
    }

    /// Malformed input
    pub fn invalid_input(message: impl Into<String>) -> Self {
        UpsyncError::InvalidInput {
            message: message.into(),
        }
    }

    /// Configuration problem
    pub fn config(message: impl Into<String>) -> Self {
        UpsyncError::Config {
            message: message.into(),
        }
    }

    /// Hook veto
    pub fn vetoed(reason: impl Into<String>) -> Self {
        UpsyncError::Vetoed {
            reason: reason.into(),
        }
    }

    /// True if this error must abort the whole batch.
    ///
    /// Everything else is recovered locally and reported as the outcome of
    /// the record that raised it.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            UpsyncError::Unavailable { .. }
                | UpsyncError::Conflict { .. }
                | UpsyncError::Commit { .. }
                | UpsyncError::TransactionNotActive { .. }
        )
    }

    /// True if a fresh attempt of the same batch may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, UpsyncError::Conflict { .. })
    }

    /// True for errors caused by the record's content or a hook decision,
    /// as opposed to the storage layer misbehaving.
    pub fn is_record_rejection(&self) -> bool {
        matches!(
            self,
            UpsyncError::Vetoed { .. }
                | UpsyncError::Coercion { .. }
                | UpsyncError::UnknownEntity { .. }
                | UpsyncError::UnknownColumn { .. }
                | UpsyncError::MissingColumn { .. }
                | UpsyncError::InvalidInput { .. }
        )
    }
}
