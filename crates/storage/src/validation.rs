//! Commit-time read-set validation
//!
//! Rules:
//! - First committer wins, decided on the READ set
//! - A row or ledger entry recorded as absent (version 0) conflicts if it
//!   now exists, and vice versa
//! - Blind writes never conflict on their own
//!
//! Validation runs under the store's write lock, so the committed state it
//! checks is the state the commit applies to.

use std::fmt;

use rustc_hash::FxHashMap;
use upsync_core::LedgerKey;

use crate::stored::{RowKey, ABSENT_VERSION};
use crate::table::CommittedState;

/// Something another unit of work changed after this one read it
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictType {
    /// Row version moved since it was read
    RowConflict {
        /// Row address
        key: RowKey,
        /// Version when read (0 = absent)
        read_version: u64,
        /// Version at validation time (0 = absent)
        current_version: u64,
    },

    /// Ledger entry version moved since it was read
    LedgerConflict {
        /// Ledger key
        key: LedgerKey,
        /// Version when read (0 = absent)
        read_version: u64,
        /// Version at validation time (0 = absent)
        current_version: u64,
    },
}

impl fmt::Display for ConflictType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConflictType::RowConflict {
                key,
                read_version,
                current_version,
            } => write!(
                f,
                "row {} moved from version {} to {}",
                key, read_version, current_version
            ),
            ConflictType::LedgerConflict {
                key,
                read_version,
                current_version,
            } => write!(
                f,
                "ledger entry {} moved from version {} to {}",
                key, read_version, current_version
            ),
        }
    }
}

/// Outcome of validating one unit of work
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationResult {
    /// Every conflict found
    pub conflicts: Vec<ConflictType>,
}

impl ValidationResult {
    /// No conflicts
    pub fn ok() -> Self {
        Self::default()
    }

    /// True if nothing conflicted
    pub fn is_valid(&self) -> bool {
        self.conflicts.is_empty()
    }

    /// Number of conflicts
    pub fn conflict_count(&self) -> usize {
        self.conflicts.len()
    }

    /// Append the conflicts of `other`
    pub fn merge(&mut self, other: ValidationResult) {
        self.conflicts.extend(other.conflicts);
    }

    /// Short description for a `Conflict` error
    pub fn describe(&self) -> String {
        match self.conflicts.as_slice() {
            [] => "no conflicts".to_string(),
            [only] => only.to_string(),
            [first, rest @ ..] => format!("{} (and {} more)", first, rest.len()),
        }
    }
}

/// Check every row read against the committed state
pub fn validate_row_reads(
    reads: &FxHashMap<RowKey, u64>,
    state: &CommittedState,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (key, read_version) in reads {
        let current_version = state
            .tables
            .get(&key.entity, key.row_id)
            .map(|stored| stored.version())
            .unwrap_or(ABSENT_VERSION);
        if current_version != *read_version {
            result.conflicts.push(ConflictType::RowConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }
    result
}

/// Check every ledger entry read against the committed state
pub fn validate_ledger_reads(
    reads: &FxHashMap<LedgerKey, u64>,
    state: &CommittedState,
) -> ValidationResult {
    let mut result = ValidationResult::ok();
    for (key, read_version) in reads {
        let current_version = state
            .ledger
            .get(key)
            .map(|stored| stored.version)
            .unwrap_or(ABSENT_VERSION);
        if current_version != *read_version {
            result.conflicts.push(ConflictType::LedgerConflict {
                key: key.clone(),
                read_version: *read_version,
                current_version,
            });
        }
    }
    result
}

/// Validate a whole read set
pub fn validate_reads(
    row_reads: &FxHashMap<RowKey, u64>,
    ledger_reads: &FxHashMap<LedgerKey, u64>,
    state: &CommittedState,
) -> ValidationResult {
    let mut result = validate_row_reads(row_reads, state);
    result.merge(validate_ledger_reads(ledger_reads, state));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use upsync_core::{RowId, Timestamp};

    fn ledger_key() -> LedgerKey {
        LedgerKey::new("Customer".into(), RowId::new(), "Name".into())
    }

    #[test]
    fn test_empty_read_set_is_valid() {
        let state = CommittedState::default();
        let result = validate_reads(&FxHashMap::default(), &FxHashMap::default(), &state);
        assert!(result.is_valid());
        assert_eq!(result.describe(), "no conflicts");
    }

    #[test]
    fn test_absent_read_conflicts_when_entry_appears() {
        let mut state = CommittedState::default();
        let key = ledger_key();
        let mut reads = FxHashMap::default();
        reads.insert(key.clone(), ABSENT_VERSION);
        assert!(validate_ledger_reads(&reads, &state).is_valid());

        state.ledger.upsert(key.clone(), Timestamp::from_secs(1), 4);
        let result = validate_ledger_reads(&reads, &state);
        assert_eq!(
            result.conflicts,
            vec![ConflictType::LedgerConflict {
                key,
                read_version: 0,
                current_version: 4
            }]
        );
    }

    #[test]
    fn test_matching_version_is_valid() {
        let mut state = CommittedState::default();
        let key = ledger_key();
        state.ledger.upsert(key.clone(), Timestamp::from_secs(1), 2);
        let mut reads = FxHashMap::default();
        reads.insert(key, 2);
        assert!(validate_ledger_reads(&reads, &state).is_valid());
    }

    #[test]
    fn test_missing_row_read_as_present_conflicts() {
        let state = CommittedState::default();
        let mut reads = FxHashMap::default();
        reads.insert(RowKey::new("Customer".into(), RowId::new()), 3);
        let result = validate_row_reads(&reads, &state);
        assert_eq!(result.conflict_count(), 1);
        assert!(result.describe().contains("version 3 to 0"));
    }
}
