//! Per-record outcomes of a reconciliation batch
//!
//! An outcome is created once, when its record finishes processing, and
//! never changes afterwards. The engine hands the whole map to the caller
//! and keeps nothing.

use crate::error::UpsyncError;
use crate::types::RecordId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Verdict for a single record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum OutcomeKind {
    /// Applied
    NoError,
    /// The ledger holds a newer-or-equal write for this column
    OutdatedChange,
    /// Update or delete against a row that is not stored
    EntityDoesNotExist,
    /// Create against a row that is already stored
    EntityAlreadyExists,
    /// A second create for a row already claimed in this batch
    OnlyOneCreateOperationAllowed,
    /// Hook veto or failure while applying; message in `extra`
    Exception,
    /// Unclassified failure
    Unknown,
}

impl OutcomeKind {
    /// Every kind, in declaration order
    pub const ALL: [OutcomeKind; 7] = [
        OutcomeKind::NoError,
        OutcomeKind::OutdatedChange,
        OutcomeKind::EntityDoesNotExist,
        OutcomeKind::EntityAlreadyExists,
        OutcomeKind::OnlyOneCreateOperationAllowed,
        OutcomeKind::Exception,
        OutcomeKind::Unknown,
    ];

    /// Name as it appears on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            OutcomeKind::NoError => "NoError",
            OutcomeKind::OutdatedChange => "OutdatedChange",
            OutcomeKind::EntityDoesNotExist => "EntityDoesNotExist",
            OutcomeKind::EntityAlreadyExists => "EntityAlreadyExists",
            OutcomeKind::OnlyOneCreateOperationAllowed => "OnlyOneCreateOperationAllowed",
            OutcomeKind::Exception => "Exception",
            OutcomeKind::Unknown => "Unknown",
        }
    }
}

impl fmt::Display for OutcomeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one record: a classification plus an optional payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationOutcome {
    /// Classification
    pub error: OutcomeKind,
    /// Extra detail, e.g. a failure message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extra: Option<String>,
}

impl MutationOutcome {
    /// Outcome without payload
    pub fn new(error: OutcomeKind) -> Self {
        MutationOutcome { error, extra: None }
    }

    /// Successful application
    pub fn ok() -> Self {
        Self::new(OutcomeKind::NoError)
    }

    /// Outcome carrying a message
    pub fn with_message(error: OutcomeKind, message: impl Into<String>) -> Self {
        MutationOutcome {
            error,
            extra: Some(message.into()),
        }
    }

    /// Classify an error raised while applying one record.
    ///
    /// Rejections caused by the record or a hook become `Exception`;
    /// everything else the storage layer raised becomes `Unknown`.
    pub fn from_error(err: &UpsyncError) -> Self {
        let kind = if err.is_record_rejection() {
            OutcomeKind::Exception
        } else {
            OutcomeKind::Unknown
        };
        let message = match err {
            UpsyncError::Vetoed { reason } => reason.clone(),
            other => other.to_string(),
        };
        Self::with_message(kind, message)
    }

    /// True for `NoError`
    pub fn is_ok(&self) -> bool {
        self.error == OutcomeKind::NoError
    }
}

/// Outcomes of a whole batch, keyed by record id
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchOutcome {
    outcomes: HashMap<RecordId, MutationOutcome>,
}

impl BatchOutcome {
    /// Empty result
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty result with room for `n` records
    pub fn with_capacity(n: usize) -> Self {
        BatchOutcome {
            outcomes: HashMap::with_capacity(n),
        }
    }

    /// Record an outcome. Returns false if `id` already had one, which is
    /// kept unchanged.
    pub fn insert(&mut self, id: RecordId, outcome: MutationOutcome) -> bool {
        match self.outcomes.entry(id) {
            std::collections::hash_map::Entry::Occupied(_) => false,
            std::collections::hash_map::Entry::Vacant(slot) => {
                slot.insert(outcome);
                true
            }
        }
    }

    /// Outcome for a record
    pub fn get(&self, id: &RecordId) -> Option<&MutationOutcome> {
        self.outcomes.get(id)
    }

    /// Classification for a record
    pub fn kind(&self, id: &RecordId) -> Option<OutcomeKind> {
        self.outcomes.get(id).map(|o| o.error)
    }

    /// Number of outcomes
    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    /// True if no outcomes were recorded
    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// Iterate over `(record id, outcome)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&RecordId, &MutationOutcome)> {
        self.outcomes.iter()
    }

    /// Counts per outcome kind
    pub fn summary(&self) -> OutcomeSummary {
        let mut summary = OutcomeSummary::default();
        for outcome in self.outcomes.values() {
            summary.add(outcome.error);
        }
        summary
    }

    /// Take the underlying map
    pub fn into_inner(self) -> HashMap<RecordId, MutationOutcome> {
        self.outcomes
    }
}

impl IntoIterator for BatchOutcome {
    type Item = (RecordId, MutationOutcome);
    type IntoIter = std::collections::hash_map::IntoIter<RecordId, MutationOutcome>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// Outcome counts for one batch, used for logging
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeSummary {
    counts: [usize; 7],
}

impl OutcomeSummary {
    fn slot(kind: OutcomeKind) -> usize {
        OutcomeKind::ALL
            .iter()
            .position(|k| *k == kind)
            .unwrap_or(OutcomeKind::ALL.len() - 1)
    }

    /// Count one more outcome of `kind`
    pub fn add(&mut self, kind: OutcomeKind) {
        self.counts[Self::slot(kind)] += 1;
    }

    /// Number of outcomes of `kind`
    pub fn count(&self, kind: OutcomeKind) -> usize {
        self.counts[Self::slot(kind)]
    }

    /// Number of applied records
    pub fn applied(&self) -> usize {
        self.count(OutcomeKind::NoError)
    }

    /// Number of rejected records
    pub fn rejected(&self) -> usize {
        self.total() - self.applied()
    }

    /// Total outcomes
    pub fn total(&self) -> usize {
        self.counts.iter().sum()
    }
}

impl fmt::Display for OutcomeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for kind in OutcomeKind::ALL {
            let n = self.count(kind);
            if n == 0 {
                continue;
            }
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{}={}", kind, n)?;
            first = false;
        }
        if first {
            f.write_str("empty")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_first_outcome_wins() {
        let mut batch = BatchOutcome::new();
        let id = RecordId::new();
        assert!(batch.insert(id, MutationOutcome::ok()));
        assert!(!batch.insert(id, MutationOutcome::new(OutcomeKind::Unknown)));
        assert_eq!(batch.kind(&id), Some(OutcomeKind::NoError));
        assert_eq!(batch.len(), 1);
    }

    #[test]
    fn test_from_error_classification() {
        let veto = MutationOutcome::from_error(&UpsyncError::vetoed("credit limit"));
        assert_eq!(veto.error, OutcomeKind::Exception);
        assert_eq!(veto.extra.as_deref(), Some("credit limit"));

        let storage = MutationOutcome::from_error(&UpsyncError::storage("torn page"));
        assert_eq!(storage.error, OutcomeKind::Unknown);
        assert!(storage.extra.unwrap().contains("torn page"));
    }

    #[test]
    fn test_summary_counts() {
        let mut batch = BatchOutcome::new();
        batch.insert(RecordId::new(), MutationOutcome::ok());
        batch.insert(RecordId::new(), MutationOutcome::ok());
        batch.insert(RecordId::new(), MutationOutcome::new(OutcomeKind::OutdatedChange));

        let summary = batch.summary();
        assert_eq!(summary.applied(), 2);
        assert_eq!(summary.rejected(), 1);
        assert_eq!(summary.count(OutcomeKind::OutdatedChange), 1);
        assert_eq!(summary.to_string(), "NoError=2, OutdatedChange=1");
        assert_eq!(OutcomeSummary::default().to_string(), "empty");
    }

    #[test]
    fn test_outcome_wire_format() {
        let outcome = MutationOutcome::with_message(OutcomeKind::Exception, "boom");
        assert_eq!(
            serde_json::to_value(&outcome).unwrap(),
            json!({"error": "Exception", "extra": "boom"})
        );
        assert_eq!(
            serde_json::to_value(MutationOutcome::ok()).unwrap(),
            json!({"error": "NoError"})
        );
    }
}
