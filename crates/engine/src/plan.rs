//! Batch planning
//!
//! Turns a submitted batch into the order records are applied in:
//! 1. Partition by `(entity, row)` in order of first appearance
//! 2. Keep the first `Create` of each partition; later ones are rejected
//!    with `OnlyOneCreateOperationAllowed` without touching storage
//! 3. Stable-sort the partition's updates and deletes by `occurred_at`
//!
//! A partition's `Create` always runs before its updates and deletes.
//! Records with `Operation::None` are rejected up front with `Exception`.

use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;
use upsync_core::{
    EntityName, MutationOutcome, MutationRecord, Operation, OutcomeKind, RecordId, RowId,
    UpsyncError, UpsyncResult,
};

/// Records targeting one row, in apply order
#[derive(Debug, Clone, PartialEq)]
pub struct Partition {
    /// Target entity
    pub entity: EntityName,
    /// Target row
    pub row_id: RowId,
    /// The create that claimed the row, if any
    pub create: Option<MutationRecord>,
    /// Updates and deletes, sorted by `occurred_at`
    pub changes: Vec<MutationRecord>,
}

impl Partition {
    fn new(entity: EntityName, row_id: RowId) -> Self {
        Partition {
            entity,
            row_id,
            create: None,
            changes: Vec::new(),
        }
    }

    /// Records in apply order
    pub fn records(&self) -> impl Iterator<Item = &MutationRecord> {
        self.create.iter().chain(self.changes.iter())
    }

    /// Number of records to apply
    pub fn record_count(&self) -> usize {
        self.changes.len() + usize::from(self.create.is_some())
    }
}

/// Apply order for one batch, plus records rejected while planning
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchPlan {
    partitions: Vec<Partition>,
    rejected: Vec<(RecordId, MutationOutcome)>,
    submitted: usize,
}

impl BatchPlan {
    /// Plan a batch
    ///
    /// # Errors
    ///
    /// `InvalidInput` if two records share an id; outcomes are keyed by id,
    /// so the batch would be ambiguous.
    pub fn build(records: Vec<MutationRecord>) -> UpsyncResult<Self> {
        let submitted = records.len();
        let mut seen: FxHashSet<RecordId> = FxHashSet::default();
        for record in &records {
            if !seen.insert(record.id) {
                return Err(UpsyncError::invalid_input(format!(
                    "record id {} appears more than once in the batch",
                    record.id
                )));
            }
        }

        let mut partitions: Vec<Partition> = Vec::new();
        let mut index: FxHashMap<(EntityName, RowId), usize> = FxHashMap::default();
        let mut rejected = Vec::new();

        for record in records {
            if record.operation == Operation::None {
                debug!(record_id = %record.id, "rejecting record without operation");
                rejected.push((
                    record.id,
                    MutationOutcome::with_message(OutcomeKind::Exception, "operation not specified"),
                ));
                continue;
            }

            let key = (record.entity_name.clone(), record.entity_row_id);
            let slot = *index.entry(key).or_insert_with(|| {
                partitions.push(Partition::new(
                    record.entity_name.clone(),
                    record.entity_row_id,
                ));
                partitions.len() - 1
            });
            let partition = &mut partitions[slot];

            match record.operation {
                Operation::Create if partition.create.is_some() => {
                    debug!(
                        record_id = %record.id,
                        row_id = %record.entity_row_id,
                        "row already claimed by an earlier create"
                    );
                    rejected.push((
                        record.id,
                        MutationOutcome::new(OutcomeKind::OnlyOneCreateOperationAllowed),
                    ));
                }
                Operation::Create => partition.create = Some(record),
                _ => partition.changes.push(record),
            }
        }

        for partition in &mut partitions {
            // sort_by_key is stable: equal timestamps keep submission order
            partition.changes.sort_by_key(|r| r.occurred_at);
        }

        Ok(BatchPlan {
            partitions,
            rejected,
            submitted,
        })
    }

    /// Partitions in order of first appearance
    pub fn partitions(&self) -> &[Partition] {
        &self.partitions
    }

    /// Records rejected while planning, with their outcomes
    pub fn rejected(&self) -> &[(RecordId, MutationOutcome)] {
        &self.rejected
    }

    /// Records in apply order, across all partitions
    pub fn steps(&self) -> impl Iterator<Item = &MutationRecord> {
        self.partitions.iter().flat_map(Partition::records)
    }

    /// Number of records to apply
    pub fn step_count(&self) -> usize {
        self.partitions.iter().map(Partition::record_count).sum()
    }

    /// Number of records submitted
    pub fn submitted(&self) -> usize {
        self.submitted
    }

    /// True if the batch had no records
    pub fn is_empty(&self) -> bool {
        self.submitted == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use upsync_core::Timestamp;

    fn ts(ms: u64) -> Timestamp {
        Timestamp::from_millis(ms)
    }

    #[test]
    fn test_empty_batch() {
        let plan = BatchPlan::build(Vec::new()).unwrap();
        assert!(plan.is_empty());
        assert_eq!(plan.step_count(), 0);
        assert!(plan.rejected().is_empty());
    }

    #[test]
    fn test_second_create_rejected() {
        let row = RowId::new();
        let first = MutationRecord::create("Customer", row, ts(5));
        let second = MutationRecord::create("Customer", row, ts(1));
        let third = MutationRecord::create("Customer", row, ts(9));
        let plan = BatchPlan::build(vec![first.clone(), second.clone(), third.clone()]).unwrap();

        assert_eq!(plan.partitions().len(), 1);
        assert_eq!(plan.partitions()[0].create.as_ref().unwrap().id, first.id);
        let rejected: Vec<_> = plan.rejected().iter().map(|(id, o)| (*id, o.error)).collect();
        assert_eq!(
            rejected,
            vec![
                (second.id, OutcomeKind::OnlyOneCreateOperationAllowed),
                (third.id, OutcomeKind::OnlyOneCreateOperationAllowed),
            ]
        );
    }

    #[test]
    fn test_changes_sorted_and_create_first() {
        let row = RowId::new();
        let late = MutationRecord::update("Customer", row, "Name", "Bob", ts(2000));
        let early = MutationRecord::update("Customer", row, "Name", "Alice", ts(1500));
        let create = MutationRecord::create("Customer", row, ts(3000));
        let plan = BatchPlan::build(vec![late.clone(), early.clone(), create.clone()]).unwrap();

        let order: Vec<RecordId> = plan.steps().map(|r| r.id).collect();
        assert_eq!(order, vec![create.id, early.id, late.id]);
    }

    #[test]
    fn test_equal_timestamps_keep_submission_order() {
        let row = RowId::new();
        let a = MutationRecord::update("Customer", row, "Name", "a", ts(7));
        let b = MutationRecord::update("Customer", row, "Name", "b", ts(7));
        let plan = BatchPlan::build(vec![a.clone(), b.clone()]).unwrap();
        let order: Vec<RecordId> = plan.steps().map(|r| r.id).collect();
        assert_eq!(order, vec![a.id, b.id]);
    }

    #[test]
    fn test_partitions_in_first_appearance_order() {
        let (r1, r2) = (RowId::new(), RowId::new());
        let plan = BatchPlan::build(vec![
            MutationRecord::delete("Order", r2, ts(1)),
            MutationRecord::delete("Customer", r1, ts(1)),
            MutationRecord::update("Order", r2, "Qty", 1i64, ts(0)),
        ])
        .unwrap();
        let rows: Vec<RowId> = plan.partitions().iter().map(|p| p.row_id).collect();
        assert_eq!(rows, vec![r2, r1]);
        assert_eq!(plan.partitions()[0].record_count(), 2);
    }

    #[test]
    fn test_same_row_id_different_entities_are_separate() {
        let row = RowId::new();
        let plan = BatchPlan::build(vec![
            MutationRecord::create("Customer", row, ts(1)),
            MutationRecord::create("Order", row, ts(1)),
        ])
        .unwrap();
        assert_eq!(plan.partitions().len(), 2);
        assert!(plan.rejected().is_empty());
    }

    #[test]
    fn test_operation_none_rejected() {
        let mut record = MutationRecord::delete("Customer", RowId::new(), ts(1));
        record.operation = Operation::None;
        let plan = BatchPlan::build(vec![record.clone()]).unwrap();
        assert_eq!(plan.step_count(), 0);
        assert_eq!(
            plan.rejected(),
            &[(
                record.id,
                MutationOutcome::with_message(OutcomeKind::Exception, "operation not specified")
            )]
        );
    }

    #[test]
    fn test_duplicate_record_id_is_invalid_input() {
        let record = MutationRecord::create("Customer", RowId::new(), ts(1));
        let err = BatchPlan::build(vec![record.clone(), record]).unwrap_err();
        assert!(matches!(err, UpsyncError::InvalidInput { .. }));
    }

    proptest! {
        /// Every submitted record is either planned or rejected, exactly once
        #[test]
        fn prop_every_record_accounted_for(ops in prop::collection::vec((0u8..4, 0usize..3, 0u64..50), 0..40)) {
            let rows: Vec<RowId> = (0..3).map(|_| RowId::new()).collect();
            let records: Vec<MutationRecord> = ops
                .iter()
                .map(|(op, row, t)| {
                    let mut r = MutationRecord::update("E", rows[*row], "C", 1i64, ts(*t));
                    r.operation = match op {
                        0 => Operation::Create,
                        1 => Operation::Update,
                        2 => Operation::Delete,
                        _ => Operation::None,
                    };
                    r
                })
                .collect();
            let plan = BatchPlan::build(records.clone()).unwrap();
            prop_assert_eq!(plan.step_count() + plan.rejected().len(), records.len());
            for partition in plan.partitions() {
                prop_assert!(partition.changes.windows(2).all(|w| w[0].occurred_at <= w[1].occurred_at));
                prop_assert!(partition.changes.iter().all(|r| r.operation != Operation::Create));
            }
        }
    }
}
