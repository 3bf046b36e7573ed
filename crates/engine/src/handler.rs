//! Per-entity application of records
//!
//! [`EntityHandler`] is the type-erased face of one registered entity. Its
//! only implementation, `TypedHandler<T>`, downcasts rows to `T`, writes
//! columns through the entity's schema and calls its hooks. The engine
//! talks to handlers only, so it never needs to know a concrete row type.
//!
//! Each `apply_*` returns the record's outcome kind when the record was
//! classified without failing (`NoError`, `OutdatedChange`,
//! `EntityDoesNotExist`, `EntityAlreadyExists`), and an error otherwise.
//! The engine decides what an error means for the record and the batch.

use upsync_concurrency::{ledger_key, ChangeLedger, Freshness, TieBreak};
use upsync_core::{
    downcast_row, Entity, EntityName, MutationRecord, OutcomeKind, UnitOfWork,
    UpsyncError, UpsyncResult,
};

use crate::hooks::{HookContext, HookOutcome, MutationHooks};
use crate::schema::EntitySchema;

/// Type-erased handler for one entity
pub trait EntityHandler: Send + Sync {
    /// Entity handled
    fn entity_name(&self) -> &EntityName;

    /// Apply a `Create` record
    ///
    /// # Errors
    ///
    /// Hook vetoes, invalid create payloads, and storage errors.
    fn apply_create(&self, uow: &mut dyn UnitOfWork, record: &MutationRecord) -> UpsyncResult<OutcomeKind>;

    /// Apply an `Update` record
    ///
    /// # Errors
    ///
    /// Missing or unknown columns, coercion failures, hook vetoes, and
    /// storage errors.
    fn apply_update(
        &self,
        uow: &mut dyn UnitOfWork,
        record: &MutationRecord,
        tie_break: TieBreak,
    ) -> UpsyncResult<OutcomeKind>;

    /// Apply a `Delete` record
    ///
    /// # Errors
    ///
    /// Hook vetoes and storage errors.
    fn apply_delete(&self, uow: &mut dyn UnitOfWork, record: &MutationRecord) -> UpsyncResult<OutcomeKind>;

    /// Batch-completion hook
    ///
    /// # Errors
    ///
    /// Whatever the hook returns.
    fn on_commit(&self) -> UpsyncResult<()>;
}

/// Handler for entity `T`
pub(crate) struct TypedHandler<T: Entity> {
    name: EntityName,
    schema: EntitySchema<T>,
    hooks: Option<Box<dyn MutationHooks<T>>>,
}

impl<T: Entity> TypedHandler<T> {
    pub(crate) fn new(schema: EntitySchema<T>, hooks: Option<Box<dyn MutationHooks<T>>>) -> Self {
        TypedHandler {
            name: EntityName::from(T::NAME),
            schema,
            hooks,
        }
    }

    fn find(&self, uow: &mut dyn UnitOfWork, record: &MutationRecord) -> UpsyncResult<Option<T>> {
        match uow.find(&self.name, record.entity_row_id)? {
            None => Ok(None),
            Some(row) => downcast_row::<T>(row).map(Some).ok_or_else(|| {
                UpsyncError::storage(format!(
                    "row {}[{}] is not stored as {}",
                    self.name,
                    record.entity_row_id,
                    T::NAME
                ))
            }),
        }
    }

    fn run_hook<F>(&self, call: F) -> UpsyncResult<()>
    where
        F: FnOnce(&dyn MutationHooks<T>) -> HookOutcome,
    {
        match &self.hooks {
            Some(hooks) => call(hooks.as_ref()).into_result(),
            None => Ok(()),
        }
    }
}

impl<T: Entity> EntityHandler for TypedHandler<T> {
    fn entity_name(&self) -> &EntityName {
        &self.name
    }

    fn apply_create(&self, uow: &mut dyn UnitOfWork, record: &MutationRecord) -> UpsyncResult<OutcomeKind> {
        if self.find(uow, record)?.is_some() {
            return Ok(OutcomeKind::EntityAlreadyExists);
        }
        let ctx = HookContext::new(record);
        let mut row = T::new_row(record.entity_row_id);
        self.schema.apply_initial(&mut row, record.new_value.clone())?;

        self.run_hook(|h| h.before_create(&ctx, &row))?;
        uow.insert(&self.name, Box::new(row.clone()))?;
        self.run_hook(|h| h.after_create(&ctx, &row))?;
        Ok(OutcomeKind::NoError)
    }

    fn apply_update(
        &self,
        uow: &mut dyn UnitOfWork,
        record: &MutationRecord,
        tie_break: TieBreak,
    ) -> UpsyncResult<OutcomeKind> {
        let Some(mut row) = self.find(uow, record)? else {
            return Ok(OutcomeKind::EntityDoesNotExist);
        };
        let column = record
            .column_name
            .as_ref()
            .ok_or(UpsyncError::MissingColumn { record: record.id })?;
        if !self.schema.has_column(column.as_str()) {
            return Err(UpsyncError::UnknownColumn {
                entity: self.name.clone(),
                column: column.clone(),
            });
        }

        let key = ledger_key(&self.name, record.entity_row_id, column);
        let freshness = ChangeLedger::with_tie_break(&mut *uow, tie_break).check(&key, record.occurred_at)?;
        if let Freshness::Stale { .. } = freshness {
            return Ok(OutcomeKind::OutdatedChange);
        }

        let ctx = HookContext::new(record);
        self.run_hook(|h| h.before_update(&ctx, &row))?;
        self.schema
            .set(&mut row, column.as_str(), record.new_value.clone())?;
        uow.update(&self.name, Box::new(row.clone()))?;
        self.run_hook(|h| h.after_update(&ctx, &row))?;

        ChangeLedger::with_tie_break(&mut *uow, tie_break).record_change(key, record.occurred_at)?;
        Ok(OutcomeKind::NoError)
    }

    fn apply_delete(&self, uow: &mut dyn UnitOfWork, record: &MutationRecord) -> UpsyncResult<OutcomeKind> {
        let Some(row) = self.find(uow, record)? else {
            return Ok(OutcomeKind::EntityDoesNotExist);
        };
        let ctx = HookContext::new(record);
        self.run_hook(|h| h.before_delete(&ctx, &row))?;
        uow.remove(&self.name, record.entity_row_id)?;
        self.run_hook(|h| h.after_delete(&ctx, &row))?;
        Ok(OutcomeKind::NoError)
    }

    fn on_commit(&self) -> UpsyncResult<()> {
        match &self.hooks {
            Some(hooks) => hooks.on_commit(),
            None => Ok(()),
        }
    }
}
