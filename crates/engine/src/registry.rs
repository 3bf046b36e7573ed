//! Entity registry
//!
//! Built once at startup and shared read-only through an `Arc` by every
//! engine that uses it. Each entity name maps to exactly one handler, which
//! owns the entity's schema and its zero or one hook implementation. The
//! binding never changes afterwards.

use std::fmt;

use rustc_hash::FxHashMap;
use tracing::debug;
use upsync_core::{Entity, EntityName, UpsyncError, UpsyncResult};

use crate::handler::{EntityHandler, TypedHandler};
use crate::hooks::MutationHooks;
use crate::schema::EntitySchema;

/// Immutable map from entity name to handler
pub struct EntityRegistry {
    handlers: Vec<Box<dyn EntityHandler>>,
    index: FxHashMap<EntityName, usize>,
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("entities", &self.entity_names())
            .finish()
    }
}

impl EntityRegistry {
    /// Start building a registry
    pub fn builder() -> EntityRegistryBuilder {
        EntityRegistryBuilder::default()
    }

    /// Handler for `entity`
    pub fn get(&self, entity: &str) -> Option<&dyn EntityHandler> {
        self.index.get(entity).map(|&i| self.handlers[i].as_ref())
    }

    /// True if `entity` is registered
    pub fn contains(&self, entity: &str) -> bool {
        self.index.contains_key(entity)
    }

    /// Registered entity names, in registration order
    pub fn entity_names(&self) -> Vec<&EntityName> {
        self.handlers.iter().map(|h| h.entity_name()).collect()
    }

    /// Handlers in registration order
    pub fn handlers(&self) -> impl Iterator<Item = &dyn EntityHandler> {
        self.handlers.iter().map(|h| h.as_ref())
    }

    /// Number of registered entities
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// True if nothing is registered
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Builder for [`EntityRegistry`]
///
/// # Example
///
/// ```ignore
/// let registry = EntityRegistry::builder()
///     .register(customer_schema)?
///     .register_with_hooks(order_schema, OrderAudit::new())?
///     .build();
/// ```
#[derive(Default)]
pub struct EntityRegistryBuilder {
    handlers: Vec<Box<dyn EntityHandler>>,
    index: FxHashMap<EntityName, usize>,
}

impl fmt::Debug for EntityRegistryBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&EntityName> = self.handlers.iter().map(|h| h.entity_name()).collect();
        f.debug_struct("EntityRegistryBuilder")
            .field("entities", &names)
            .finish()
    }
}

impl EntityRegistryBuilder {
    /// Register entity `T` without hooks; every operation is allowed
    ///
    /// # Errors
    ///
    /// `DuplicateRegistration` if `T::NAME` is already registered or the
    /// schema declares a column twice.
    pub fn register<T: Entity>(self, schema: EntitySchema<T>) -> UpsyncResult<Self> {
        self.insert(schema, None)
    }

    /// Register entity `T` with hooks
    ///
    /// # Errors
    ///
    /// Same as [`EntityRegistryBuilder::register`].
    pub fn register_with_hooks<T, H>(self, schema: EntitySchema<T>, hooks: H) -> UpsyncResult<Self>
    where
        T: Entity,
        H: MutationHooks<T> + 'static,
    {
        self.insert(schema, Some(Box::new(hooks)))
    }

    fn insert<T: Entity>(
        mut self,
        schema: EntitySchema<T>,
        hooks: Option<Box<dyn MutationHooks<T>>>,
    ) -> UpsyncResult<Self> {
        let name = EntityName::from(T::NAME);
        if self.index.contains_key(&name) {
            return Err(UpsyncError::DuplicateRegistration {
                name: name.to_string(),
            });
        }
        if let Some(column) = schema.duplicate_column() {
            return Err(UpsyncError::DuplicateRegistration {
                name: format!("{}.{}", name, column),
            });
        }
        debug!(
            entity = %name,
            columns = schema.columns().len(),
            hooks = hooks.is_some(),
            "registered entity"
        );
        self.index.insert(name, self.handlers.len());
        self.handlers.push(Box::new(TypedHandler::new(schema, hooks)));
        Ok(self)
    }

    /// Freeze the registry
    pub fn build(self) -> EntityRegistry {
        EntityRegistry {
            handlers: self.handlers,
            index: self.index,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::AllowAll;
    use upsync_core::RowId;

    #[derive(Debug, Clone)]
    struct Invoice {
        id: RowId,
        total: i64,
    }

    impl Entity for Invoice {
        const NAME: &'static str = "Invoice";

        fn new_row(row_id: RowId) -> Self {
            Invoice { id: row_id, total: 0 }
        }

        fn row_id(&self) -> RowId {
            self.id
        }
    }

    #[derive(Debug, Clone)]
    struct Payment {
        id: RowId,
    }

    impl Entity for Payment {
        const NAME: &'static str = "Payment";

        fn new_row(row_id: RowId) -> Self {
            Payment { id: row_id }
        }

        fn row_id(&self) -> RowId {
            self.id
        }
    }

    fn invoice_schema() -> EntitySchema<Invoice> {
        EntitySchema::new().column("Total", |i: &mut Invoice, v: i64| i.total = v)
    }

    #[test]
    fn test_register_and_lookup() {
        let registry = EntityRegistry::builder()
            .register(invoice_schema())
            .unwrap()
            .register_with_hooks(EntitySchema::<Payment>::new(), AllowAll)
            .unwrap()
            .build();

        assert_eq!(registry.len(), 2);
        assert!(registry.contains("Invoice"));
        assert!(registry.get("Refund").is_none());
        let names: Vec<&str> = registry.entity_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, vec!["Invoice", "Payment"]);
    }

    #[test]
    fn test_duplicate_entity_rejected() {
        let err = EntityRegistry::builder()
            .register(invoice_schema())
            .unwrap()
            .register(invoice_schema())
            .unwrap_err();
        assert_eq!(
            err,
            UpsyncError::DuplicateRegistration {
                name: "Invoice".into()
            }
        );
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let schema = invoice_schema().column("Total", |i: &mut Invoice, v: i64| i.total = v);
        let err = EntityRegistry::builder().register(schema).unwrap_err();
        assert_eq!(
            err,
            UpsyncError::DuplicateRegistration {
                name: "Invoice.Total".into()
            }
        );
    }

    #[test]
    fn test_empty_registry() {
        let registry = EntityRegistry::builder().build();
        assert!(registry.is_empty());
        assert_eq!(registry.handlers().count(), 0);
    }
}
