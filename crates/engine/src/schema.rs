//! Typed column setters per entity
//!
//! An `EntitySchema<T>` is built once at startup and maps each writable
//! column name to a closure that coerces an untyped [`Value`] into the
//! column's declared type and stores it on the row. Column names are
//! checked when the record arrives, never by runtime type inspection.
//!
//! # Example
//!
//! ```ignore
//! let schema = EntitySchema::<Customer>::new()
//!     .column("Name", |c: &mut Customer, v: String| c.name = v)
//!     .column("CreditLimit", |c: &mut Customer, v: Option<i64>| c.credit_limit = v);
//! ```

use std::fmt;

use rustc_hash::FxHashMap;
use upsync_core::{ColumnName, Entity, EntityName, FromValue, UpsyncError, UpsyncResult, Value};

type Setter<T> = Box<dyn Fn(&mut T, Value) -> UpsyncResult<()> + Send + Sync>;

struct Column<T> {
    type_name: &'static str,
    setter: Setter<T>,
}

/// Writable columns of entity `T`
pub struct EntitySchema<T: Entity> {
    columns: FxHashMap<ColumnName, Column<T>>,
    order: Vec<ColumnName>,
    duplicate: Option<ColumnName>,
}

impl<T: Entity> Default for EntitySchema<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Entity> fmt::Debug for EntitySchema<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntitySchema")
            .field("entity", &T::NAME)
            .field("columns", &self.order)
            .finish()
    }
}

impl<T: Entity> EntitySchema<T> {
    /// Schema with no writable columns
    pub fn new() -> Self {
        EntitySchema {
            columns: FxHashMap::default(),
            order: Vec::new(),
            duplicate: None,
        }
    }

    /// Declare a writable column of type `V`
    ///
    /// Declare nullable columns as `Option<V>`. Declaring the same name
    /// twice fails registration of the entity with `DuplicateRegistration`.
    pub fn column<V, F>(mut self, name: impl Into<ColumnName>, set: F) -> Self
    where
        V: FromValue + 'static,
        F: Fn(&mut T, V) + Send + Sync + 'static,
    {
        let name = name.into();
        if self.columns.contains_key(&name) {
            self.duplicate.get_or_insert(name);
            return self;
        }
        let column_name = name.clone();
        let setter: Setter<T> = Box::new(move |row: &mut T, value: Value| {
            let typed = V::from_value(value).map_err(|f| f.for_column(&column_name))?;
            set(row, typed);
            Ok(())
        });
        self.order.push(name.clone());
        self.columns.insert(
            name,
            Column {
                type_name: V::TYPE_NAME,
                setter,
            },
        );
        self
    }

    /// Entity name the schema belongs to
    pub fn entity_name(&self) -> EntityName {
        EntityName::from(T::NAME)
    }

    /// Declared columns, in declaration order
    pub fn columns(&self) -> &[ColumnName] {
        &self.order
    }

    /// Declared type of a column
    pub fn column_type(&self, column: &str) -> Option<&'static str> {
        self.columns.get(column).map(|c| c.type_name)
    }

    /// True if the column is declared
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains_key(column)
    }

    /// First column declared twice, if any
    pub(crate) fn duplicate_column(&self) -> Option<&ColumnName> {
        self.duplicate.as_ref()
    }

    /// Coerce `value` and write it to `column` of `row`
    ///
    /// # Errors
    ///
    /// `UnknownColumn` if the column is not declared; `Coercion` if the
    /// value does not convert to the column type. The row is unchanged on
    /// error.
    pub fn set(&self, row: &mut T, column: &str, value: Value) -> UpsyncResult<()> {
        let col = self.columns.get(column).ok_or_else(|| UpsyncError::UnknownColumn {
            entity: self.entity_name(),
            column: ColumnName::from(column),
        })?;
        (col.setter)(row, value)
    }

    /// Apply the initial values of a create record to a new row
    ///
    /// `Null` means no initial values. An `Object` sets each field through
    /// its column setter; any other value is invalid.
    ///
    /// # Errors
    ///
    /// `InvalidInput` for a non-object payload, otherwise the first error
    /// from [`EntitySchema::set`].
    pub fn apply_initial(&self, row: &mut T, value: Value) -> UpsyncResult<()> {
        match value {
            Value::Null => Ok(()),
            Value::Object(fields) => {
                // Deterministic order so the first failure reported is stable
                let mut fields: Vec<(String, Value)> = fields.into_iter().collect();
                fields.sort_by(|a, b| a.0.cmp(&b.0));
                for (column, value) in fields {
                    self.set(row, &column, value)?;
                }
                Ok(())
            }
            other => Err(UpsyncError::invalid_input(format!(
                "create payload for {} must be an object, found {}",
                T::NAME,
                other.type_name()
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use upsync_core::RowId;

    #[derive(Debug, Clone, PartialEq)]
    struct Customer {
        id: RowId,
        name: String,
        credit_limit: Option<i64>,
        active: bool,
    }

    impl Entity for Customer {
        const NAME: &'static str = "Customer";

        fn new_row(row_id: RowId) -> Self {
            Customer {
                id: row_id,
                name: String::new(),
                credit_limit: None,
                active: false,
            }
        }

        fn row_id(&self) -> RowId {
            self.id
        }
    }

    fn schema() -> EntitySchema<Customer> {
        EntitySchema::new()
            .column("Name", |c: &mut Customer, v: String| c.name = v)
            .column("CreditLimit", |c: &mut Customer, v: Option<i64>| {
                c.credit_limit = v
            })
            .column("Active", |c: &mut Customer, v: bool| c.active = v)
    }

    #[test]
    fn test_set_coerces_to_column_type() {
        let schema = schema();
        let mut row = Customer::new_row(RowId::new());
        schema.set(&mut row, "CreditLimit", Value::from("250")).unwrap();
        schema.set(&mut row, "Active", Value::Int(1)).unwrap();
        schema.set(&mut row, "Name", Value::from("Ann")).unwrap();
        assert_eq!(row.credit_limit, Some(250));
        assert!(row.active);
        assert_eq!(row.name, "Ann");
    }

    #[test]
    fn test_null_clears_nullable_column_only() {
        let schema = schema();
        let mut row = Customer::new_row(RowId::new());
        row.credit_limit = Some(5);
        schema.set(&mut row, "CreditLimit", Value::Null).unwrap();
        assert_eq!(row.credit_limit, None);

        let err = schema.set(&mut row, "Active", Value::Null).unwrap_err();
        assert!(matches!(err, UpsyncError::Coercion { .. }));
    }

    #[test]
    fn test_unknown_column() {
        let schema = schema();
        let mut row = Customer::new_row(RowId::new());
        let err = schema.set(&mut row, "Email", Value::from("a@b")).unwrap_err();
        assert_eq!(
            err,
            UpsyncError::UnknownColumn {
                entity: "Customer".into(),
                column: "Email".into()
            }
        );
    }

    #[test]
    fn test_coercion_failure_leaves_row_unchanged() {
        let schema = schema();
        let mut row = Customer::new_row(RowId::new());
        let before = row.clone();
        let err = schema
            .set(&mut row, "CreditLimit", Value::from("lots"))
            .unwrap_err();
        assert_eq!(
            err,
            UpsyncError::Coercion {
                column: "CreditLimit".into(),
                expected: "i64",
                found: "String"
            }
        );
        assert_eq!(row, before);
    }

    #[test]
    fn test_duplicate_column_is_remembered() {
        let schema = schema().column("Name", |c: &mut Customer, v: String| c.name = v);
        assert_eq!(schema.duplicate_column(), Some(&ColumnName::from("Name")));
        assert_eq!(schema.columns().len(), 3);
    }

    #[test]
    fn test_apply_initial_object() {
        let schema = schema();
        let mut row = Customer::new_row(RowId::new());
        let mut fields = HashMap::new();
        fields.insert("Name".to_string(), Value::from("Cy"));
        fields.insert("CreditLimit".to_string(), Value::Int(10));
        schema.apply_initial(&mut row, Value::Object(fields)).unwrap();
        assert_eq!(row.name, "Cy");
        assert_eq!(row.credit_limit, Some(10));
    }

    #[test]
    fn test_apply_initial_rejects_scalars() {
        let schema = schema();
        let mut row = Customer::new_row(RowId::new());
        assert!(schema.apply_initial(&mut row, Value::Null).is_ok());
        let err = schema.apply_initial(&mut row, Value::Int(3)).unwrap_err();
        assert!(matches!(err, UpsyncError::InvalidInput { .. }));
    }

    #[test]
    fn test_column_metadata() {
        let schema = schema();
        assert_eq!(schema.column_type("CreditLimit"), Some("i64"));
        assert_eq!(schema.column_type("Active"), Some("bool"));
        assert!(schema.has_column("Name"));
        assert!(!schema.has_column("name"));
    }
}
