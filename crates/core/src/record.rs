//! Mutation records
//!
//! A record describes one intended change captured by a disconnected client:
//! a whole-row create or delete, or a single column write. Records are
//! immutable once built; the engine consumes a batch of them per call and
//! never persists them.

use crate::contract::Timestamp;
use crate::types::{ColumnName, EntityName, RecordId, RowId};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Kind of change a record requests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Operation {
    /// Unset; carries no semantics and is rejected on apply
    #[default]
    None,
    /// Insert a new row
    Create,
    /// Write one column of an existing row
    Update,
    /// Remove an existing row
    Delete,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::None => "None",
            Operation::Create => "Create",
            Operation::Update => "Update",
            Operation::Delete => "Delete",
        };
        f.write_str(name)
    }
}

/// One client-captured mutation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MutationRecord {
    /// Client token; keys this record's outcome
    pub id: RecordId,
    /// Target row
    pub entity_row_id: RowId,
    /// Target entity type
    pub entity_name: EntityName,
    /// Column written (updates only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_name: Option<ColumnName>,
    /// Requested change
    pub operation: Operation,
    /// Value to write, coerced to the column type at apply time
    #[serde(default)]
    pub new_value: Value,
    /// When the client decided the change; sole input to conflict ordering
    pub occurred_at: Timestamp,
    /// Side-channel values hooks may consult
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub extras: HashMap<String, Value>,
}

impl MutationRecord {
    fn base(
        entity: impl Into<EntityName>,
        row_id: RowId,
        operation: Operation,
        occurred_at: Timestamp,
    ) -> Self {
        MutationRecord {
            id: RecordId::new(),
            entity_row_id: row_id,
            entity_name: entity.into(),
            column_name: None,
            operation,
            new_value: Value::Null,
            occurred_at,
            extras: HashMap::new(),
        }
    }

    /// Create record for a new row
    pub fn create(entity: impl Into<EntityName>, row_id: RowId, occurred_at: Timestamp) -> Self {
        Self::base(entity, row_id, Operation::Create, occurred_at)
    }

    /// Single-column write
    pub fn update(
        entity: impl Into<EntityName>,
        row_id: RowId,
        column: impl Into<ColumnName>,
        new_value: impl Into<Value>,
        occurred_at: Timestamp,
    ) -> Self {
        let mut record = Self::base(entity, row_id, Operation::Update, occurred_at);
        record.column_name = Some(column.into());
        record.new_value = new_value.into();
        record
    }

    /// Row removal
    pub fn delete(entity: impl Into<EntityName>, row_id: RowId, occurred_at: Timestamp) -> Self {
        Self::base(entity, row_id, Operation::Delete, occurred_at)
    }

    /// Replace the generated record id
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = id;
        self
    }

    /// Set the payload (initial column values for a create)
    pub fn with_value(mut self, value: impl Into<Value>) -> Self {
        self.new_value = value.into();
        self
    }

    /// Attach a side-channel value
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Look up a side-channel value
    pub fn extra(&self, key: &str) -> Option<&Value> {
        self.extras.get(key)
    }
}
