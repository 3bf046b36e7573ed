//! Identifier types
//!
//! - `RowId`: stable, client-assigned identity of an entity row
//! - `RecordId`: client token identifying one mutation record in a batch
//! - `EntityName` / `ColumnName`: logical names resolved through the registry
//! - `LedgerKey`: composite key of one change-ledger entry

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a random identifier (UUID v4)
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Parse from the standard textual UUID form.
            ///
            /// Returns `None` if the string is not a valid UUID.
            pub fn from_string(s: &str) -> Option<Self> {
                Uuid::parse_str(s).ok().map(Self)
            }

            /// The underlying UUID
            pub const fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0.hyphenated())
            }
        }
    };
}

uuid_id! {
    /// Stable identifier of an entity row.
    ///
    /// Independent of any storage-assigned primary key: the client mints it
    /// when it creates the row offline and keeps using it for every later
    /// mutation of that row.
    RowId
}

uuid_id! {
    /// Client-generated token identifying a mutation record.
    ///
    /// Keys the outcome map returned for a batch.
    RecordId
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Create from anything string-like
            pub fn new(name: impl Into<String>) -> Self {
                Self(name.into())
            }

            /// Borrow as `&str`
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl std::borrow::Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_type! {
    /// Logical name of an entity type (also the ledger's table name)
    EntityName
}

name_type! {
    /// Name of a single column of an entity type
    ColumnName
}

/// Composite key of a change-ledger entry.
///
/// Field order matches the unique index `(RowGuid, TableName, ColumnName)`,
/// so the derived ordering sorts entries of one row together.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct LedgerKey {
    /// Row the column belongs to
    pub row_id: RowId,
    /// Table (entity) name
    pub table: EntityName,
    /// Column written
    pub column: ColumnName,
}

impl LedgerKey {
    /// Build a key
    pub fn new(table: EntityName, row_id: RowId, column: ColumnName) -> Self {
        LedgerKey {
            row_id,
            table,
            column,
        }
    }
}

impl fmt::Display for LedgerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}].{}", self.table, self.row_id, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_row_ids_are_unique() {
        let ids: HashSet<RowId> = (0..100).map(|_| RowId::new()).collect();
        assert_eq!(ids.len(), 100);
    }

    #[test]
    fn test_row_id_parse_and_display() {
        let id = RowId::new();
        let parsed = RowId::from_string(&id.to_string()).unwrap();
        assert_eq!(id, parsed);
        assert!(RowId::from_string("not-a-uuid").is_none());
    }

    #[test]
    fn test_record_id_serializes_as_plain_uuid() {
        let id = RecordId::new();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, format!("\"{}\"", id));
    }

    #[test]
    fn test_names_compare_by_content() {
        assert_eq!(EntityName::from("Customer"), EntityName::new("Customer".to_string()));
        assert_ne!(ColumnName::from("Name"), ColumnName::from("name"));
    }

    #[test]
    fn test_ledger_key_orders_by_row_first() {
        let row_a = RowId::from_uuid(Uuid::from_u128(1));
        let row_b = RowId::from_uuid(Uuid::from_u128(2));
        let k1 = LedgerKey::new("Zeta".into(), row_a, "Name".into());
        let k2 = LedgerKey::new("Alpha".into(), row_b, "Name".into());
        assert!(k1 < k2);
    }

    #[test]
    fn test_ledger_key_display() {
        let row = RowId::from_uuid(Uuid::nil());
        let key = LedgerKey::new("Customer".into(), row, "Name".into());
        assert_eq!(
            key.to_string(),
            "Customer[00000000-0000-0000-0000-000000000000].Name"
        );
    }
}
