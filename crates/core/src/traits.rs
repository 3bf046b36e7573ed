//! Storage abstraction for the reconciliation engine
//!
//! The engine never talks to a concrete database. It opens a [`UnitOfWork`]
//! from a [`Storage`], stages row and ledger changes through it, and commits
//! exactly once per batch. Any backend that can fetch a row by [`RowId`],
//! stage inserts, updates and deletes, keep the ledger, and commit the lot
//! atomically can sit behind these traits.
//!
//! Rows cross this boundary type-erased as [`AnyRow`]; typed access happens
//! in the engine's registry, which downcasts to the concrete [`Entity`].

use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::contract::Timestamp;
use crate::error::UpsyncResult;
use crate::ledger::LedgerEntry;
use crate::types::{EntityName, LedgerKey, RowId};

/// A stored entity type
///
/// Implementors are plain Rust structs; the engine writes columns through
/// setters registered in an entity schema, never through reflection.
pub trait Entity: Clone + Send + Sync + fmt::Debug + 'static {
    /// Logical entity name records refer to
    const NAME: &'static str;

    /// Fresh row with every column at its default, identified by `row_id`
    fn new_row(row_id: RowId) -> Self;

    /// Stable identity of this row
    fn row_id(&self) -> RowId;
}

/// Object-safe, type-erased row
pub trait AnyRow: Any + Send + Sync + fmt::Debug {
    /// Deep copy
    fn clone_row(&self) -> Box<dyn AnyRow>;

    /// Borrow for downcasting
    fn as_any(&self) -> &dyn Any;

    /// Consume for downcasting
    fn into_any(self: Box<Self>) -> Box<dyn Any>;

    /// Stable identity of the row
    fn erased_row_id(&self) -> RowId;

    /// Entity name of the concrete type
    fn erased_entity_name(&self) -> &'static str;
}

impl<T: Entity> AnyRow for T {
    fn clone_row(&self) -> Box<dyn AnyRow> {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn into_any(self: Box<Self>) -> Box<dyn Any> {
        self
    }

    fn erased_row_id(&self) -> RowId {
        self.row_id()
    }

    fn erased_entity_name(&self) -> &'static str {
        T::NAME
    }
}

impl Clone for Box<dyn AnyRow> {
    fn clone(&self) -> Self {
        self.clone_row()
    }
}

/// Recover the concrete entity from an erased row.
///
/// Returns `None` if the row is of another type.
pub fn downcast_row<T: Entity>(row: Box<dyn AnyRow>) -> Option<T> {
    row.into_any().downcast::<T>().ok().map(|boxed| *boxed)
}

/// Borrowing variant of [`downcast_row`]
pub fn downcast_ref<T: Entity>(row: &dyn AnyRow) -> Option<&T> {
    row.as_any().downcast_ref::<T>()
}

/// Row access inside a unit of work
///
/// Reads return private copies; changes become visible to other units of
/// work only through [`UnitOfWork::commit`].
pub trait EntityStore {
    /// Fetch a row by stable identifier
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn find(&mut self, entity: &EntityName, row_id: RowId) -> UpsyncResult<Option<Box<dyn AnyRow>>>;

    /// Stage a new row
    ///
    /// # Errors
    ///
    /// Fails if a row with the same identifier is visible.
    fn insert(&mut self, entity: &EntityName, row: Box<dyn AnyRow>) -> UpsyncResult<()>;

    /// Stage a replacement for an existing row
    ///
    /// # Errors
    ///
    /// Fails if the row is not visible.
    fn update(&mut self, entity: &EntityName, row: Box<dyn AnyRow>) -> UpsyncResult<()>;

    /// Stage removal of an existing row
    ///
    /// # Errors
    ///
    /// Fails if the row is not visible.
    fn remove(&mut self, entity: &EntityName, row_id: RowId) -> UpsyncResult<()>;
}

/// Change-ledger access inside a unit of work
pub trait LedgerStore {
    /// Entry for `key`, if one is visible
    ///
    /// # Errors
    ///
    /// Returns an error if the storage operation fails.
    fn ledger_get(&mut self, key: &LedgerKey) -> UpsyncResult<Option<LedgerEntry>>;

    /// Stage a new entry
    ///
    /// # Errors
    ///
    /// Returns `UniqueViolation` if an entry with this key is visible.
    fn ledger_insert(&mut self, key: LedgerKey, last_changed_on: Timestamp) -> UpsyncResult<()>;

    /// Stage a new `last_changed_on` for an existing entry
    ///
    /// # Errors
    ///
    /// Fails if no entry with this key is visible.
    fn ledger_update(&mut self, key: &LedgerKey, last_changed_on: Timestamp) -> UpsyncResult<()>;
}

/// Position in a unit of work's staged changes
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Savepoint(pub usize);

/// Result of a successful commit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CommitInfo {
    /// Version assigned to every change in the commit
    pub commit_version: u64,
    /// Rows inserted or replaced
    pub rows_written: usize,
    /// Rows removed
    pub rows_deleted: usize,
    /// Ledger entries inserted or updated
    pub ledger_written: usize,
}

impl CommitInfo {
    /// Total number of applied changes
    pub fn total_changes(&self) -> usize {
        self.rows_written + self.rows_deleted + self.ledger_written
    }
}

/// Transactional commit boundary
///
/// The engine issues exactly one `commit` per processed batch. If `commit`
/// fails, none of the staged changes may become observable.
pub trait UnitOfWork: EntityStore + LedgerStore + Send {
    /// Mark the current position so later changes can be discarded
    fn savepoint(&mut self) -> Savepoint;

    /// Discard every change staged after `savepoint`
    ///
    /// # Errors
    ///
    /// Fails if the unit of work is no longer active or the savepoint is unknown.
    fn rollback_to(&mut self, savepoint: Savepoint) -> UpsyncResult<()>;

    /// Atomically apply every staged change
    ///
    /// # Errors
    ///
    /// `Conflict` if validation found concurrent changes to data this unit of
    /// work read; `Commit` for any other failure.
    fn commit(&mut self) -> UpsyncResult<CommitInfo>;

    /// Discard everything; the unit of work cannot be used afterwards
    fn abort(&mut self, reason: &str);
}

/// Isolation a storage engine gives concurrent units of work
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Isolation {
    /// Every row and ledger entry read is validated at commit; the first
    /// committer wins and later ones fail with `Conflict`
    #[default]
    Serializable,
    /// No read validation; the last commit overwrites. Concurrent batches
    /// touching the same column can lose updates.
    ReadCommitted,
}

impl fmt::Display for Isolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Isolation::Serializable => f.write_str("serializable"),
            Isolation::ReadCommitted => f.write_str("read_committed"),
        }
    }
}

/// Source of units of work
///
/// Thread safety: concurrent batches each open their own unit of work from
/// a shared `Storage`.
pub trait Storage: Send + Sync {
    /// Open a unit of work
    ///
    /// # Errors
    ///
    /// `Unavailable` if the storage cannot be reached.
    fn begin(&self) -> UpsyncResult<Box<dyn UnitOfWork + '_>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Note {
        id: RowId,
        text: String,
    }

    impl Entity for Note {
        const NAME: &'static str = "Note";

        fn new_row(row_id: RowId) -> Self {
            Note {
                id: row_id,
                text: String::new(),
            }
        }

        fn row_id(&self) -> RowId {
            self.id
        }
    }

    #[derive(Debug, Clone)]
    struct Tag {
        id: RowId,
    }

    impl Entity for Tag {
        const NAME: &'static str = "Tag";

        fn new_row(row_id: RowId) -> Self {
            Tag { id: row_id }
        }

        fn row_id(&self) -> RowId {
            self.id
        }
    }

    #[test]
    fn test_erased_row_roundtrip() {
        let id = RowId::new();
        let mut note = Note::new_row(id);
        note.text = "hello".into();

        let erased: Box<dyn AnyRow> = Box::new(note.clone());
        assert_eq!(erased.erased_row_id(), id);
        assert_eq!(erased.erased_entity_name(), "Note");
        assert_eq!(downcast_ref::<Note>(erased.as_ref()), Some(&note));
        assert_eq!(downcast_row::<Note>(erased), Some(note));
    }

    #[test]
    fn test_downcast_to_wrong_type_fails() {
        let erased: Box<dyn AnyRow> = Box::new(Tag::new_row(RowId::new()));
        assert!(downcast_ref::<Note>(erased.as_ref()).is_none());
        assert!(downcast_row::<Note>(erased).is_none());
    }

    #[test]
    fn test_boxed_rows_clone_deeply() {
        let original: Box<dyn AnyRow> = Box::new(Note::new_row(RowId::new()));
        let copy = original.clone();
        assert_eq!(
            downcast_ref::<Note>(original.as_ref()),
            downcast_ref::<Note>(copy.as_ref())
        );
    }

    #[test]
    fn test_commit_info_totals() {
        let info = CommitInfo {
            commit_version: 3,
            rows_written: 2,
            rows_deleted: 1,
            ledger_written: 4,
        };
        assert_eq!(info.total_changes(), 7);
    }
}
