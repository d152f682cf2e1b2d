//! Storage backend contract for concept/relation populations.
//!
//! # Responsibility
//! - Define the start/commit/rollback lifecycle a transaction drives.
//! - Define conjunct query execution returning violating `(src, tgt)` rows.
//! - Define the atom/link primitives fix procedures write through.
//!
//! # Invariants
//! - Backends commit independently; there is no cross-backend atomicity.
//! - `execute_query` rows are returned in backend order, unmodified.

use crate::db::DbError;
use crate::model::{Concept, Relation};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};

mod sqlite;

pub use sqlite::SqliteStorage;

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// One `(src, tgt)` row, e.g. a link or a violating pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pair {
    pub src: String,
    pub tgt: String,
}

impl Pair {
    pub fn new(src: impl Into<String>, tgt: impl Into<String>) -> Self {
        Self {
            src: src.into(),
            tgt: tgt.into(),
        }
    }
}

/// Backend errors.
#[derive(Debug)]
pub enum StorageError {
    Db(DbError),
    /// `start_transaction` called while a transaction is already running.
    TransactionAlreadyStarted(String),
    /// `commit`/`rollback` called without a running transaction.
    NoActiveTransaction(String),
    /// A conjunct query did not produce `src`/`tgt` text columns.
    InvalidQueryResult(String),
}

impl Display for StorageError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::TransactionAlreadyStarted(id) => {
                write!(f, "storage `{id}` already has an active transaction")
            }
            Self::NoActiveTransaction(id) => {
                write!(f, "storage `{id}` has no active transaction")
            }
            Self::InvalidQueryResult(message) => write!(f, "invalid query result: {message}"),
        }
    }
}

impl Error for StorageError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::TransactionAlreadyStarted(_) => None,
            Self::NoActiveTransaction(_) => None,
            Self::InvalidQueryResult(_) => None,
        }
    }
}

impl From<DbError> for StorageError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Storage backend driven by a [`crate::Transaction`].
pub trait StorageBackend {
    /// Stable backend id referenced by concept/relation definitions.
    fn id(&self) -> &str;

    fn start_transaction(&self) -> StorageResult<()>;
    fn commit_transaction(&self) -> StorageResult<()>;
    fn rollback_transaction(&self) -> StorageResult<()>;

    /// Executes one conjunct query and returns its violating pairs.
    fn execute_query(&self, query: &str) -> StorageResult<Vec<Pair>>;

    fn atom_exists(&self, concept: &Concept, atom_id: &str) -> StorageResult<bool>;
    fn add_atom(&self, concept: &Concept, atom_id: &str) -> StorageResult<()>;
    /// Removes the atom and every link of `relations` that refers to it.
    fn delete_atom(
        &self,
        concept: &Concept,
        atom_id: &str,
        relations: &[&Relation],
    ) -> StorageResult<()>;

    fn links(&self, relation: &Relation) -> StorageResult<Vec<Pair>>;
    fn add_link(&self, relation: &Relation, src: &str, tgt: &str) -> StorageResult<()>;
    fn delete_link(&self, relation: &Relation, src: &str, tgt: &str) -> StorageResult<()>;
}
