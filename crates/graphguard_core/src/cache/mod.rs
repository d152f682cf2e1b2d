//! Conjunct violation cache.
//!
//! # Responsibility
//! - Define the cache pool contract keyed by conjunct id.
//! - Provide a staged overlay so a transaction sees its own evaluations
//!   before they become durable.
//!
//! # Invariants
//! - Cache keys are conjunct ids and therefore process-global.
//! - A staged entry shadows the pool entry for the same key until it is
//!   committed or discarded.

use crate::db::DbError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod memory;
mod sqlite;
mod staged;

pub use memory::MemoryCachePool;
pub use sqlite::SqliteCachePool;
pub use staged::StagedCache;

/// Result type for cache operations.
pub type CacheResult<T> = Result<T, CacheError>;

/// Violating pair tagged with the conjunct that produced it.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ConjunctViolation {
    pub conjunct_id: String,
    pub src: String,
    pub tgt: String,
}

/// Cache pool failures.
#[derive(Debug)]
pub enum CacheError {
    Db(DbError),
    /// Stored payload cannot be encoded or decoded.
    Serialization {
        key: String,
        source: serde_json::Error,
    },
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Serialization { key, source } => {
                write!(f, "invalid cache payload for `{key}`: {source}")
            }
        }
    }
}

impl Error for CacheError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            Self::Serialization { source, .. } => Some(source),
        }
    }
}

impl From<DbError> for CacheError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for CacheError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Durable key-value store for conjunct violations.
pub trait CachePool {
    fn get(&self, key: &str) -> CacheResult<Option<Vec<ConjunctViolation>>>;
    /// Bulk fetch; keys without an entry are absent from the result.
    fn get_many(&self, keys: &[&str]) -> CacheResult<BTreeMap<String, Vec<ConjunctViolation>>>;
    fn contains(&self, key: &str) -> CacheResult<bool>;
    fn save(&self, key: &str, violations: &[ConjunctViolation]) -> CacheResult<()>;
    fn clear(&self, key: &str) -> CacheResult<()>;
}
