//! Rule evaluation, caching and transactional consistency engine for
//! graph-structured data.
//!
//! Writes go through a [`Transaction`] opened on a [`Runtime`]; exec engines
//! repair violations of the rules their role maintains, and the transaction
//! commits only when every affected invariant holds.

pub mod cache;
pub mod config;
pub mod db;
pub mod exec;
pub mod logging;
pub mod model;
pub mod rules;
pub mod runtime;
pub mod storage;
pub mod transaction;
pub mod user_log;

pub use cache::{
    CacheError, CachePool, CacheResult, ConjunctViolation, MemoryCachePool, SqliteCachePool,
    StagedCache,
};
pub use config::{ConfigError, EngineSettings};
pub use exec::{ExecEngine, FixContext, FixError, FixResult, ProcedureRegistry, RegistryError};
pub use logging::{default_log_level, init_logging, logging_status, LoggingError};
pub use model::{Concept, Model, ModelDefinition, ModelError, Relation, Role};
pub use rules::{
    rule_engine, Conjunct, EvaluationError, Rule, RuleType, Violation, ViolationReport,
    ViolationSegment,
};
pub use runtime::{Runtime, RuntimeBuilder, RuntimeError};
pub use storage::{Pair, SqliteStorage, StorageBackend, StorageError, StorageResult};
pub use transaction::{Transaction, TransactionError, TransactionResult, TransactionState};
pub use user_log::{UserLog, UserLogEntry, UserLogLevel};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
