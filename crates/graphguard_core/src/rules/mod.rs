//! Rule evaluation pipeline: conjuncts, rules, violations and the
//! stateless rule engine.
//!
//! # Responsibility
//! - Evaluate conjunct queries against the query backend through the cache.
//! - Turn violating pairs into per-rule violations with rendered messages.
//!
//! # Invariants
//! - Conjuncts and rules are immutable after model load; only cache
//!   entries change.
//! - Evaluation failures are explicit values here; recovery policy lives in
//!   [`Rule::check_rule`] and in the transaction close path.

use crate::cache::CacheError;
use crate::storage::StorageError;
use std::error::Error;
use std::fmt::{Display, Formatter};

mod conjunct;
mod rule;
pub mod rule_engine;
mod violation;

pub use conjunct::Conjunct;
pub use rule::{Rule, RuleType, ViolationSegment};
pub use violation::{Violation, ViolationReport};

/// Result type for conjunct and rule evaluation.
pub type EvaluationResult<T> = Result<T, EvaluationError>;

/// Conjunct/rule evaluation failures.
#[derive(Debug)]
pub enum EvaluationError {
    /// The backend failed to run the conjunct query.
    Query {
        conjunct_id: String,
        source: StorageError,
    },
    Cache(CacheError),
    /// A rule references a conjunct the model does not know.
    UnknownConjunct(String),
}

impl Display for EvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Query {
                conjunct_id,
                source,
            } => write!(f, "evaluation of conjunct `{conjunct_id}` failed: {source}"),
            Self::Cache(err) => write!(f, "{err}"),
            Self::UnknownConjunct(id) => write!(f, "unknown conjunct: {id}"),
        }
    }
}

impl Error for EvaluationError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Query { source, .. } => Some(source),
            Self::Cache(err) => Some(err),
            Self::UnknownConjunct(_) => None,
        }
    }
}

impl From<CacheError> for EvaluationError {
    fn from(value: CacheError) -> Self {
        Self::Cache(value)
    }
}
