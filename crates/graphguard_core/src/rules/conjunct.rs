//! Conjunct: the smallest evaluable unit of a rule.
//!
//! # Invariants
//! - The cache key of a conjunct is its id.
//! - `evaluate` always runs the query and stages the result.
//! - Skipped uniqueness/injectivity conjuncts never touch the cache.

use super::{EvaluationError, EvaluationResult};
use crate::cache::ConjunctViolation;
use crate::config::EngineSettings;
use crate::runtime::Runtime;
use log::{debug, info, warn};
use std::time::Instant;

const UNIQUENESS_RULE_PREFIX: &str = "UNI";
const INJECTIVITY_RULE_PREFIX: &str = "INJ";

/// Query yielding violating pairs, shared by one or more rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conjunct {
    id: String,
    query: String,
    invariant_rule_ids: Vec<String>,
    signal_rule_ids: Vec<String>,
}

impl Conjunct {
    pub fn new(
        id: impl Into<String>,
        query: impl Into<String>,
        invariant_rule_ids: Vec<String>,
        signal_rule_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            query: query.into(),
            invariant_rule_ids,
            signal_rule_ids,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn invariant_rule_ids(&self) -> &[String] {
        &self.invariant_rule_ids
    }

    pub fn signal_rule_ids(&self) -> &[String] {
        &self.signal_rule_ids
    }

    /// Invariant rule ids followed by signal rule ids.
    pub fn rule_ids(&self) -> impl Iterator<Item = &str> {
        self.invariant_rule_ids
            .iter()
            .chain(self.signal_rule_ids.iter())
            .map(String::as_str)
    }

    /// Whether this conjunct feeds a uniqueness or injectivity invariant.
    pub fn is_uni_or_inj(&self) -> bool {
        self.invariant_rule_ids.iter().any(|rule_id| {
            rule_id.starts_with(UNIQUENESS_RULE_PREFIX)
                || rule_id.starts_with(INJECTIVITY_RULE_PREFIX)
        })
    }

    fn is_skipped(&self, settings: &EngineSettings) -> bool {
        settings.skip_uni_inj_conjuncts && self.is_uni_or_inj()
    }

    /// Returns cached violations, evaluating when `force` is set or the cache
    /// has no entry for this conjunct.
    pub fn get_violations(
        &self,
        runtime: &Runtime,
        force: bool,
    ) -> EvaluationResult<Vec<ConjunctViolation>> {
        if self.is_skipped(runtime.settings()) {
            warn!(
                "event=conjunct_skip module=rules status=skipped conjunct={}",
                self.id
            );
            return Ok(Vec::new());
        }

        if !force {
            if let Some(cached) = runtime.cache().get(&self.id)? {
                debug!(
                    "event=conjunct_cache module=rules status=hit conjunct={} violations={}",
                    self.id,
                    cached.len()
                );
                return Ok(cached);
            }
        }

        self.evaluate(runtime)
    }

    /// Runs the query, tags every pair with this conjunct id and stages the
    /// result in the cache overlay.
    pub fn evaluate(&self, runtime: &Runtime) -> EvaluationResult<Vec<ConjunctViolation>> {
        if self.is_skipped(runtime.settings()) {
            warn!(
                "event=conjunct_skip module=rules status=skipped conjunct={}",
                self.id
            );
            return Ok(Vec::new());
        }

        let started_at = Instant::now();
        let previous = runtime.cache().get(&self.id)?;
        let pairs = runtime
            .query_storage()
            .execute_query(&self.query)
            .map_err(|source| EvaluationError::Query {
                conjunct_id: self.id.clone(),
                source,
            })?;

        let violations: Vec<ConjunctViolation> = pairs
            .into_iter()
            .map(|pair| ConjunctViolation {
                conjunct_id: self.id.clone(),
                src: pair.src,
                tgt: pair.tgt,
            })
            .collect();
        runtime.cache().stage(&self.id, violations.clone());

        let before = match &previous {
            None => "unknown",
            Some(cached) if cached.is_empty() => "holds",
            Some(_) => "broken",
        };
        let after = if violations.is_empty() {
            "holds"
        } else {
            "broken"
        };
        if before == after {
            debug!(
                "event=conjunct_eval module=rules status={} conjunct={} violations={} duration_ms={}",
                after,
                self.id,
                violations.len(),
                started_at.elapsed().as_millis()
            );
        } else {
            info!(
                "event=conjunct_eval module=rules status={} conjunct={} transition={}->{} violations={} duration_ms={}",
                after,
                self.id,
                before,
                after,
                violations.len(),
                started_at.elapsed().as_millis()
            );
        }

        Ok(violations)
    }
}

#[cfg(test)]
mod tests {
    use super::Conjunct;

    #[test]
    fn uni_and_inj_invariants_are_detected() {
        let uni = Conjunct::new("c1", "q", vec!["UNI customer".to_string()], vec![]);
        let inj = Conjunct::new("c2", "q", vec!["INJ ssn".to_string()], vec![]);
        let plain = Conjunct::new("c3", "q", vec!["orders need customer".to_string()], vec![]);
        let signal_only = Conjunct::new("c4", "q", vec![], vec!["UNI signal".to_string()]);

        assert!(uni.is_uni_or_inj());
        assert!(inj.is_uni_or_inj());
        assert!(!plain.is_uni_or_inj());
        assert!(!signal_only.is_uni_or_inj());
    }

    #[test]
    fn rule_ids_lists_invariants_before_signals() {
        let conjunct = Conjunct::new(
            "c1",
            "q",
            vec!["inv".to_string()],
            vec!["sig".to_string()],
        );
        assert_eq!(conjunct.rule_ids().collect::<Vec<_>>(), vec!["inv", "sig"]);
    }
}
