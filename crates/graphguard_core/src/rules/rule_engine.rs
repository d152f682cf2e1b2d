//! Stateless violation queries over sets of rules.
//!
//! # Responsibility
//! - Per-rule, cache-first evaluation (`get_violations`).
//! - Batched lookup that fetches every cached conjunct in one pool call
//!   (`get_violations_from_cache`).
//!
//! # Invariants
//! - Both paths yield the same violation set for any cache state.
//! - Each conjunct is read or evaluated at most once per call.

use super::{Conjunct, EvaluationError, EvaluationResult, Rule, Violation, ViolationReport};
use crate::runtime::Runtime;
use log::debug;
use std::collections::BTreeMap;

/// Evaluates each rule without forcing conjunct re-evaluation.
pub fn get_violations<'r>(runtime: &Runtime, rules: &[&'r Rule]) -> Vec<Violation<'r>> {
    rules
        .iter()
        .flat_map(|&rule| rule.check_rule(runtime, false))
        .collect()
}

/// Cache-first batched evaluation of `rules` through the runtime cache.
///
/// Cached conjuncts are fetched in a single bulk read; missing ones are
/// evaluated individually, which stages their result as a side effect.
pub fn get_violations_from_cache<'r>(
    runtime: &Runtime,
    rules: &[&'r Rule],
) -> EvaluationResult<Vec<Violation<'r>>> {
    let model = runtime.model();
    let cache = runtime.cache();

    let mut conjuncts: Vec<&Conjunct> = Vec::new();
    let mut rules_by_conjunct: BTreeMap<&str, Vec<&'r Rule>> = BTreeMap::new();
    for &rule in rules {
        for conjunct_id in rule.conjunct_ids() {
            let conjunct = model
                .conjunct(conjunct_id)
                .ok_or_else(|| EvaluationError::UnknownConjunct(conjunct_id.clone()))?;
            let users = rules_by_conjunct
                .entry(conjunct.id())
                .or_insert_with(|| {
                    conjuncts.push(conjunct);
                    Vec::new()
                });
            if !users.iter().any(|known| known.id() == rule.id()) {
                users.push(rule);
            }
        }
    }

    let mut hits = Vec::new();
    let mut misses = Vec::new();
    for conjunct in &conjuncts {
        if runtime.settings().skip_uni_inj_conjuncts && conjunct.is_uni_or_inj() {
            continue;
        }
        if cache.contains(conjunct.id())? {
            hits.push(*conjunct);
        } else {
            misses.push(*conjunct);
        }
    }

    let hit_keys: Vec<&str> = hits.iter().map(|conjunct| conjunct.id()).collect();
    let mut records = cache.get_many(&hit_keys)?;
    for conjunct in hits {
        if !records.contains_key(conjunct.id()) {
            misses.push(conjunct);
        }
    }
    debug!(
        "event=rule_engine_lookup module=rules status=ok rules={} conjuncts={} hits={} misses={}",
        rules.len(),
        conjuncts.len(),
        records.len(),
        misses.len()
    );
    for conjunct in misses {
        records.insert(conjunct.id().to_string(), conjunct.evaluate(runtime)?);
    }

    let mut violations = Vec::new();
    for conjunct in &conjuncts {
        let Some(conjunct_records) = records.get(conjunct.id()) else {
            continue;
        };
        let users = &rules_by_conjunct[conjunct.id()];
        for record in conjunct_records {
            for &rule in users {
                violations.push(Violation::new(rule, record.src.as_str(), record.tgt.as_str()));
            }
        }
    }
    Ok(violations)
}

/// Serializable reports for a batch of violations.
pub fn report(violations: &[Violation<'_>]) -> Vec<ViolationReport> {
    violations.iter().map(Violation::to_report).collect()
}
