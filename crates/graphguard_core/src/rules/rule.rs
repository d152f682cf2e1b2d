//! Invariant and signal rules.

use super::{EvaluationError, EvaluationResult, Violation};
use crate::runtime::Runtime;
use log::error;
use serde::Serialize;
use std::fmt::{Display, Formatter};

/// Rule kind.
///
/// Invariants block commit; signals are informational.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    Invariant,
    Signal,
}

impl Display for RuleType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Invariant => write!(f, "invariant"),
            Self::Signal => write!(f, "signal"),
        }
    }
}

/// One piece of a rendered violation message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViolationSegment {
    Text(String),
    /// The source atom of the violating pair.
    Src,
    /// The target atom of the violating pair.
    Tgt,
}

/// Constraint over a source and target concept, built from conjuncts.
///
/// A rule holds iff every one of its conjuncts yields no violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    id: String,
    kind: RuleType,
    src_concept: String,
    tgt_concept: String,
    message: Option<String>,
    violation_segments: Vec<ViolationSegment>,
    conjunct_ids: Vec<String>,
}

impl Rule {
    pub fn new(
        id: impl Into<String>,
        kind: RuleType,
        src_concept: impl Into<String>,
        tgt_concept: impl Into<String>,
        message: Option<String>,
        violation_segments: Vec<ViolationSegment>,
        conjunct_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            src_concept: src_concept.into(),
            tgt_concept: tgt_concept.into(),
            message,
            violation_segments,
            conjunct_ids,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> RuleType {
        self.kind
    }

    pub fn is_invariant(&self) -> bool {
        self.kind == RuleType::Invariant
    }

    pub fn is_signal(&self) -> bool {
        self.kind == RuleType::Signal
    }

    pub fn src_concept(&self) -> &str {
        &self.src_concept
    }

    pub fn tgt_concept(&self) -> &str {
        &self.tgt_concept
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn violation_segments(&self) -> &[ViolationSegment] {
        &self.violation_segments
    }

    pub fn conjunct_ids(&self) -> &[String] {
        &self.conjunct_ids
    }

    /// Message template, or a generic heading naming the rule.
    pub fn violation_heading(&self) -> String {
        match &self.message {
            Some(message) if !message.trim().is_empty() => message.clone(),
            _ => format!("Violation of rule '{}'", self.id),
        }
    }

    /// Collects one violation per (conjunct, pair), in conjunct order.
    ///
    /// # Errors
    /// - Returns the first conjunct evaluation or cache failure.
    pub fn try_check_rule(
        &self,
        runtime: &Runtime,
        force: bool,
    ) -> EvaluationResult<Vec<Violation<'_>>> {
        let mut violations = Vec::new();
        for conjunct_id in &self.conjunct_ids {
            let conjunct = runtime
                .model()
                .conjunct(conjunct_id)
                .ok_or_else(|| EvaluationError::UnknownConjunct(conjunct_id.clone()))?;
            for record in conjunct.get_violations(runtime, force)? {
                violations.push(Violation::new(self, record.src, record.tgt));
            }
        }
        Ok(violations)
    }

    /// Like [`Rule::try_check_rule`], but an evaluation failure is logged,
    /// reported as a generic user error and the rule is treated as holding.
    pub fn check_rule(&self, runtime: &Runtime, force: bool) -> Vec<Violation<'_>> {
        match self.try_check_rule(runtime, force) {
            Ok(violations) => violations,
            Err(err) => {
                error!(
                    "event=rule_check module=rules status=error rule={} error={}",
                    self.id, err
                );
                runtime
                    .user_log()
                    .error(format!("Error while evaluating rule '{}'", self.id));
                Vec::new()
            }
        }
    }
}

impl Display for Rule {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}
