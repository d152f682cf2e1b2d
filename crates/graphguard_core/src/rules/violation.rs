//! Violation value object and its rendered forms.
//!
//! # Invariants
//! - A violation is derived on demand and never persisted.
//! - The machine form keeps segment order; empty atoms render as `_NULL`.

use super::{Rule, RuleType, ViolationSegment};
use serde::Serialize;

/// Placeholder for an absent atom in fix-action messages.
pub const NULL_ATOM: &str = "_NULL";

/// One broken `(src, tgt)` pair under one rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation<'r> {
    rule: &'r Rule,
    src: String,
    tgt: String,
}

impl<'r> Violation<'r> {
    pub fn new(rule: &'r Rule, src: impl Into<String>, tgt: impl Into<String>) -> Self {
        Self {
            rule,
            src: src.into(),
            tgt: tgt.into(),
        }
    }

    pub fn rule(&self) -> &'r Rule {
        self.rule
    }

    pub fn src(&self) -> &str {
        &self.src
    }

    pub fn tgt(&self) -> &str {
        &self.tgt
    }

    /// Human-readable message built from the rule's violation segments.
    pub fn message(&self) -> String {
        let rendered: String = self
            .rule
            .violation_segments()
            .iter()
            .map(|segment| match segment {
                ViolationSegment::Text(text) => text.as_str(),
                ViolationSegment::Src => self.src.as_str(),
                ViolationSegment::Tgt => self.tgt.as_str(),
            })
            .collect();

        if rendered.trim().is_empty() {
            format!("Violation ({}, {})", self.src, self.tgt)
        } else {
            rendered
        }
    }

    /// Machine form consumed by the exec engine as `{EX}`-separated actions.
    pub fn exec_engine_message(&self) -> String {
        self.rule
            .violation_segments()
            .iter()
            .map(|segment| match segment {
                ViolationSegment::Text(text) => text.as_str(),
                ViolationSegment::Src => atom_or_null(&self.src),
                ViolationSegment::Tgt => atom_or_null(&self.tgt),
            })
            .collect()
    }

    pub fn to_report(&self) -> ViolationReport {
        ViolationReport {
            rule_id: self.rule.id().to_string(),
            kind: self.rule.kind(),
            heading: self.rule.violation_heading(),
            src: self.src.clone(),
            tgt: self.tgt.clone(),
            message: self.message(),
        }
    }
}

fn atom_or_null(atom: &str) -> &str {
    if atom.is_empty() {
        NULL_ATOM
    } else {
        atom
    }
}

/// Owned, serializable view of a violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViolationReport {
    pub rule_id: String,
    pub kind: RuleType,
    pub heading: String,
    pub src: String,
    pub tgt: String,
    pub message: String,
}
