//! Serialized model definitions as produced by the model compiler.
//!
//! These are plain data; [`crate::Model::from_definition`] validates them.

use serde::{Deserialize, Serialize};

/// Complete model file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelDefinition {
    pub concepts: Vec<ConceptDefinition>,
    pub relations: Vec<RelationDefinition>,
    pub conjuncts: Vec<ConjunctDefinition>,
    pub rules: Vec<RuleDefinition>,
    pub roles: Vec<RoleDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptDefinition {
    pub id: String,
    #[serde(default)]
    pub affected_conjuncts: Vec<String>,
    #[serde(default)]
    pub storages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationDefinition {
    pub name: String,
    pub src_concept: String,
    pub tgt_concept: String,
    #[serde(default)]
    pub affected_conjuncts: Vec<String>,
    #[serde(default)]
    pub storages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConjunctDefinition {
    pub id: String,
    pub query: String,
    #[serde(default)]
    pub invariant_rules: Vec<String>,
    #[serde(default)]
    pub signal_rules: Vec<String>,
}

/// Rule kind as written in model files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleKindDefinition {
    Invariant,
    Signal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleDefinition {
    pub id: String,
    pub kind: RuleKindDefinition,
    pub src_concept: String,
    pub tgt_concept: String,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub violation_segments: Vec<SegmentDefinition>,
    pub conjuncts: Vec<String>,
}

/// One violation-message segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SegmentDefinition {
    Text(String),
    Src,
    Tgt,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleDefinition {
    pub id: String,
    #[serde(default)]
    pub maintains: Vec<String>,
}
