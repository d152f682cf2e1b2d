//! Loaded model: concepts, relations, conjuncts, rules and roles.
//!
//! # Responsibility
//! - Validate model definitions and resolve cross references once at load.
//! - Offer id lookups used by evaluation, fixing and transactions.
//!
//! # Invariants
//! - Every id referenced anywhere in the model resolves.
//! - A conjunct lists a rule as invariant/signal only if the rule has that kind.
//! - The model is immutable after load.

use crate::rules::{Conjunct, Rule, RuleType, ViolationSegment};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

mod concept;
pub mod definition;
mod role;

pub use concept::{relation_signature, Concept, Relation};
pub use definition::ModelDefinition;
pub use role::Role;

use definition::{RuleKindDefinition, SegmentDefinition};

/// Result type for model loading.
pub type ModelResult<T> = Result<T, ModelError>;

/// Model loading and validation errors.
#[derive(Debug)]
pub enum ModelError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    EmptyId(&'static str),
    DuplicateId {
        kind: &'static str,
        id: String,
    },
    UnknownReference {
        kind: &'static str,
        id: String,
        referenced_by: String,
    },
    /// The same id is listed twice where each entry must be distinct.
    DuplicateReference {
        kind: &'static str,
        id: String,
        referenced_by: String,
    },
    /// A conjunct lists a rule under the wrong kind.
    RuleKindMismatch {
        conjunct_id: String,
        rule_id: String,
    },
}

impl Display for ModelError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read model `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid model definition: {err}"),
            Self::EmptyId(kind) => write!(f, "{kind} id cannot be empty"),
            Self::DuplicateId { kind, id } => write!(f, "duplicate {kind} id: {id}"),
            Self::UnknownReference {
                kind,
                id,
                referenced_by,
            } => write!(f, "{referenced_by} references unknown {kind} `{id}`"),
            Self::DuplicateReference {
                kind,
                id,
                referenced_by,
            } => write!(f, "{referenced_by} lists {kind} `{id}` more than once"),
            Self::RuleKindMismatch {
                conjunct_id,
                rule_id,
            } => write!(
                f,
                "conjunct `{conjunct_id}` lists rule `{rule_id}` under the wrong rule kind"
            ),
        }
    }
}

impl Error for ModelError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            _ => None,
        }
    }
}

/// Immutable, validated model.
#[derive(Debug, Clone, Default)]
pub struct Model {
    concepts: BTreeMap<String, Concept>,
    relations: BTreeMap<String, Relation>,
    conjuncts: Vec<Conjunct>,
    conjunct_index: BTreeMap<String, usize>,
    rules: Vec<Rule>,
    rule_index: BTreeMap<String, usize>,
    roles: BTreeMap<String, Role>,
}

impl Model {
    /// Parses and validates a JSON model definition.
    pub fn from_json(text: &str) -> ModelResult<Self> {
        let definition: ModelDefinition = serde_json::from_str(text).map_err(ModelError::Parse)?;
        Self::from_definition(definition)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ModelResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ModelError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    /// Builds the model and checks every cross reference.
    pub fn from_definition(definition: ModelDefinition) -> ModelResult<Self> {
        let mut model = Self::default();

        for concept in definition.concepts {
            require_id("concept", &concept.id)?;
            if model.concepts.contains_key(&concept.id) {
                return Err(duplicate("concept", concept.id));
            }
            model.concepts.insert(
                concept.id.clone(),
                Concept::new(concept.id, concept.affected_conjuncts, concept.storages),
            );
        }

        for relation in definition.relations {
            require_id("relation", &relation.name)?;
            let relation = Relation::new(
                relation.name,
                relation.src_concept,
                relation.tgt_concept,
                relation.affected_conjuncts,
                relation.storages,
            );
            if model.relations.contains_key(relation.id()) {
                return Err(duplicate("relation", relation.id().to_string()));
            }
            model.relations.insert(relation.id().to_string(), relation);
        }

        for conjunct in definition.conjuncts {
            require_id("conjunct", &conjunct.id)?;
            if model.conjunct_index.contains_key(&conjunct.id) {
                return Err(duplicate("conjunct", conjunct.id));
            }
            model
                .conjunct_index
                .insert(conjunct.id.clone(), model.conjuncts.len());
            model.conjuncts.push(Conjunct::new(
                conjunct.id,
                conjunct.query,
                conjunct.invariant_rules,
                conjunct.signal_rules,
            ));
        }

        for rule in definition.rules {
            require_id("rule", &rule.id)?;
            if model.rule_index.contains_key(&rule.id) {
                return Err(duplicate("rule", rule.id));
            }
            let kind = match rule.kind {
                RuleKindDefinition::Invariant => RuleType::Invariant,
                RuleKindDefinition::Signal => RuleType::Signal,
            };
            let segments = rule
                .violation_segments
                .into_iter()
                .map(|segment| match segment {
                    SegmentDefinition::Text(text) => ViolationSegment::Text(text),
                    SegmentDefinition::Src => ViolationSegment::Src,
                    SegmentDefinition::Tgt => ViolationSegment::Tgt,
                })
                .collect();
            model.rule_index.insert(rule.id.clone(), model.rules.len());
            model.rules.push(Rule::new(
                rule.id,
                kind,
                rule.src_concept,
                rule.tgt_concept,
                rule.message,
                segments,
                rule.conjuncts,
            ));
        }

        for role in definition.roles {
            require_id("role", &role.id)?;
            if model.roles.contains_key(&role.id) {
                return Err(duplicate("role", role.id));
            }
            model
                .roles
                .insert(role.id.clone(), Role::new(role.id, role.maintains));
        }

        model.validate_references()?;
        Ok(model)
    }

    fn validate_references(&self) -> ModelResult<()> {
        for concept in self.concepts.values() {
            for conjunct_id in concept.affected_conjunct_ids() {
                self.require_conjunct(conjunct_id, format!("concept `{}`", concept.id()))?;
            }
        }

        for relation in self.relations.values() {
            let owner = format!("relation `{}`", relation.id());
            self.require_concept(relation.src_concept(), &owner)?;
            self.require_concept(relation.tgt_concept(), &owner)?;
            for conjunct_id in relation.affected_conjunct_ids() {
                self.require_conjunct(conjunct_id, owner.clone())?;
            }
        }

        for conjunct in &self.conjuncts {
            let owner = format!("conjunct `{}`", conjunct.id());
            for (rule_ids, expected) in [
                (conjunct.invariant_rule_ids(), RuleType::Invariant),
                (conjunct.signal_rule_ids(), RuleType::Signal),
            ] {
                for rule_id in rule_ids {
                    let rule = self.rule(rule_id).ok_or_else(|| ModelError::UnknownReference {
                        kind: "rule",
                        id: rule_id.clone(),
                        referenced_by: owner.clone(),
                    })?;
                    if rule.kind() != expected {
                        return Err(ModelError::RuleKindMismatch {
                            conjunct_id: conjunct.id().to_string(),
                            rule_id: rule_id.clone(),
                        });
                    }
                }
            }
        }

        for rule in &self.rules {
            let owner = format!("rule `{}`", rule.id());
            self.require_concept(rule.src_concept(), &owner)?;
            self.require_concept(rule.tgt_concept(), &owner)?;
            let mut listed = BTreeSet::new();
            for conjunct_id in rule.conjunct_ids() {
                self.require_conjunct(conjunct_id, owner.clone())?;
                if !listed.insert(conjunct_id.as_str()) {
                    return Err(ModelError::DuplicateReference {
                        kind: "conjunct",
                        id: conjunct_id.clone(),
                        referenced_by: owner,
                    });
                }
            }
        }

        for role in self.roles.values() {
            for rule_id in role.maintained_rule_ids() {
                if self.rule(rule_id).is_none() {
                    return Err(ModelError::UnknownReference {
                        kind: "rule",
                        id: rule_id.clone(),
                        referenced_by: format!("role `{}`", role.id()),
                    });
                }
            }
        }

        Ok(())
    }

    fn require_concept(&self, id: &str, owner: &str) -> ModelResult<()> {
        if self.concepts.contains_key(id) {
            return Ok(());
        }
        Err(ModelError::UnknownReference {
            kind: "concept",
            id: id.to_string(),
            referenced_by: owner.to_string(),
        })
    }

    fn require_conjunct(&self, id: &str, owner: String) -> ModelResult<()> {
        if self.conjunct_index.contains_key(id) {
            return Ok(());
        }
        Err(ModelError::UnknownReference {
            kind: "conjunct",
            id: id.to_string(),
            referenced_by: owner,
        })
    }

    pub fn concept(&self, id: &str) -> Option<&Concept> {
        self.concepts.get(id)
    }

    pub fn concepts(&self) -> impl Iterator<Item = &Concept> {
        self.concepts.values()
    }

    /// Looks a relation up by signature id, e.g. `customer[Order*Customer]`.
    pub fn relation(&self, id: &str) -> Option<&Relation> {
        self.relations.get(id)
    }

    pub fn relation_by_signature(
        &self,
        name: &str,
        src_concept: &str,
        tgt_concept: &str,
    ) -> Option<&Relation> {
        self.relations
            .get(&relation_signature(name, src_concept, tgt_concept))
    }

    pub fn relations(&self) -> impl Iterator<Item = &Relation> {
        self.relations.values()
    }

    /// Relations whose source or target is `concept_id`.
    pub fn relations_touching(&self, concept_id: &str) -> Vec<&Relation> {
        self.relations
            .values()
            .filter(|relation| relation.touches_concept(concept_id))
            .collect()
    }

    pub fn conjunct(&self, id: &str) -> Option<&Conjunct> {
        self.conjunct_index.get(id).map(|index| &self.conjuncts[*index])
    }

    pub fn conjuncts(&self) -> &[Conjunct] {
        &self.conjuncts
    }

    pub fn rule(&self, id: &str) -> Option<&Rule> {
        self.rule_index.get(id).map(|index| &self.rules[*index])
    }

    /// All rules in definition order.
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn role(&self, id: &str) -> Option<&Role> {
        self.roles.get(id)
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }
}

fn require_id(kind: &'static str, id: &str) -> ModelResult<()> {
    if id.trim().is_empty() {
        return Err(ModelError::EmptyId(kind));
    }
    Ok(())
}

fn duplicate(kind: &'static str, id: String) -> ModelError {
    ModelError::DuplicateId { kind, id }
}

#[cfg(test)]
mod tests {
    use super::{Model, ModelError};

    const MODEL: &str = r#"{
        "concepts": [
            { "id": "Order", "affected_conjuncts": ["conj_order_customer"] },
            { "id": "Customer" }
        ],
        "relations": [
            {
                "name": "customer",
                "src_concept": "Order",
                "tgt_concept": "Customer",
                "affected_conjuncts": ["conj_order_customer"]
            }
        ],
        "conjuncts": [
            {
                "id": "conj_order_customer",
                "query": "SELECT 'x' AS src, 'x' AS tgt WHERE 0",
                "invariant_rules": ["orderHasCustomer"]
            }
        ],
        "rules": [
            {
                "id": "orderHasCustomer",
                "kind": "invariant",
                "src_concept": "Order",
                "tgt_concept": "Order",
                "violation_segments": [
                    { "type": "text", "value": "Order " },
                    { "type": "src" },
                    { "type": "text", "value": " has no customer" }
                ],
                "conjuncts": ["conj_order_customer"]
            }
        ],
        "roles": [ { "id": "ExecEngine", "maintains": [] } ]
    }"#;

    #[test]
    fn loads_and_resolves_lookups() {
        let model = Model::from_json(MODEL).unwrap();

        let relation = model
            .relation_by_signature("customer", "Order", "Customer")
            .unwrap();
        assert_eq!(relation.id(), "customer[Order*Customer]");
        assert_eq!(model.relations_touching("Customer").len(), 1);
        assert!(model.rule("orderHasCustomer").unwrap().is_invariant());
        assert_eq!(model.rules().len(), 1);
        assert!(model.role("ExecEngine").is_some());
    }

    #[test]
    fn rejects_unknown_conjunct_reference() {
        let broken = MODEL.replace(
            "\"conjuncts\": [\"conj_order_customer\"]",
            "\"conjuncts\": [\"conj_missing\"]",
        );
        let err = Model::from_json(&broken).unwrap_err();
        assert!(matches!(
            err,
            ModelError::UnknownReference { kind: "conjunct", .. }
        ));
    }

    #[test]
    fn rejects_rule_listed_under_wrong_kind() {
        let broken = MODEL.replace("\"invariant_rules\"", "\"signal_rules\"");
        let err = Model::from_json(&broken).unwrap_err();
        assert!(matches!(err, ModelError::RuleKindMismatch { .. }));
    }

    #[test]
    fn rejects_duplicate_concepts() {
        let broken = MODEL.replace("{ \"id\": \"Customer\" }", "{ \"id\": \"Order\" }");
        let err = Model::from_json(&broken).unwrap_err();
        assert!(matches!(err, ModelError::DuplicateId { kind: "concept", .. }));
    }

    #[test]
    fn rejects_conjunct_listed_twice_by_one_rule() {
        let broken = MODEL.replace(
            "\"conjuncts\": [\"conj_order_customer\"]",
            "\"conjuncts\": [\"conj_order_customer\", \"conj_order_customer\"]",
        );
        let err = Model::from_json(&broken).unwrap_err();
        assert!(matches!(
            err,
            ModelError::DuplicateReference { kind: "conjunct", .. }
        ));
    }
}
