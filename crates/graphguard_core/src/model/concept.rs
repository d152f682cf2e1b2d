//! Concept and relation definitions.
//!
//! # Invariants
//! - A relation id is its signature `name[Src*Tgt]` and is unique per model.
//! - Affected-conjunct lists are fixed at model load.

/// A named set of atoms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Concept {
    id: String,
    affected_conjunct_ids: Vec<String>,
    storage_ids: Vec<String>,
}

impl Concept {
    pub fn new(
        id: impl Into<String>,
        affected_conjunct_ids: Vec<String>,
        storage_ids: Vec<String>,
    ) -> Self {
        Self {
            id: id.into(),
            affected_conjunct_ids,
            storage_ids,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Conjuncts to re-evaluate when the population of this concept changes.
    pub fn affected_conjunct_ids(&self) -> &[String] {
        &self.affected_conjunct_ids
    }

    /// Storage backends holding this population. Empty means the default one.
    pub fn storage_ids(&self) -> &[String] {
        &self.storage_ids
    }
}

/// Named binary association between two concepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relation {
    id: String,
    name: String,
    src_concept: String,
    tgt_concept: String,
    affected_conjunct_ids: Vec<String>,
    storage_ids: Vec<String>,
}

impl Relation {
    pub fn new(
        name: impl Into<String>,
        src_concept: impl Into<String>,
        tgt_concept: impl Into<String>,
        affected_conjunct_ids: Vec<String>,
        storage_ids: Vec<String>,
    ) -> Self {
        let name = name.into();
        let src_concept = src_concept.into();
        let tgt_concept = tgt_concept.into();
        Self {
            id: relation_signature(&name, &src_concept, &tgt_concept),
            name,
            src_concept,
            tgt_concept,
            affected_conjunct_ids,
            storage_ids,
        }
    }

    /// Signature id, e.g. `customer[Order*Customer]`.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn src_concept(&self) -> &str {
        &self.src_concept
    }

    pub fn tgt_concept(&self) -> &str {
        &self.tgt_concept
    }

    pub fn affected_conjunct_ids(&self) -> &[String] {
        &self.affected_conjunct_ids
    }

    pub fn storage_ids(&self) -> &[String] {
        &self.storage_ids
    }

    /// Whether `concept_id` is the source or target of this relation.
    pub fn touches_concept(&self, concept_id: &str) -> bool {
        self.src_concept == concept_id || self.tgt_concept == concept_id
    }
}

/// Builds the `name[Src*Tgt]` signature used as relation id.
pub fn relation_signature(name: &str, src_concept: &str, tgt_concept: &str) -> String {
    format!("{name}[{src_concept}*{tgt_concept}]")
}
