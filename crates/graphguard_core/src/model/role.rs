//! Roles and the rules they maintain.

/// A role; exec-engine roles automatically fix their maintained rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Role {
    id: String,
    maintained_rule_ids: Vec<String>,
}

impl Role {
    pub fn new(id: impl Into<String>, maintained_rule_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            maintained_rule_ids,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn maintained_rule_ids(&self) -> &[String] {
        &self.maintained_rule_ids
    }

    pub fn maintains(&self, rule_id: &str) -> bool {
        self.maintained_rule_ids.iter().any(|id| id == rule_id)
    }
}
