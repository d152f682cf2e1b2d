//! Per-role, per-transaction violation fixing state machine.
//!
//! # Invariants
//! - Active → Terminated is one-way for the lifetime of the engine.
//! - The created-atom slot is cleared before every violation.
//! - The processed-key memo is reset whenever the run counter advances.

use super::action::{parse_action, resolve_param, split_actions, TokenScope};
use super::{FixContext, FixError, FixResult};
use crate::model::Role;
use crate::rules::{Rule, Violation};
use crate::transaction::Transaction;
use chrono::Utc;
use log::{debug, info, warn};
use std::collections::BTreeSet;

/// Automatic fixer bound to one role and one transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecEngine {
    role_id: String,
    maintained_rule_ids: BTreeSet<String>,
    run_count: u64,
    created_atom: Option<String>,
    terminated: bool,
    processed_keys: BTreeSet<String>,
}

impl ExecEngine {
    pub fn new(role: &Role) -> Self {
        Self {
            role_id: role.id().to_string(),
            maintained_rule_ids: role.maintained_rule_ids().iter().cloned().collect(),
            run_count: 0,
            created_atom: None,
            terminated: false,
            processed_keys: BTreeSet::new(),
        }
    }

    pub fn role_id(&self) -> &str {
        &self.role_id
    }

    pub fn maintains(&self, rule_id: &str) -> bool {
        self.maintained_rule_ids.contains(rule_id)
    }

    pub fn maintained_rule_ids(&self) -> impl Iterator<Item = &str> {
        self.maintained_rule_ids.iter().map(String::as_str)
    }

    pub fn run_count(&self) -> u64 {
        self.run_count
    }

    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    pub fn created_atom(&self) -> Option<&str> {
        self.created_atom.as_deref()
    }

    pub(crate) fn set_created_atom(&mut self, atom_id: String) {
        self.created_atom = Some(atom_id);
    }

    pub(crate) fn mark_processed(&mut self, key: &str) -> bool {
        self.processed_keys.insert(key.to_string())
    }

    /// Stops automatic fixing for the rest of the owning transaction.
    pub fn terminate(&mut self) {
        if !self.terminated {
            info!(
                "event=exec_engine_terminate module=exec status=terminated role={} run={}",
                self.role_id, self.run_count
            );
        }
        self.terminated = true;
    }

    /// Asks `transaction` to run `role_id`'s engine after the current pass.
    pub fn trigger_service(&self, transaction: &Transaction<'_>, role_id: &str) {
        debug!(
            "event=exec_engine_trigger module=exec status=requested role={} target_role={}",
            self.role_id, role_id
        );
        transaction.request_service(role_id);
    }

    /// Force-evaluates the maintained rules among `affected_rules` and fixes
    /// every violation found.
    ///
    /// Returns the rules for which at least one violation was processed;
    /// whether the fix resolved them shows only in the next evaluation.
    pub fn check_fix_rules<'r>(
        &mut self,
        transaction: &Transaction<'_>,
        affected_rules: &[&'r Rule],
    ) -> Vec<&'r Rule> {
        if self.terminated {
            debug!(
                "event=exec_engine_run module=exec status=skipped reason=terminated role={}",
                self.role_id
            );
            return Vec::new();
        }

        self.run_count += 1;
        self.processed_keys.clear();

        let runtime = transaction.runtime();
        let mut fixed_rules = Vec::new();
        for &rule in affected_rules {
            if !self.maintains(rule.id()) {
                continue;
            }

            let violations = rule.check_rule(runtime, true);
            if violations.is_empty() {
                continue;
            }

            info!(
                "event=exec_engine_fix module=exec status=start role={} run={} rule={} violations={}",
                self.role_id,
                self.run_count,
                rule.id(),
                violations.len()
            );
            fixed_rules.push(rule);
            for violation in &violations {
                self.fix_violation(transaction, violation);
                if self.terminated {
                    return fixed_rules;
                }
            }
        }

        fixed_rules
    }

    /// Dispatches every action of the violation's fix message.
    ///
    /// Failures are logged and reported per action; later actions still run.
    pub fn fix_violation(&mut self, transaction: &Transaction<'_>, violation: &Violation<'_>) {
        self.created_atom = None;

        let message = violation.exec_engine_message();
        for action in split_actions(&message) {
            if let Err(err) = self.run_action(transaction, action) {
                warn!(
                    "event=exec_engine_action module=exec status=error role={} rule={} src={} tgt={} error={}",
                    self.role_id,
                    violation.rule().id(),
                    violation.src(),
                    violation.tgt(),
                    err
                );
                transaction
                    .runtime()
                    .user_log()
                    .error(format!("{}: {}", self.role_id, err));
            }
        }
    }

    fn run_action(&mut self, transaction: &Transaction<'_>, action: &str) -> FixResult<()> {
        let parsed = parse_action(action)?;
        let scope = TokenScope {
            now: Utc::now(),
            created_atom: self.created_atom.as_deref(),
            transaction_id: transaction.id(),
        };
        let args = parsed
            .args
            .into_iter()
            .map(|param| resolve_param(param, &scope))
            .collect::<FixResult<Vec<String>>>()?;

        let procedure = transaction
            .runtime()
            .procedures()
            .get(&parsed.procedure)
            .ok_or_else(|| FixError::UnknownProcedure(parsed.procedure.clone()))?;

        debug!(
            "event=exec_engine_action module=exec status=start role={} procedure={} args={}",
            self.role_id,
            parsed.procedure,
            args.len()
        );
        let mut context = FixContext::new(self, transaction);
        procedure(&mut context, args.as_slice())
    }
}
