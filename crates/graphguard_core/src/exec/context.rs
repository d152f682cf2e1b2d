//! Execution context handed to fix procedures.

use super::ExecEngine;
use crate::transaction::Transaction;

/// The running exec engine as seen by one fix procedure invocation.
///
/// Gives access to the owning transaction for reads and writes, the
/// created-atom slot, and the engine's terminate/trigger hooks.
pub struct FixContext<'a> {
    engine: &'a mut ExecEngine,
    transaction: &'a Transaction<'a>,
}

impl<'a> FixContext<'a> {
    pub(crate) fn new(engine: &'a mut ExecEngine, transaction: &'a Transaction<'a>) -> Self {
        Self {
            engine,
            transaction,
        }
    }

    pub fn transaction(&self) -> &'a Transaction<'a> {
        self.transaction
    }

    pub fn role_id(&self) -> &str {
        self.engine.role_id()
    }

    /// Atom created earlier while fixing the current violation.
    pub fn created_atom(&self) -> Option<&str> {
        self.engine.created_atom()
    }

    pub fn set_created_atom(&mut self, atom_id: impl Into<String>) {
        self.engine.set_created_atom(atom_id.into());
    }

    /// Stops all further automatic fixing by this engine for the rest of the
    /// transaction.
    pub fn terminate(&mut self) {
        self.engine.terminate();
    }

    /// Schedules one run of `role_id`'s exec engine after the current pass.
    pub fn trigger_service(&self, role_id: &str) {
        self.engine.trigger_service(self.transaction, role_id);
    }

    /// Run counter of the engine; changes once per `check_fix_rules` call.
    pub fn run_id(&self) -> u64 {
        self.engine.run_count()
    }

    /// Returns true the first time `key` is seen during the current run.
    pub fn first_in_run(&mut self, key: &str) -> bool {
        self.engine.mark_processed(key)
    }
}
