//! Unit-of-work coordinator.
//!
//! # Responsibility
//! - Track concepts and relations touched by writes and derive the affected
//!   conjuncts and rules from them.
//! - Drive the exec-engine fixed-point loop.
//! - Decide commit or rollback from the invariant check at close and drive
//!   every opened storage backend to that outcome.
//!
//! # Invariants
//! - At most one transaction is open per [`Runtime`].
//! - Open → Committed/RolledBack is the only transition; both are terminal.
//! - A backend is started at most once per transaction, on the first write
//!   touching data it holds.
//! - Staged cache entries never outlive the transaction that staged them.

use crate::cache::CacheError;
use crate::exec::ExecEngine;
use crate::model::{Concept, Relation};
use crate::rules::{rule_engine, Conjunct, Rule};
use crate::runtime::Runtime;
use crate::storage::{Pair, StorageBackend, StorageError};
use log::{debug, error, info, warn};
use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;
use std::error::Error;
use std::fmt::{Display, Formatter};
use uuid::Uuid;

/// Result type for transaction operations.
pub type TransactionResult<T> = Result<T, TransactionError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Open,
    Committed,
    RolledBack,
}

impl Display for TransactionState {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let value = match self {
            Self::Open => "open",
            Self::Committed => "committed",
            Self::RolledBack => "rolled_back",
        };
        write!(f, "{value}")
    }
}

/// Transaction lifecycle and data operation errors.
#[derive(Debug)]
pub enum TransactionError {
    /// Another transaction is open on the same runtime.
    AlreadyOpen,
    NotOpen(TransactionState),
    Storage(StorageError),
    Cache(CacheError),
    UnknownConcept(String),
    UnknownRelation(String),
    /// Backends that failed to commit or roll back; the transaction still
    /// reached its terminal state.
    Backends(Vec<(String, StorageError)>),
}

impl Display for TransactionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::AlreadyOpen => write!(f, "a transaction is already open"),
            Self::NotOpen(state) => write!(f, "transaction is not open (state={state})"),
            Self::Storage(err) => write!(f, "{err}"),
            Self::Cache(err) => write!(f, "{err}"),
            Self::UnknownConcept(id) => write!(f, "unknown concept `{id}`"),
            Self::UnknownRelation(id) => write!(f, "unknown relation `{id}`"),
            Self::Backends(failures) => {
                let ids: Vec<&str> = failures.iter().map(|(id, _)| id.as_str()).collect();
                write!(f, "storage backends failed to finish: {}", ids.join(", "))
            }
        }
    }
}

impl Error for TransactionError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Storage(err) => Some(err),
            Self::Cache(err) => Some(err),
            Self::Backends(failures) => failures
                .first()
                .map(|(_, err)| err as &(dyn Error + 'static)),
            _ => None,
        }
    }
}

impl From<StorageError> for TransactionError {
    fn from(value: StorageError) -> Self {
        Self::Storage(value)
    }
}

impl From<CacheError> for TransactionError {
    fn from(value: CacheError) -> Self {
        Self::Cache(value)
    }
}

/// One unit of work over a [`Runtime`].
///
/// Dropping an open transaction rolls it back.
pub struct Transaction<'rt> {
    id: String,
    runtime: &'rt Runtime,
    state: Cell<TransactionState>,
    affected_concepts: RefCell<BTreeSet<String>>,
    affected_relations: RefCell<BTreeSet<String>>,
    invariant_rules_hold: Cell<Option<bool>>,
    exec_engines: RefCell<Vec<ExecEngine>>,
    /// Engines created on demand for triggered roles outside the configured set.
    service_engines: RefCell<Vec<ExecEngine>>,
    opened_storages: RefCell<Vec<String>>,
    pending_services: RefCell<Vec<String>>,
}

impl<'rt> Transaction<'rt> {
    /// Opens a transaction; fails when one is already open on `runtime`.
    pub fn begin(runtime: &'rt Runtime) -> TransactionResult<Self> {
        if !runtime.acquire_transaction_slot() {
            return Err(TransactionError::AlreadyOpen);
        }

        let model = runtime.model();
        let mut exec_engines = Vec::new();
        for role_id in &runtime.settings().exec_engine_roles {
            match model.role(role_id) {
                None => warn!(
                    "event=exec_engine_init module=transaction status=skipped reason=unknown_role role={role_id}"
                ),
                Some(role) if role.maintained_rule_ids().is_empty() => info!(
                    "event=exec_engine_init module=transaction status=skipped reason=no_rules role={role_id}"
                ),
                Some(role) => exec_engines.push(ExecEngine::new(role)),
            }
        }

        let id = Uuid::new_v4().to_string();
        info!(
            "event=transaction_begin module=transaction status=ok transaction={} exec_engines={}",
            id,
            exec_engines.len()
        );
        Ok(Self {
            id,
            runtime,
            state: Cell::new(TransactionState::Open),
            affected_concepts: RefCell::new(BTreeSet::new()),
            affected_relations: RefCell::new(BTreeSet::new()),
            invariant_rules_hold: Cell::new(None),
            exec_engines: RefCell::new(exec_engines),
            service_engines: RefCell::new(Vec::new()),
            opened_storages: RefCell::new(Vec::new()),
            pending_services: RefCell::new(Vec::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn runtime(&self) -> &'rt Runtime {
        self.runtime
    }

    pub fn state(&self) -> TransactionState {
        self.state.get()
    }

    pub fn is_open(&self) -> bool {
        self.state.get() == TransactionState::Open
    }

    /// Outcome of the invariant check at close; `None` before close.
    pub fn invariant_rules_hold(&self) -> Option<bool> {
        self.invariant_rules_hold.get()
    }

    pub fn affected_concepts(&self) -> Vec<String> {
        self.affected_concepts.borrow().iter().cloned().collect()
    }

    pub fn affected_relations(&self) -> Vec<String> {
        self.affected_relations.borrow().iter().cloned().collect()
    }

    /// Storage ids started by this transaction, in start order.
    pub fn opened_storages(&self) -> Vec<String> {
        self.opened_storages.borrow().clone()
    }

    /// Snapshot of the exec engine bound to `role_id`.
    ///
    /// While exec engines run, this is the engine as of its last completed
    /// pass.
    pub fn exec_engine(&self, role_id: &str) -> Option<ExecEngine> {
        let configured = self.exec_engines.borrow();
        let services = self.service_engines.borrow();
        let engine = configured
            .iter()
            .chain(services.iter())
            .find(|engine| engine.role_id() == role_id)
            .cloned();
        engine
    }

    fn ensure_open(&self) -> TransactionResult<()> {
        match self.state.get() {
            TransactionState::Open => Ok(()),
            state => Err(TransactionError::NotOpen(state)),
        }
    }

    /// Marks `concept` affected, starting its backends on first registration.
    pub fn add_affected_concept(&self, concept: &Concept) -> TransactionResult<()> {
        self.ensure_open()?;
        if self.affected_concepts.borrow().contains(concept.id()) {
            return Ok(());
        }
        self.start_storages(concept.storage_ids())?;
        self.affected_concepts
            .borrow_mut()
            .insert(concept.id().to_string());
        debug!(
            "event=transaction_affected module=transaction status=ok transaction={} concept={}",
            self.id,
            concept.id()
        );
        Ok(())
    }

    /// Marks `relation` affected, starting its backends on first registration.
    pub fn add_affected_relation(&self, relation: &Relation) -> TransactionResult<()> {
        self.ensure_open()?;
        if self.affected_relations.borrow().contains(relation.id()) {
            return Ok(());
        }
        self.start_storages(relation.storage_ids())?;
        self.affected_relations
            .borrow_mut()
            .insert(relation.id().to_string());
        debug!(
            "event=transaction_affected module=transaction status=ok transaction={} relation={}",
            self.id,
            relation.id()
        );
        Ok(())
    }

    fn start_storages(&self, storage_ids: &[String]) -> TransactionResult<()> {
        for storage in self.runtime.storages_for(storage_ids) {
            if self
                .opened_storages
                .borrow()
                .iter()
                .any(|id| id == storage.id())
            {
                continue;
            }
            storage.start_transaction()?;
            self.opened_storages
                .borrow_mut()
                .push(storage.id().to_string());
            debug!(
                "event=storage_start module=transaction status=ok transaction={} storage={}",
                self.id,
                storage.id()
            );
        }
        Ok(())
    }

    /// Conjuncts named by affected concepts and relations, without duplicates.
    pub fn affected_conjuncts(&self) -> Vec<&'rt Conjunct> {
        let model = self.runtime.model();
        let concepts = self.affected_concepts.borrow();
        let relations = self.affected_relations.borrow();

        let concept_conjuncts = concepts
            .iter()
            .filter_map(|id| model.concept(id))
            .flat_map(|concept| concept.affected_conjunct_ids());
        let relation_conjuncts = relations
            .iter()
            .filter_map(|id| model.relation(id))
            .flat_map(|relation| relation.affected_conjunct_ids());

        let mut seen = BTreeSet::new();
        let conjuncts = concept_conjuncts
            .chain(relation_conjuncts)
            .filter(|id| seen.insert(id.as_str()))
            .filter_map(|id| model.conjunct(id))
            .collect();
        conjuncts
    }

    /// Rules named by the affected conjuncts, without duplicates.
    pub fn affected_rules(&self) -> Vec<&'rt Rule> {
        let model = self.runtime.model();
        let mut seen = BTreeSet::new();
        let rules = self
            .affected_conjuncts()
            .into_iter()
            .flat_map(|conjunct| conjunct.rule_ids())
            .filter(|id| seen.insert(*id))
            .filter_map(|id| model.rule(id))
            .collect();
        rules
    }

    fn concept(&self, concept_id: &str) -> TransactionResult<&'rt Concept> {
        self.runtime
            .model()
            .concept(concept_id)
            .ok_or_else(|| TransactionError::UnknownConcept(concept_id.to_string()))
    }

    fn relation(&self, relation_id: &str) -> TransactionResult<&'rt Relation> {
        self.runtime
            .model()
            .relation(relation_id)
            .ok_or_else(|| TransactionError::UnknownRelation(relation_id.to_string()))
    }

    /// Fresh atom id of the form `<concept>_<uuid>`.
    pub fn new_atom_id(&self, concept_id: &str) -> String {
        format!("{}_{}", concept_id, Uuid::new_v4().simple())
    }

    pub fn atom_exists(&self, concept_id: &str, atom_id: &str) -> TransactionResult<bool> {
        if self.runtime.atom_cached(concept_id, atom_id) {
            return Ok(true);
        }
        let concept = self.concept(concept_id)?;
        for storage in self.runtime.storages_for(concept.storage_ids()) {
            if storage.atom_exists(concept, atom_id)? {
                self.runtime.cache_atom(concept_id, atom_id);
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn add_atom(&self, concept_id: &str, atom_id: &str) -> TransactionResult<()> {
        self.ensure_open()?;
        let concept = self.concept(concept_id)?;
        if self.atom_exists(concept_id, atom_id)? {
            return Ok(());
        }
        self.add_affected_concept(concept)?;

        for storage in self.runtime.storages_for(concept.storage_ids()) {
            storage.add_atom(concept, atom_id)?;
        }
        self.runtime.cache_atom(concept_id, atom_id);
        debug!(
            "event=atom_add module=transaction status=ok transaction={} concept={} atom={}",
            self.id, concept_id, atom_id
        );
        Ok(())
    }

    /// Deletes the atom and every link referring to it.
    ///
    /// Every relation with the atom's concept as source or target is marked
    /// affected.
    pub fn delete_atom(&self, concept_id: &str, atom_id: &str) -> TransactionResult<()> {
        self.ensure_open()?;
        let concept = self.concept(concept_id)?;
        self.add_affected_concept(concept)?;
        let relations = self.runtime.model().relations_touching(concept_id);
        for &relation in &relations {
            self.add_affected_relation(relation)?;
        }

        let mut storages: Vec<&dyn StorageBackend> =
            self.runtime.storages_for(concept.storage_ids());
        for &relation in &relations {
            for storage in self.runtime.storages_for(relation.storage_ids()) {
                if !storages.iter().any(|known| known.id() == storage.id()) {
                    storages.push(storage);
                }
            }
        }

        for storage in storages {
            let held: Vec<&Relation> = relations
                .iter()
                .copied()
                .filter(|relation| {
                    self.runtime
                        .storages_for(relation.storage_ids())
                        .iter()
                        .any(|candidate| candidate.id() == storage.id())
                })
                .collect();
            storage.delete_atom(concept, atom_id, &held)?;
        }
        self.runtime.forget_atom(concept_id, atom_id);
        debug!(
            "event=atom_delete module=transaction status=ok transaction={} concept={} atom={}",
            self.id, concept_id, atom_id
        );
        Ok(())
    }

    /// Current population of a relation, read from its primary backend.
    pub fn links(&self, relation_id: &str) -> TransactionResult<Vec<Pair>> {
        let relation = self.relation(relation_id)?;
        match self.runtime.storages_for(relation.storage_ids()).first() {
            Some(storage) => Ok(storage.links(relation)?),
            None => Ok(Vec::new()),
        }
    }

    /// Adds a link, adding missing source and target atoms first.
    pub fn add_link(&self, relation_id: &str, src: &str, tgt: &str) -> TransactionResult<()> {
        self.ensure_open()?;
        let relation = self.relation(relation_id)?;
        self.add_atom(relation.src_concept(), src)?;
        self.add_atom(relation.tgt_concept(), tgt)?;
        self.add_affected_relation(relation)?;

        for storage in self.runtime.storages_for(relation.storage_ids()) {
            storage.add_link(relation, src, tgt)?;
        }
        debug!(
            "event=link_add module=transaction status=ok transaction={} relation={} src={} tgt={}",
            self.id, relation_id, src, tgt
        );
        Ok(())
    }

    pub fn delete_link(&self, relation_id: &str, src: &str, tgt: &str) -> TransactionResult<()> {
        self.ensure_open()?;
        let relation = self.relation(relation_id)?;
        self.add_affected_relation(relation)?;

        for storage in self.runtime.storages_for(relation.storage_ids()) {
            storage.delete_link(relation, src, tgt)?;
        }
        debug!(
            "event=link_delete module=transaction status=ok transaction={} relation={} src={} tgt={}",
            self.id, relation_id, src, tgt
        );
        Ok(())
    }

    /// Schedules one run of `role_id`'s exec engine after the current round.
    pub fn request_service(&self, role_id: &str) {
        let mut pending = self.pending_services.borrow_mut();
        if !pending.iter().any(|pending_id| pending_id == role_id) {
            pending.push(role_id.to_string());
        }
    }

    /// Runs every exec engine until no rule gets fixed in a round.
    ///
    /// With `check_all_rules` the first round covers every rule of the model
    /// instead of only the affected ones. Rounds are bounded by
    /// `max_run_count`; reaching the bound stops the loop without failing.
    pub fn run_exec_engine(&self, check_all_rules: bool) -> TransactionResult<()> {
        self.ensure_open()?;
        let settings = self.runtime.settings();
        let mut engines = self.exec_engines.borrow().clone();
        let mut services = self.service_engines.borrow().clone();
        let mut rules: Vec<&'rt Rule> = if check_all_rules {
            self.runtime.model().rules().iter().collect()
        } else {
            self.affected_rules()
        };

        let mut round: u32 = 0;
        loop {
            round += 1;
            let mut fixed = 0usize;
            for index in 0..engines.len() {
                fixed += engines[index].check_fix_rules(self, &rules).len();
                self.exec_engines.replace(engines.clone());
            }
            fixed += self.run_requested_services(&mut engines, &mut services);
            debug!(
                "event=exec_engine_round module=transaction status=ok transaction={} round={} rules={} fixed={}",
                self.id,
                round,
                rules.len(),
                fixed
            );

            if !settings.auto_rerun {
                break;
            }
            if fixed == 0 && self.pending_services.borrow().is_empty() {
                break;
            }
            if round >= settings.max_run_count {
                error!(
                    "event=exec_engine_loop module=transaction status=error reason=max_run_count transaction={} rounds={}",
                    self.id, round
                );
                self.runtime.user_log().warning(format!(
                    "Maximum reruns exceeded for exec engines ({round} rounds); stopped fixing"
                ));
                break;
            }
            rules = self.affected_rules();
        }

        self.exec_engines.replace(engines);
        self.service_engines.replace(services);
        let leftover = self.pending_services.take();
        if !leftover.is_empty() {
            warn!(
                "event=exec_engine_service module=transaction status=dropped transaction={} roles={}",
                self.id,
                leftover.join(",")
            );
        }
        Ok(())
    }

    /// Runs the engines requested during the round, once each.
    ///
    /// A requested role without a configured engine gets one for the rest of
    /// the transaction; it only runs when requested again.
    fn run_requested_services(
        &self,
        engines: &mut Vec<ExecEngine>,
        services: &mut Vec<ExecEngine>,
    ) -> usize {
        let model = self.runtime.model();
        let mut fixed = 0usize;
        for role_id in self.pending_services.take() {
            let engine = if let Some(index) =
                engines.iter().position(|engine| engine.role_id() == role_id)
            {
                &mut engines[index]
            } else if let Some(index) =
                services.iter().position(|engine| engine.role_id() == role_id)
            {
                &mut services[index]
            } else if let Some(role) = model.role(&role_id) {
                services.push(ExecEngine::new(role));
                let last = services.len() - 1;
                &mut services[last]
            } else {
                warn!(
                    "event=exec_engine_service module=transaction status=skipped reason=unknown_role role={role_id}"
                );
                self.runtime
                    .user_log()
                    .warning(format!("Unknown exec engine role '{role_id}' requested"));
                continue;
            };

            let rules: Vec<&'rt Rule> = engine
                .maintained_rule_ids()
                .filter_map(|rule_id| model.rule(rule_id))
                .collect();
            fixed += engine.check_fix_rules(self, &rules).len();
            self.exec_engines.replace(engines.clone());
            self.service_engines.replace(services.clone());
        }
        fixed
    }

    /// Evaluates the affected invariants and commits or rolls back.
    ///
    /// | dry_run | invariants hold | ignore | outcome |
    /// |---|---|---|---|
    /// | true | any | any | rollback |
    /// | false | true | any | commit |
    /// | false | false | true | commit |
    /// | false | false | false | rollback |
    ///
    /// `ignore_invariant_violations` is OR-ed with the runtime setting.
    pub fn close(
        &self,
        dry_run: bool,
        ignore_invariant_violations: bool,
    ) -> TransactionResult<TransactionState> {
        self.ensure_open()?;
        let ignore =
            ignore_invariant_violations || self.runtime.settings().ignore_invariant_violations;

        let holds = self.check_invariant_rules();
        self.invariant_rules_hold.set(Some(holds));

        if dry_run {
            info!(
                "event=transaction_close module=transaction status=dry_run transaction={} invariants_hold={}",
                self.id, holds
            );
            self.rollback()?;
        } else if holds {
            self.commit()?;
        } else if ignore {
            warn!(
                "event=transaction_close module=transaction status=ignored_violations transaction={}",
                self.id
            );
            self.runtime
                .user_log()
                .warning("Transaction committed with invariant violations");
            self.commit()?;
        } else {
            self.runtime
                .user_log()
                .warning("Invariant rules violated; changes are rolled back");
            self.rollback()?;
        }
        Ok(self.state.get())
    }

    /// Rolls back without evaluating rules.
    pub fn cancel(&self) -> TransactionResult<()> {
        self.ensure_open()?;
        info!(
            "event=transaction_cancel module=transaction status=ok transaction={}",
            self.id
        );
        self.rollback()
    }

    /// Force-evaluates the affected conjuncts and reports every violation of
    /// the affected invariant rules. Any evaluation failure counts as broken.
    fn check_invariant_rules(&self) -> bool {
        let mut holds = true;
        for conjunct in self.affected_conjuncts() {
            if let Err(err) = conjunct.evaluate(self.runtime) {
                error!(
                    "event=transaction_check module=transaction status=error transaction={} conjunct={} error={}",
                    self.id,
                    conjunct.id(),
                    err
                );
                self.runtime.user_log().error(format!(
                    "Error while evaluating conjunct '{}'",
                    conjunct.id()
                ));
                holds = false;
            }
        }

        let invariants: Vec<&'rt Rule> = self
            .affected_rules()
            .into_iter()
            .filter(|rule| rule.is_invariant())
            .collect();
        match rule_engine::get_violations_from_cache(self.runtime, &invariants) {
            Ok(violations) => {
                for violation in &violations {
                    self.runtime.user_log().violation(violation);
                }
                if !violations.is_empty() {
                    holds = false;
                }
            }
            Err(err) => {
                error!(
                    "event=transaction_check module=transaction status=error transaction={} error={}",
                    self.id, err
                );
                self.runtime
                    .user_log()
                    .error("Error while checking invariant rules");
                holds = false;
            }
        }
        holds
    }

    fn commit(&self) -> TransactionResult<()> {
        let conjunct_ids: Vec<&str> = self
            .affected_conjuncts()
            .into_iter()
            .map(Conjunct::id)
            .collect();
        let cache_result = self.runtime.cache().commit(conjunct_ids.iter().copied());
        self.runtime.cache().discard();

        let failures = self.finish_storages(|storage| storage.commit_transaction());
        self.finish(TransactionState::Committed);

        if !failures.is_empty() {
            return Err(TransactionError::Backends(failures));
        }
        cache_result?;
        Ok(())
    }

    fn rollback(&self) -> TransactionResult<()> {
        let failures = self.finish_storages(|storage| storage.rollback_transaction());
        for concept_id in self.affected_concepts.borrow().iter() {
            self.runtime.clear_atom_cache(concept_id);
        }
        self.runtime.cache().discard();
        self.finish(TransactionState::RolledBack);

        if failures.is_empty() {
            Ok(())
        } else {
            Err(TransactionError::Backends(failures))
        }
    }

    /// Applies `step` to every opened backend independently.
    fn finish_storages(
        &self,
        step: impl Fn(&dyn StorageBackend) -> Result<(), StorageError>,
    ) -> Vec<(String, StorageError)> {
        let mut failures = Vec::new();
        for storage_id in self.opened_storages.take() {
            let Some(storage) = self.runtime.storage(&storage_id) else {
                continue;
            };
            if let Err(err) = step(storage) {
                error!(
                    "event=storage_finish module=transaction status=error transaction={} storage={} error={}",
                    self.id, storage_id, err
                );
                failures.push((storage_id, err));
            }
        }
        failures
    }

    fn finish(&self, state: TransactionState) {
        self.state.set(state);
        self.runtime.release_transaction_slot();
        info!(
            "event=transaction_end module=transaction status={} transaction={}",
            state, self.id
        );
    }
}

impl Drop for Transaction<'_> {
    fn drop(&mut self) {
        if !self.is_open() {
            return;
        }
        warn!(
            "event=transaction_drop module=transaction status=cancelled transaction={}",
            self.id
        );
        if let Err(err) = self.rollback() {
            error!(
                "event=transaction_drop module=transaction status=error transaction={} error={}",
                self.id, err
            );
        }
    }
}
