//! Unit-of-work context shared by rule evaluation, exec engines and
//! transactions.
//!
//! # Responsibility
//! - Own the model, storage backends, cache overlay, settings, procedure
//!   registry and user log for one request scope.
//! - Hold the single open-transaction slot.
//! - Fail fast on configuration errors when built.
//!
//! # Invariants
//! - At least one storage backend and exactly one cache pool are configured.
//! - Every storage id referenced by the model names a configured backend.
//! - Every procedure named by the literal fix text of an exec-engine rule is
//!   registered.
//! - At most one transaction is open at any time.

use crate::cache::{CachePool, StagedCache};
use crate::config::{ConfigError, EngineSettings};
use crate::exec::{ProcedureRegistry, RegistryError};
use crate::model::Model;
use crate::rules::ViolationSegment;
use crate::storage::StorageBackend;
use crate::user_log::UserLog;
use log::info;
use once_cell::sync::Lazy;
use regex::Regex;
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::rc::Rc;

static FIX_PROCEDURE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\{EX\}\s*(?:_;)?\s*([A-Za-z][A-Za-z0-9_]*)").expect("valid fix procedure regex")
});

/// Result type for runtime construction.
pub type RuntimeResult<T> = Result<T, RuntimeError>;

/// Configuration errors detected while building a [`Runtime`].
#[derive(Debug)]
pub enum RuntimeError {
    MissingStorage,
    MissingCachePool,
    DuplicateStorage(String),
    UnknownStorage {
        owner: String,
        storage_id: String,
    },
    UnknownProcedure {
        rule_id: String,
        procedure: String,
    },
    Config(ConfigError),
    Registry(RegistryError),
}

impl Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingStorage => write!(f, "no storage backend configured"),
            Self::MissingCachePool => write!(f, "no cache pool configured"),
            Self::DuplicateStorage(id) => write!(f, "storage backend `{id}` configured twice"),
            Self::UnknownStorage { owner, storage_id } => {
                write!(f, "`{owner}` references unknown storage backend `{storage_id}`")
            }
            Self::UnknownProcedure { rule_id, procedure } => write!(
                f,
                "rule `{rule_id}` names fix procedure `{procedure}` which is not registered"
            ),
            Self::Config(err) => write!(f, "{err}"),
            Self::Registry(err) => write!(f, "{err}"),
        }
    }
}

impl Error for RuntimeError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::Registry(err) => Some(err),
            _ => None,
        }
    }
}

impl From<ConfigError> for RuntimeError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

impl From<RegistryError> for RuntimeError {
    fn from(value: RegistryError) -> Self {
        Self::Registry(value)
    }
}

/// Step-by-step runtime construction.
///
/// The first storage added becomes the default backend, used for conjunct
/// queries and for concepts/relations that name no storage.
pub struct RuntimeBuilder {
    model: Model,
    storages: Vec<Rc<dyn StorageBackend>>,
    cache_pool: Option<Rc<dyn CachePool>>,
    settings: EngineSettings,
    procedures: Option<ProcedureRegistry>,
}

impl RuntimeBuilder {
    pub fn storage(mut self, storage: Rc<dyn StorageBackend>) -> Self {
        self.storages.push(storage);
        self
    }

    pub fn cache_pool(mut self, pool: Rc<dyn CachePool>) -> Self {
        self.cache_pool = Some(pool);
        self
    }

    pub fn settings(mut self, settings: EngineSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Replaces the default built-in registry.
    pub fn procedures(mut self, procedures: ProcedureRegistry) -> Self {
        self.procedures = Some(procedures);
        self
    }

    pub fn build(self) -> RuntimeResult<Runtime> {
        self.settings.validate()?;

        let mut storages = self.storages.into_iter();
        let query_storage = storages.next().ok_or(RuntimeError::MissingStorage)?;
        let mut by_id: BTreeMap<String, Rc<dyn StorageBackend>> = BTreeMap::new();
        by_id.insert(query_storage.id().to_string(), Rc::clone(&query_storage));
        for storage in storages {
            let id = storage.id().to_string();
            if by_id.contains_key(&id) {
                return Err(RuntimeError::DuplicateStorage(id));
            }
            by_id.insert(id, storage);
        }

        let pool = self.cache_pool.ok_or(RuntimeError::MissingCachePool)?;
        let procedures = match self.procedures {
            Some(procedures) => procedures,
            None => ProcedureRegistry::with_builtins()?,
        };

        validate_storage_ids(&self.model, &by_id)?;
        validate_fix_procedures(&self.model, &self.settings, &procedures)?;

        info!(
            "event=runtime_build module=runtime status=ok storages={} procedures={} exec_engine_roles={}",
            by_id.len(),
            procedures.len(),
            self.settings.exec_engine_roles.len()
        );

        Ok(Runtime {
            model: self.model,
            storages: by_id,
            query_storage,
            cache: StagedCache::new(pool),
            settings: self.settings,
            procedures,
            user_log: UserLog::new(),
            atom_cache: RefCell::new(BTreeMap::new()),
            transaction_open: Cell::new(false),
        })
    }
}

fn validate_storage_ids(
    model: &Model,
    storages: &BTreeMap<String, Rc<dyn StorageBackend>>,
) -> RuntimeResult<()> {
    let concept_refs = model
        .concepts()
        .flat_map(|concept| concept.storage_ids().iter().map(move |id| (concept.id(), id)));
    let relation_refs = model
        .relations()
        .flat_map(|relation| relation.storage_ids().iter().map(move |id| (relation.id(), id)));

    for (owner, storage_id) in concept_refs.chain(relation_refs) {
        if !storages.contains_key(storage_id) {
            return Err(RuntimeError::UnknownStorage {
                owner: owner.to_string(),
                storage_id: storage_id.clone(),
            });
        }
    }
    Ok(())
}

/// Rejects maintained rules whose literal fix text names an unknown procedure.
fn validate_fix_procedures(
    model: &Model,
    settings: &EngineSettings,
    procedures: &ProcedureRegistry,
) -> RuntimeResult<()> {
    let maintained: BTreeSet<&str> = settings
        .exec_engine_roles
        .iter()
        .filter_map(|role_id| model.role(role_id))
        .flat_map(|role| role.maintained_rule_ids().iter().map(String::as_str))
        .collect();

    for rule_id in maintained {
        let Some(rule) = model.rule(rule_id) else {
            continue;
        };
        for segment in rule.violation_segments() {
            let ViolationSegment::Text(text) = segment else {
                continue;
            };
            for captures in FIX_PROCEDURE_RE.captures_iter(text) {
                let name = &captures[1];
                if !procedures.contains(name) {
                    return Err(RuntimeError::UnknownProcedure {
                        rule_id: rule.id().to_string(),
                        procedure: name.to_string(),
                    });
                }
            }
        }
    }
    Ok(())
}

/// Request-scoped context passed explicitly to evaluation and transactions.
pub struct Runtime {
    model: Model,
    storages: BTreeMap<String, Rc<dyn StorageBackend>>,
    query_storage: Rc<dyn StorageBackend>,
    cache: StagedCache,
    settings: EngineSettings,
    procedures: ProcedureRegistry,
    user_log: UserLog,
    /// Known atoms per concept, filled by existence checks and writes.
    atom_cache: RefCell<BTreeMap<String, BTreeSet<String>>>,
    transaction_open: Cell<bool>,
}

impl Runtime {
    pub fn builder(model: Model) -> RuntimeBuilder {
        RuntimeBuilder {
            model,
            storages: Vec::new(),
            cache_pool: None,
            settings: EngineSettings::default(),
            procedures: None,
        }
    }

    pub fn model(&self) -> &Model {
        &self.model
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    pub fn cache(&self) -> &StagedCache {
        &self.cache
    }

    pub fn user_log(&self) -> &UserLog {
        &self.user_log
    }

    pub fn procedures(&self) -> &ProcedureRegistry {
        &self.procedures
    }

    /// Backend answering conjunct queries.
    pub fn query_storage(&self) -> &dyn StorageBackend {
        self.query_storage.as_ref()
    }

    pub fn storage(&self, id: &str) -> Option<&dyn StorageBackend> {
        self.storages.get(id).map(|storage| storage.as_ref())
    }

    /// Backends holding data declared on `storage_ids`; the default backend
    /// when the list is empty.
    pub fn storages_for(&self, storage_ids: &[String]) -> Vec<&dyn StorageBackend> {
        if storage_ids.is_empty() {
            return vec![self.query_storage()];
        }
        storage_ids
            .iter()
            .filter_map(|id| self.storage(id))
            .collect()
    }

    pub fn has_open_transaction(&self) -> bool {
        self.transaction_open.get()
    }

    /// Claims the open-transaction slot; false when already taken.
    pub(crate) fn acquire_transaction_slot(&self) -> bool {
        !self.transaction_open.replace(true)
    }

    pub(crate) fn release_transaction_slot(&self) {
        self.transaction_open.set(false);
    }

    pub(crate) fn atom_cached(&self, concept_id: &str, atom_id: &str) -> bool {
        self.atom_cache
            .borrow()
            .get(concept_id)
            .is_some_and(|atoms| atoms.contains(atom_id))
    }

    pub(crate) fn cache_atom(&self, concept_id: &str, atom_id: &str) {
        self.atom_cache
            .borrow_mut()
            .entry(concept_id.to_string())
            .or_default()
            .insert(atom_id.to_string());
    }

    pub(crate) fn forget_atom(&self, concept_id: &str, atom_id: &str) {
        if let Some(atoms) = self.atom_cache.borrow_mut().get_mut(concept_id) {
            atoms.remove(atom_id);
        }
    }

    pub(crate) fn clear_atom_cache(&self, concept_id: &str) {
        self.atom_cache.borrow_mut().remove(concept_id);
    }
}
