//! Name → fix procedure map, composed once at startup.

use super::{procedures, FixContext, FixResult};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::rc::Rc;

static PROCEDURE_NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("valid procedure name regex"));

/// Side-effecting routine repairing one violation.
///
/// Receives the exec context and the positional string arguments that
/// followed the procedure name in the fix action.
pub type FixProcedure = Rc<dyn Fn(&mut FixContext<'_>, &[String]) -> FixResult<()>>;

/// Registration errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidName(String),
    DuplicateName(String),
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidName(value) => write!(f, "fix procedure name is invalid: `{value}`"),
            Self::DuplicateName(value) => {
                write!(f, "fix procedure already registered: {value}")
            }
        }
    }
}

impl Error for RegistryError {}

/// Explicit procedure registry; re-registering a name is rejected.
#[derive(Default)]
pub struct ProcedureRegistry {
    procedures: BTreeMap<String, FixProcedure>,
}

impl ProcedureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the built-in pair, atom and closure procedures.
    pub fn with_builtins() -> Result<Self, RegistryError> {
        let mut registry = Self::new();
        procedures::register_builtins(&mut registry)?;
        Ok(registry)
    }

    pub fn register<F>(&mut self, name: &str, procedure: F) -> Result<(), RegistryError>
    where
        F: Fn(&mut FixContext<'_>, &[String]) -> FixResult<()> + 'static,
    {
        let name = name.trim();
        if !PROCEDURE_NAME_RE.is_match(name) {
            return Err(RegistryError::InvalidName(name.to_string()));
        }
        if self.procedures.contains_key(name) {
            return Err(RegistryError::DuplicateName(name.to_string()));
        }

        self.procedures.insert(name.to_string(), Rc::new(procedure));
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&FixProcedure> {
        self.procedures.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.procedures.contains_key(name)
    }

    /// Sorted procedure names.
    pub fn names(&self) -> Vec<&str> {
        self.procedures.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.procedures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.procedures.is_empty()
    }
}

impl Debug for ProcedureRegistry {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcedureRegistry")
            .field("procedures", &self.names())
            .finish()
    }
}
