//! Engine tunables.
//!
//! # Responsibility
//! - Hold the settings the exec engine loop and commit path consume.
//! - Load them from JSON with per-field defaults.
//!
//! # Invariants
//! - `max_run_count` is at least 1.
//! - Exec-engine role ids are non-empty.

use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

/// Default upper bound on exec-engine rounds per transaction.
pub const DEFAULT_MAX_RUN_COUNT: u32 = 10;
/// Role id that maintains rules when no exec-engine roles are configured.
pub const DEFAULT_EXEC_ENGINE_ROLE: &str = "ExecEngine";

/// Settings consumed by the rule engine, exec engines and transactions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Safety valve for the exec-engine fixed-point loop.
    pub max_run_count: u32,
    /// When false, exactly one exec-engine round runs per request.
    pub auto_rerun: bool,
    /// Commit even when invariant rules are violated.
    pub ignore_invariant_violations: bool,
    /// Skip conjuncts that feed `UNI`/`INJ` invariants (performance
    /// workaround, not a correctness guarantee).
    pub skip_uni_inj_conjuncts: bool,
    /// Ordered roles that get an exec engine per transaction.
    pub exec_engine_roles: Vec<String>,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            max_run_count: DEFAULT_MAX_RUN_COUNT,
            auto_rerun: true,
            ignore_invariant_violations: false,
            skip_uni_inj_conjuncts: false,
            exec_engine_roles: vec![DEFAULT_EXEC_ENGINE_ROLE.to_string()],
        }
    }
}

impl EngineSettings {
    /// Parses settings from JSON; absent fields keep their defaults.
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let settings: Self = serde_json::from_str(text).map_err(ConfigError::Parse)?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_path(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&text)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_run_count == 0 {
            return Err(ConfigError::Invalid(
                "max_run_count must be at least 1".to_string(),
            ));
        }
        if self
            .exec_engine_roles
            .iter()
            .any(|role| role.trim().is_empty())
        {
            return Err(ConfigError::Invalid(
                "exec_engine_roles cannot contain empty role ids".to_string(),
            ));
        }
        Ok(())
    }
}

/// Result type for settings loading.
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Settings loading and validation errors.
#[derive(Debug)]
pub enum ConfigError {
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse(serde_json::Error),
    Invalid(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { path, source } => {
                write!(f, "cannot read settings `{}`: {source}", path.display())
            }
            Self::Parse(err) => write!(f, "invalid settings: {err}"),
            Self::Invalid(message) => write!(f, "invalid settings: {message}"),
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Parse(err) => Some(err),
            Self::Invalid(_) => None,
        }
    }
}
