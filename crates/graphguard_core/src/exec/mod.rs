//! Automatic violation fixing.
//!
//! # Responsibility
//! - Run the check→fix loop of one role inside one transaction.
//! - Parse fix-action messages and dispatch them to registered procedures.
//!
//! # Invariants
//! - An exec engine only fixes rules its role maintains.
//! - A failing action is reported and never aborts the remaining actions.
//! - A terminated engine performs no further fixes in its transaction.

use crate::transaction::TransactionError;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub mod action;
mod context;
mod engine;
pub mod procedures;
mod registry;

pub use context::FixContext;
pub use engine::ExecEngine;
pub use registry::{FixProcedure, ProcedureRegistry, RegistryError};

/// Result type for fix actions and procedures.
pub type FixResult<T> = Result<T, FixError>;

/// Failure of one fix action.
#[derive(Debug)]
pub enum FixError {
    /// The action has no procedure name.
    EmptyAction,
    UnknownProcedure(String),
    UnknownToken(String),
    InvalidArguments {
        procedure: &'static str,
        message: String,
    },
    /// `_NEW` or `LAST_CREATED_ID` used before any atom was created.
    NoCreatedAtom,
    UnknownConcept(String),
    UnknownRelation(String),
    Transaction(TransactionError),
    /// Free-form failure raised by a custom procedure.
    Procedure(String),
}

impl Display for FixError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyAction => write!(f, "fix action has no procedure name"),
            Self::UnknownProcedure(name) => write!(f, "fix procedure `{name}` is not registered"),
            Self::UnknownToken(token) => write!(f, "unknown template token `{token}`"),
            Self::InvalidArguments { procedure, message } => {
                write!(f, "{procedure}: {message}")
            }
            Self::NoCreatedAtom => write!(f, "no atom was created by a previous action"),
            Self::UnknownConcept(id) => write!(f, "unknown concept `{id}`"),
            Self::UnknownRelation(id) => write!(f, "unknown relation `{id}`"),
            Self::Transaction(err) => write!(f, "{err}"),
            Self::Procedure(message) => write!(f, "{message}"),
        }
    }
}

impl Error for FixError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Transaction(err) => Some(err),
            _ => None,
        }
    }
}

impl From<TransactionError> for FixError {
    fn from(value: TransactionError) -> Self {
        Self::Transaction(value)
    }
}
