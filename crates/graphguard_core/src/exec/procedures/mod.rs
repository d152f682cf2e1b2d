//! Built-in fix procedures.
//!
//! # Responsibility
//! - Register the pair, atom and closure procedures into a registry.
//! - Share argument helpers (`_NULL`, `_NEW`, `_AND` atom conventions).
//!
//! # See also
//! - `crate::exec::action` for how arguments are split and resolved.

use super::{FixContext, FixError, FixResult, ProcedureRegistry, RegistryError};
use crate::model::{Concept, Relation};

mod atoms;
mod closure;
mod pairs;

/// Atom argument meaning "skip this action".
pub const NULL_ARG: &str = "_NULL";
/// Atom argument standing for the atom created earlier in this violation.
pub const NEW_ARG: &str = "_NEW";
/// Separator for several atoms in one argument, e.g. `o1_ANDo2`.
pub const AND_SEPARATOR: &str = "_AND";

/// Registers every built-in procedure; each module contributes its own.
pub fn register_builtins(registry: &mut ProcedureRegistry) -> Result<(), RegistryError> {
    pairs::register(registry)?;
    atoms::register(registry)?;
    closure::register(registry)?;
    Ok(())
}

fn expect_args(procedure: &'static str, args: &[String], expected: usize) -> FixResult<()> {
    if args.len() == expected {
        return Ok(());
    }
    Err(FixError::InvalidArguments {
        procedure,
        message: format!("expected {expected} arguments, got {}", args.len()),
    })
}

/// Expands one atom argument; `None` means the action must be skipped.
fn expand_atoms(context: &FixContext<'_>, arg: &str) -> FixResult<Option<Vec<String>>> {
    if arg == NULL_ARG {
        return Ok(None);
    }

    arg.split(AND_SEPARATOR)
        .map(str::trim)
        .filter(|atom| !atom.is_empty())
        .map(|atom| {
            if atom == NEW_ARG {
                context
                    .created_atom()
                    .map(str::to_string)
                    .ok_or(FixError::NoCreatedAtom)
            } else {
                Ok(atom.to_string())
            }
        })
        .collect::<FixResult<Vec<String>>>()
        .map(Some)
}

fn resolve_concept<'a>(context: &FixContext<'a>, concept_id: &str) -> FixResult<&'a Concept> {
    context
        .transaction()
        .runtime()
        .model()
        .concept(concept_id)
        .ok_or_else(|| FixError::UnknownConcept(concept_id.to_string()))
}

fn resolve_relation<'a>(
    context: &FixContext<'a>,
    name: &str,
    src_concept: &str,
    tgt_concept: &str,
) -> FixResult<&'a Relation> {
    context
        .transaction()
        .runtime()
        .model()
        .relation_by_signature(name, src_concept, tgt_concept)
        .ok_or_else(|| FixError::UnknownRelation(format!("{name}[{src_concept}*{tgt_concept}]")))
}
