//! `InsAtom`, `NewStruct` and `DelAtom`.

use super::pairs::{edit_pairs, PairEdit};
use super::{expand_atoms, expect_args, resolve_concept, NEW_ARG};
use crate::exec::{FixContext, FixError, FixResult, ProcedureRegistry, RegistryError};
use log::debug;

/// Argument count of one link in `NewStruct`.
const LINK_ARGS: usize = 5;

pub(super) fn register(registry: &mut ProcedureRegistry) -> Result<(), RegistryError> {
    registry.register("InsAtom", ins_atom)?;
    registry.register("NewStruct", new_struct)?;
    registry.register("DelAtom", del_atom)?;
    Ok(())
}

/// `InsAtom(concept)`: adds a fresh atom and remembers it as created atom.
fn ins_atom(context: &mut FixContext<'_>, args: &[String]) -> FixResult<()> {
    expect_args("InsAtom", args, 1)?;
    create_atom(context, &args[0], None)?;
    Ok(())
}

/// `NewStruct(concept[, atomId][, relation, srcConcept, srcAtom, tgtConcept, tgtAtom]*)`
fn new_struct(context: &mut FixContext<'_>, args: &[String]) -> FixResult<()> {
    let (atom_id, links) = match args.len() % LINK_ARGS {
        1 => (None, &args[1..]),
        2 => (Some(args[1].as_str()), &args[2..]),
        _ => {
            return Err(FixError::InvalidArguments {
                procedure: "NewStruct",
                message: format!(
                    "expected concept, optional atom id and groups of {LINK_ARGS} link arguments, got {} arguments",
                    args.len()
                ),
            })
        }
    };

    create_atom(context, &args[0], atom_id)?;
    for link in links.chunks_exact(LINK_ARGS) {
        edit_pairs(
            context,
            PairEdit::Insert,
            &link[0],
            &link[1],
            &link[2],
            &link[3],
            &link[4],
        )?;
    }
    Ok(())
}

/// `DelAtom(concept, atom)`: deletes the atom together with its links.
fn del_atom(context: &mut FixContext<'_>, args: &[String]) -> FixResult<()> {
    expect_args("DelAtom", args, 2)?;
    let concept = resolve_concept(context, &args[0])?;
    let Some(atoms) = expand_atoms(context, &args[1])? else {
        debug!(
            "event=fix_atom module=exec status=skipped reason=null_atom concept={}",
            concept.id()
        );
        return Ok(());
    };

    let transaction = context.transaction();
    for atom in &atoms {
        transaction.delete_atom(concept.id(), atom)?;
    }
    Ok(())
}

fn create_atom(
    context: &mut FixContext<'_>,
    concept_id: &str,
    atom_id: Option<&str>,
) -> FixResult<String> {
    let concept = resolve_concept(context, concept_id)?;
    let transaction = context.transaction();
    let atom_id = match atom_id.map(str::trim) {
        Some(id) if !id.is_empty() && id != NEW_ARG => id.to_string(),
        _ => transaction.new_atom_id(concept.id()),
    };

    transaction.add_atom(concept.id(), &atom_id)?;
    context.set_created_atom(atom_id.clone());
    Ok(atom_id)
}
