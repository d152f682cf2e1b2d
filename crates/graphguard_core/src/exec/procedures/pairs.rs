//! `InsPair` and `DelPair`.

use super::{expand_atoms, expect_args, resolve_relation};
use crate::exec::{FixContext, FixResult, ProcedureRegistry, RegistryError};
use log::debug;

pub(super) fn register(registry: &mut ProcedureRegistry) -> Result<(), RegistryError> {
    registry.register("InsPair", ins_pair)?;
    registry.register("DelPair", del_pair)?;
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum PairEdit {
    Insert,
    Delete,
}

/// `InsPair(relation, srcConcept, srcAtom, tgtConcept, tgtAtom)`
fn ins_pair(context: &mut FixContext<'_>, args: &[String]) -> FixResult<()> {
    expect_args("InsPair", args, 5)?;
    edit_pairs(context, PairEdit::Insert, &args[0], &args[1], &args[2], &args[3], &args[4])
}

/// `DelPair(relation, srcConcept, srcAtom, tgtConcept, tgtAtom)`
fn del_pair(context: &mut FixContext<'_>, args: &[String]) -> FixResult<()> {
    expect_args("DelPair", args, 5)?;
    edit_pairs(context, PairEdit::Delete, &args[0], &args[1], &args[2], &args[3], &args[4])
}

/// Applies `edit` to every (src, tgt) combination of the expanded atom
/// arguments. Shared with `NewStruct`.
pub(super) fn edit_pairs(
    context: &FixContext<'_>,
    edit: PairEdit,
    relation_name: &str,
    src_concept: &str,
    src_arg: &str,
    tgt_concept: &str,
    tgt_arg: &str,
) -> FixResult<()> {
    let relation = resolve_relation(context, relation_name, src_concept, tgt_concept)?;
    let (Some(sources), Some(targets)) =
        (expand_atoms(context, src_arg)?, expand_atoms(context, tgt_arg)?)
    else {
        debug!(
            "event=fix_pair module=exec status=skipped reason=null_atom relation={}",
            relation.id()
        );
        return Ok(());
    };

    let transaction = context.transaction();
    for src in &sources {
        for tgt in &targets {
            match edit {
                PairEdit::Insert => transaction.add_link(relation.id(), src, tgt)?,
                PairEdit::Delete => transaction.delete_link(relation.id(), src, tgt)?,
            }
        }
    }
    Ok(())
}
