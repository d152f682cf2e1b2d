//! `TransitiveClosure`.

use super::{expect_args, resolve_relation};
use crate::exec::{FixContext, FixResult, ProcedureRegistry, RegistryError};
use crate::storage::Pair;
use log::{debug, info};
use std::collections::{BTreeMap, BTreeSet};

pub(super) fn register(registry: &mut ProcedureRegistry) -> Result<(), RegistryError> {
    registry.register("TransitiveClosure", transitive_closure)
}

/// `TransitiveClosure(relation, concept, closureRelation)`
///
/// Rewrites `closureRelation[C*C]` to the transitive closure of
/// `relation[C*C]`. Runs at most once per engine run and relation, since
/// every violation of the same rule would recompute the same closure.
fn transitive_closure(context: &mut FixContext<'_>, args: &[String]) -> FixResult<()> {
    expect_args("TransitiveClosure", args, 3)?;
    let concept = args[1].as_str();
    let relation = resolve_relation(context, &args[0], concept, concept)?;
    let closure_relation = resolve_relation(context, &args[2], concept, concept)?;

    let memo_key = format!("TransitiveClosure:{}", relation.id());
    if !context.first_in_run(&memo_key) {
        debug!(
            "event=fix_closure module=exec status=skipped reason=already_computed run={} relation={}",
            context.run_id(),
            relation.id()
        );
        return Ok(());
    }

    let transaction = context.transaction();
    let wanted = closure_of(&transaction.links(relation.id())?);
    let current: BTreeSet<Pair> = transaction
        .links(closure_relation.id())?
        .into_iter()
        .collect();

    let mut removed = 0usize;
    for pair in current.difference(&wanted) {
        transaction.delete_link(closure_relation.id(), &pair.src, &pair.tgt)?;
        removed += 1;
    }
    let mut added = 0usize;
    for pair in wanted.difference(&current) {
        transaction.add_link(closure_relation.id(), &pair.src, &pair.tgt)?;
        added += 1;
    }

    info!(
        "event=fix_closure module=exec status=ok relation={} closure={} added={} removed={}",
        relation.id(),
        closure_relation.id(),
        added,
        removed
    );
    Ok(())
}

/// Transitive closure of a link set, by reachability from every source.
fn closure_of(links: &[Pair]) -> BTreeSet<Pair> {
    let mut successors: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for pair in links {
        successors
            .entry(pair.src.as_str())
            .or_default()
            .insert(pair.tgt.as_str());
    }

    let mut closure = BTreeSet::new();
    for &start in successors.keys() {
        let mut reached: BTreeSet<&str> = BTreeSet::new();
        let mut pending: Vec<&str> = vec![start];
        while let Some(node) = pending.pop() {
            let Some(next) = successors.get(node) else {
                continue;
            };
            for &tgt in next {
                if reached.insert(tgt) {
                    pending.push(tgt);
                }
            }
        }
        closure.extend(reached.into_iter().map(|tgt| Pair::new(start, tgt)));
    }
    closure
}
