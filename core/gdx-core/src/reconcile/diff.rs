//! Diff computation — ancestor, child and target state of every divergent row.
//!
//! ```text
//! A = child chain skipping its own link   (parent as of the child's base, pins honored)
//! C = child chain                          (child at the reconcile snapshot)
//! T = target chain                         (parent at the reconcile snapshot)
//! ```
//!
//! Only rows with a delta in the child layer, or with a target-chain delta
//! newer than the child's base, can differ; everything else is skipped
//! without resolving.

use crate::schema::{RowId, TableDefinition, TableId};
use crate::reconcile::conflict::same_state;
use crate::storage::delta_store::{Record, TableDeltas, rows_in_layer};
use crate::transaction::{Generation, ShadowChain};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::sync::Arc;

/// Three-way state of one candidate row.
#[derive(Debug, Clone)]
pub(crate) struct RowDiff {
    pub(crate) row_id: RowId,
    pub(crate) ancestor: Option<Record>,
    pub(crate) child: Option<Record>,
    pub(crate) target: Option<Record>,
    /// The child layer holds a delta for this row.
    pub(crate) in_child_layer: bool,
    pub(crate) child_changed: bool,
    pub(crate) target_changed: bool,
    /// Parent cutoff the ancestor state was read at.
    pub(crate) base: Generation,
}

#[derive(Debug)]
pub(crate) struct TableDiff {
    pub(crate) table: Arc<TableDefinition>,
    pub(crate) rows: Vec<RowDiff>,
}

impl TableDiff {
    pub(crate) fn id(&self) -> TableId {
        self.table.id
    }
}

/// Rows that may have diverged between `child` and `target`.
fn candidates(map: &TableDeltas, child: &ShadowChain, target: &ShadowChain) -> (BTreeSet<RowId>, BTreeSet<RowId>) {
    let snapshot = child.snapshot();
    let own = rows_in_layer(map, child.version(), |g| g <= snapshot);
    let mut all = own.clone();
    for (i, link) in target.links.iter().enumerate() {
        let lower = child
            .links
            .get(i + 1)
            .filter(|l| l.version == link.version)
            .map_or(Generation::ZERO, |l| l.cutoff);
        if lower >= link.cutoff {
            continue;
        }
        all.extend(rows_in_layer(map, link.version, |g| g > lower && g <= link.cutoff));
    }
    (own, all)
}

fn diff_row(
    map: &TableDeltas,
    table: TableId,
    row_id: RowId,
    child: &ShadowChain,
    target: &ShadowChain,
    in_child_layer: bool,
) -> Option<RowDiff> {
    let ancestor = child.state_from(map, table, row_id, 1);
    let child_state = child.state(map, table, row_id);
    let target_state = target.state(map, table, row_id);
    let child_changed = in_child_layer && !same_state(child_state.as_ref(), ancestor.as_ref());
    let target_changed = !same_state(target_state.as_ref(), ancestor.as_ref());
    if !child_changed && !target_changed {
        return None;
    }
    let base = child
        .cutoffs(table, row_id)
        .get(1)
        .copied()
        .unwrap_or(Generation::ZERO);
    Some(RowDiff {
        row_id,
        ancestor,
        child: child_state,
        target: target_state,
        in_child_layer,
        child_changed,
        target_changed,
        base,
    })
}

/// Divergent rows of one table, in row-id order.
///
/// Runs on the rayon pool once the candidate count reaches `parallel_threshold`.
pub(crate) fn diff_table(
    table: Arc<TableDefinition>,
    map: &TableDeltas,
    child: &ShadowChain,
    target: &ShadowChain,
    parallel_threshold: usize,
) -> TableDiff {
    let (own, all) = candidates(map, child, target);
    let id = table.id;
    let ids: Vec<RowId> = all.into_iter().collect();
    let rows: Vec<RowDiff> = if ids.len() >= parallel_threshold.max(1) {
        ids.par_iter()
            .filter_map(|row_id| diff_row(map, id, *row_id, child, target, own.contains(row_id)))
            .collect()
    } else {
        ids.iter()
            .filter_map(|row_id| diff_row(map, id, *row_id, child, target, own.contains(row_id)))
            .collect()
    };
    TableDiff { table, rows }
}
