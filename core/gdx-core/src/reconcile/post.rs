//! Reconcile driver — runs the state machine and applies the outcome at `Done`.

use crate::engine::Geodatabase;
use crate::engine::cursor::Projection;
use crate::engine::index::check_unique;
use crate::error::{GdxError, GdxResult};
use crate::reconcile::conflict::{Conflict, Verdict, classify, field_names, same_state};
use crate::reconcile::diff::{TableDiff, diff_table};
use crate::reconcile::{ConflictPolicy, PartialPost, ReconcileOptions, ReconcileResult, ReconcileState};
use crate::schema::{RowId, TableDefinition, TableId};
use crate::storage::delta_store::{Change, Record};
use crate::storage::journal::JournalWrite;
use crate::transaction::chain::PinSet;
use crate::transaction::{BaseEntry, ShadowChain, SnapshotGuard, VersionId};
use ahash::{AHashMap, AHashSet};
use std::collections::BTreeMap;
use tracing::{debug, trace};

/// Final child state of one divergent row after resolution.
#[derive(Debug)]
struct Outcome {
    table: TableId,
    row_id: RowId,
    state: Option<Record>,
    /// Child edit that a post may copy into the target.
    postable: bool,
    target: Option<Record>,
}

pub(crate) struct Reconciler<'a> {
    db: &'a Geodatabase,
    child: VersionId,
    target: VersionId,
    options: &'a ReconcileOptions,
    state: ReconcileState,
    snapshot: Option<SnapshotGuard>,
    child_chain: Option<ShadowChain>,
    diffs: Vec<TableDiff>,
    /// (diff index, row index, verdict) of rows changed on both sides
    detected: Vec<(usize, usize, Verdict)>,
    conflict_count: usize,
    outcomes: Vec<Outcome>,
    child_writes: Vec<JournalWrite>,
    post_writes: Vec<JournalWrite>,
    pins: PinSet,
    resolved: Vec<Conflict>,
    unresolved: Vec<Conflict>,
    merged_rows: usize,
    /// Post requested but refused over unresolved conflicts.
    post_refused: bool,
}

impl<'a> Reconciler<'a> {
    pub(crate) fn new(
        db: &'a Geodatabase,
        child: VersionId,
        target: VersionId,
        options: &'a ReconcileOptions,
    ) -> Self {
        Self {
            db,
            child,
            target,
            options,
            state: ReconcileState::Start,
            snapshot: None,
            child_chain: None,
            diffs: Vec::new(),
            detected: Vec::new(),
            conflict_count: 0,
            outcomes: Vec::new(),
            child_writes: Vec::new(),
            post_writes: Vec::new(),
            pins: PinSet::new(),
            resolved: Vec::new(),
            unresolved: Vec::new(),
            merged_rows: 0,
            post_refused: false,
        }
    }

    /// Drives the machine to `Done`, or stops early on abort or error.
    pub(crate) fn run(mut self) -> GdxResult<ReconcileResult> {
        // the catalog must not change under a running reconcile
        let _gate = self.db.ddl_gate.read();
        loop {
            let next = match self.state {
                ReconcileState::Start => {
                    self.snapshot = Some(self.db.snapshots.acquire(&self.db.oracle));
                    ReconcileState::DiffCompute
                }
                ReconcileState::DiffCompute => {
                    self.compute_diffs()?;
                    ReconcileState::ConflictDetect
                }
                ReconcileState::ConflictDetect => {
                    self.detect();
                    if self.options.abort_if_conflicts && self.conflict_count > 0 {
                        return Ok(self.aborted());
                    }
                    ReconcileState::ConflictResolve
                }
                ReconcileState::ConflictResolve => {
                    self.resolve();
                    if !self.options.posting() {
                        ReconcileState::Done
                    } else if self.unresolved.is_empty() {
                        ReconcileState::Posting
                    } else {
                        // the reconcile part still completes; only the post is refused
                        self.post_refused = true;
                        ReconcileState::Done
                    }
                }
                ReconcileState::Posting => {
                    self.plan_post()?;
                    ReconcileState::Done
                }
                ReconcileState::Done => {
                    self.apply()?;
                    if self.post_refused {
                        return Err(GdxError::Conflict {
                            version: self.db.version_label(self.child),
                            count: self.unresolved.len(),
                        });
                    }
                    return Ok(self.finished());
                }
            };
            debug!(from = %self.state, to = %next, "reconcile state");
            self.state = next;
        }
    }

    fn snapshot_generation(&self) -> GdxResult<crate::transaction::Generation> {
        self.snapshot
            .as_ref()
            .map(SnapshotGuard::generation)
            .ok_or_else(|| GdxError::Storage("reconcile snapshot missing".to_string()))
    }

    fn child_chain(&self) -> GdxResult<&ShadowChain> {
        self.child_chain
            .as_ref()
            .ok_or_else(|| GdxError::Storage("reconcile chain missing".to_string()))
    }

    // ════════════════════════════════════════════
    // DiffCompute
    // ════════════════════════════════════════════

    fn compute_diffs(&mut self) -> GdxResult<()> {
        let at = self.snapshot_generation()?;
        let child_chain = self.db.graph.chain(self.child, at)?;
        let target_chain = self.db.graph.chain(self.target, at)?;
        let catalog = self.db.catalog();
        let threshold = self.db.config.parallel_diff_threshold;
        for table in catalog.tables() {
            let Some(map) = self.db.store.table(table.id) else {
                continue;
            };
            let diff = diff_table(table.clone(), &map, &child_chain, &target_chain, threshold);
            if !diff.rows.is_empty() {
                trace!(table = %table.name, rows = diff.rows.len(), "table diverged");
                self.diffs.push(diff);
            }
        }
        self.child_chain = Some(child_chain);
        Ok(())
    }

    // ════════════════════════════════════════════
    // ConflictDetect / ConflictResolve
    // ════════════════════════════════════════════

    fn detect(&mut self) {
        for (d, diff) in self.diffs.iter().enumerate() {
            for (r, row) in diff.rows.iter().enumerate() {
                if row.child_changed && row.target_changed {
                    let verdict = classify(
                        self.options.detection,
                        row.ancestor.as_ref(),
                        row.child.as_ref(),
                        row.target.as_ref(),
                    );
                    if matches!(verdict, Verdict::Conflict { .. }) {
                        self.conflict_count += 1;
                    }
                    self.detected.push((d, r, verdict));
                }
            }
        }
    }

    fn report(table: &TableDefinition, row: &crate::reconcile::diff::RowDiff, verdict: &Verdict) -> Option<Conflict> {
        let Verdict::Conflict { kind, fields } = verdict else {
            return None;
        };
        let projection = Projection::all(table);
        let to_row = |state: &Option<Record>| {
            state
                .as_ref()
                .map(|record| projection.row(table, row.row_id, record))
        };
        Some(Conflict {
            table: table.name.clone(),
            row_id: row.row_id,
            kind: *kind,
            ancestor: to_row(&row.ancestor),
            parent: to_row(&row.target),
            child: to_row(&row.child),
            changed_fields: field_names(table, fields),
        })
    }

    fn aborted(self) -> ReconcileResult {
        let unresolved: Vec<Conflict> = self
            .detected
            .iter()
            .filter_map(|(d, r, v)| {
                let diff = &self.diffs[*d];
                Self::report(&diff.table, &diff.rows[*r], v)
            })
            .collect();
        ReconcileResult {
            conflicts: unresolved.len(),
            unresolved,
            resolved: Vec::new(),
            success: false,
            posted: false,
            posted_rows: 0,
            merged_rows: 0,
            state: ReconcileState::ConflictDetect,
        }
    }

    fn child_write(&mut self, table: TableId, row_id: RowId, state: Option<Record>) {
        self.child_writes.push(JournalWrite {
            table,
            version: self.child,
            row_id,
            change: Change::from_state(state),
        });
        self.merged_rows += 1;
    }

    fn resolve(&mut self) {
        let verdicts: AHashMap<(usize, usize), Verdict> = std::mem::take(&mut self.detected)
            .into_iter()
            .map(|(d, r, v)| ((d, r), v))
            .collect();
        let diffs = std::mem::take(&mut self.diffs);
        for (d, diff) in diffs.iter().enumerate() {
            let table = diff.id();
            for (r, row) in diff.rows.iter().enumerate() {
                let mut outcome = Outcome {
                    table,
                    row_id: row.row_id,
                    state: row.child.clone(),
                    postable: row.child_changed,
                    target: row.target.clone(),
                };
                match verdicts.get(&(d, r)) {
                    None if row.child_changed => {}
                    None => {
                        // target-only change; a child delta would mask it
                        if row.in_child_layer {
                            self.child_write(table, row.row_id, row.target.clone());
                        }
                        outcome.state = row.target.clone();
                    }
                    Some(Verdict::Agree) => {}
                    Some(Verdict::Merged(record)) => {
                        self.child_write(table, row.row_id, Some(record.clone()));
                        outcome.state = Some(record.clone());
                    }
                    Some(verdict @ Verdict::Conflict { .. }) => {
                        let Some(conflict) = Self::report(&diff.table, row, verdict) else {
                            continue;
                        };
                        match self.options.policy {
                            ConflictPolicy::FavorEditVersion => self.resolved.push(conflict),
                            ConflictPolicy::FavorTargetVersion => {
                                self.child_write(table, row.row_id, row.target.clone());
                                outcome.state = row.target.clone();
                                outcome.postable = false;
                                self.resolved.push(conflict);
                            }
                            ConflictPolicy::Continue => {
                                self.pins.insert((table, row.row_id), row.base);
                                self.unresolved.push(conflict);
                            }
                        }
                    }
                }
                self.outcomes.push(outcome);
            }
        }
        self.diffs = diffs;
    }

    // ════════════════════════════════════════════
    // Posting
    // ════════════════════════════════════════════

    /// Child state of a row after resolution.
    fn final_state(&self, table: &TableDefinition, row_id: RowId) -> GdxResult<Option<Record>> {
        if let Some(outcome) = self
            .outcomes
            .iter()
            .find(|o| o.table == table.id && o.row_id == row_id)
        {
            return Ok(outcome.state.clone());
        }
        let Some(map) = self.db.store.table(table.id) else {
            return Ok(None);
        };
        Ok(self.child_chain()?.state(&map, table.id, row_id))
    }

    /// Per-table (rows, deleted) selections, validated against the child.
    fn selections(
        &self,
        partial: &[PartialPost],
    ) -> GdxResult<AHashMap<TableId, (AHashSet<RowId>, AHashSet<RowId>)>> {
        let catalog = self.db.catalog();
        let mut out: AHashMap<TableId, (AHashSet<RowId>, AHashSet<RowId>)> = AHashMap::new();
        for selection in partial {
            let table = catalog.require_table(&selection.table)?;
            let entry = out.entry(table.id).or_default();
            entry.0.extend(selection.rows.iter().copied());
            entry.1.extend(selection.deleted.iter().copied());
        }
        for (id, (rows, deleted)) in &out {
            let Some(table) = catalog.table(*id) else {
                continue;
            };
            if let Some(row) = rows.intersection(deleted).min() {
                return Err(GdxError::Validation(format!(
                    "row {} of '{}' is both selected for post and listed as deleted",
                    row, table.name
                )));
            }
            for row in rows {
                if self.final_state(table, *row)?.is_none() {
                    return Err(GdxError::Validation(format!(
                        "row {} of '{}' is selected for post but deleted in the child",
                        row, table.name
                    )));
                }
            }
            for row in deleted {
                if self.final_state(table, *row)?.is_some() {
                    return Err(GdxError::Validation(format!(
                        "row {} of '{}' is listed as deleted but still exists in the child",
                        row, table.name
                    )));
                }
            }
        }
        Ok(out)
    }

    fn plan_post(&mut self) -> GdxResult<()> {
        let selections = match &self.options.partial_post {
            Some(partial) => Some(self.selections(partial)?),
            None => None,
        };
        for outcome in &self.outcomes {
            if !outcome.postable || same_state(outcome.state.as_ref(), outcome.target.as_ref()) {
                continue;
            }
            if let Some(selections) = &selections {
                let Some((rows, deleted)) = selections.get(&outcome.table) else {
                    continue;
                };
                let selected = match outcome.state {
                    Some(_) => rows.contains(&outcome.row_id),
                    None => deleted.contains(&outcome.row_id),
                };
                if !selected {
                    continue;
                }
            }
            self.post_writes.push(JournalWrite {
                table: outcome.table,
                version: self.target,
                row_id: outcome.row_id,
                change: Change::from_state(outcome.state.clone()),
            });
        }
        self.check_target_unique()
    }

    /// Unique indexes of the target must hold after the post writes land.
    fn check_target_unique(&self) -> GdxResult<()> {
        let at = self.snapshot_generation()?;
        let catalog = self.db.catalog();
        let mut posted: BTreeMap<TableId, Vec<&JournalWrite>> = BTreeMap::new();
        for write in &self.post_writes {
            posted.entry(write.table).or_default().push(write);
        }
        for (table_id, writes) in posted {
            let Some(table) = catalog.table(table_id) else {
                continue;
            };
            if !table.indexes.iter().any(|i| i.unique) {
                continue;
            }
            let mut state: BTreeMap<RowId, Record> = self
                .db
                .visible_records(self.target, table_id, at)?
                .into_iter()
                .collect();
            let mut touched = AHashSet::new();
            for write in writes {
                touched.insert(write.row_id);
                match &write.change {
                    Change::Upsert(record) => {
                        state.insert(write.row_id, record.clone());
                    }
                    Change::Delete => {
                        state.remove(&write.row_id);
                    }
                }
            }
            check_unique(table, state.iter().map(|(id, r)| (*id, r)), Some(&touched))?;
        }
        Ok(())
    }

    // ════════════════════════════════════════════
    // Done
    // ════════════════════════════════════════════

    fn apply(&mut self) -> GdxResult<()> {
        let at = self.snapshot_generation()?;
        let current_pins = self
            .db
            .graph
            .base_entry(self.child, at)?
            .map(|e| e.pins.clone())
            .unwrap_or_default();
        let target_moved = self
            .diffs
            .iter()
            .any(|d| d.rows.iter().any(|r| r.target_changed));
        if self.child_writes.is_empty()
            && self.post_writes.is_empty()
            && !target_moved
            && current_pins == self.pins
        {
            debug!(version = %self.child, "reconcile found nothing to apply");
            return Ok(());
        }

        let posted = self.options.posting() && !self.post_refused;
        let mut writes = std::mem::take(&mut self.child_writes);
        writes.extend(self.post_writes.iter().cloned());

        let _commit = self.db.commit_lock.lock();
        let generation = self.db.oracle.next();
        let entry = BaseEntry {
            since: generation,
            base: if posted { generation } else { at },
            pins: std::mem::take(&mut self.pins),
        };
        self.db
            .write_generation(generation, writes, vec![(self.child, entry)])?;
        debug!(%generation, posted, "reconcile applied");
        Ok(())
    }

    fn finished(self) -> ReconcileResult {
        let posted = self.options.posting();
        ReconcileResult {
            conflicts: self.resolved.len() + self.unresolved.len(),
            success: self.unresolved.is_empty(),
            unresolved: self.unresolved,
            resolved: self.resolved,
            posted,
            posted_rows: self.post_writes.len(),
            merged_rows: self.merged_rows,
            state: ReconcileState::Done,
        }
    }
}
