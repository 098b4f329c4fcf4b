//! Reconcile / Post — 자식 버전과 부모 버전의 병합
//!
//! A reconcile is an explicit state machine:
//!
//! ```text
//! Start → DiffCompute → ConflictDetect → ConflictResolve → (Posting) → Done
//! ```
//!
//! Nothing is written before `Done`; child resolution writes, post writes
//! and the child's new base are appended as one generation. Dropping a
//! reconcile midway therefore leaves no trace.

pub mod conflict;
pub(crate) mod diff;
pub(crate) mod post;

pub use conflict::{Conflict, ConflictKind};

use crate::engine::Geodatabase;
use crate::error::{GdxError, GdxResult};
use crate::schema::RowId;
use crate::transaction::{LeaseHolder, VersionId};
use std::fmt;
use tracing::{info, instrument};

/// Granularity of conflict detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DetectionMode {
    /// Any differing edit of the same row conflicts.
    #[default]
    ByRow,
    /// Only edits of the same field conflict; disjoint edits are merged.
    ByColumn,
}

/// How detected conflicts are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictPolicy {
    /// Child edits win.
    #[default]
    FavorEditVersion,
    /// Target edits win; the child takes the target's state.
    FavorTargetVersion,
    /// Leave conflicts unresolved; they are reported again next time.
    Continue,
}

/// Rows of one table to post; everything else the child changed stays unposted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartialPost {
    pub table: String,
    /// Inserted or updated rows to copy into the target.
    pub rows: Vec<RowId>,
    /// Rows deleted in the child whose deletion should be posted.
    pub deleted: Vec<RowId>,
}

impl PartialPost {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    pub fn rows(mut self, rows: impl IntoIterator<Item = RowId>) -> Self {
        self.rows.extend(rows);
        self
    }

    pub fn deleted(mut self, rows: impl IntoIterator<Item = RowId>) -> Self {
        self.deleted.extend(rows);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Merge target; the parent when unset.
    pub target: Option<VersionId>,
    pub detection: DetectionMode,
    pub policy: ConflictPolicy,
    /// Stop after detection when any conflict exists.
    pub abort_if_conflicts: bool,
    /// Post the reconciled child into the target.
    pub post: bool,
    /// Restrict the post to these selections; implies `post`.
    pub partial_post: Option<Vec<PartialPost>>,
}

impl ReconcileOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn target(mut self, target: VersionId) -> Self {
        self.target = Some(target);
        self
    }

    pub fn detection(mut self, detection: DetectionMode) -> Self {
        self.detection = detection;
        self
    }

    pub fn policy(mut self, policy: ConflictPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn abort_if_conflicts(mut self, abort: bool) -> Self {
        self.abort_if_conflicts = abort;
        self
    }

    pub fn post(mut self, post: bool) -> Self {
        self.post = post;
        self
    }

    pub fn partial_post(mut self, selections: impl IntoIterator<Item = PartialPost>) -> Self {
        self.partial_post = Some(selections.into_iter().collect());
        self
    }

    pub(crate) fn posting(&self) -> bool {
        self.post || self.partial_post.is_some()
    }
}

/// Reconcile progress; the last state reached is reported in the result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ReconcileState {
    Start,
    DiffCompute,
    ConflictDetect,
    ConflictResolve,
    Posting,
    Done,
}

impl fmt::Display for ReconcileState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReconcileState::Start => "start",
            ReconcileState::DiffCompute => "diff-compute",
            ReconcileState::ConflictDetect => "conflict-detect",
            ReconcileState::ConflictResolve => "conflict-resolve",
            ReconcileState::Posting => "posting",
            ReconcileState::Done => "done",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileResult {
    /// Number of conflicts detected.
    pub conflicts: usize,
    pub unresolved: Vec<Conflict>,
    pub resolved: Vec<Conflict>,
    /// No unresolved conflicts remain and nothing was aborted.
    pub success: bool,
    pub posted: bool,
    /// Rows written into the target by the post.
    pub posted_rows: usize,
    /// Rows rewritten in the child (target wins, column merges, target updates of child-held rows).
    pub merged_rows: usize,
    pub state: ReconcileState,
}

impl ReconcileResult {
    pub fn has_conflicts(&self) -> bool {
        self.conflicts > 0
    }
}

impl Geodatabase {
    /// 자식 버전을 대상 버전(기본: 부모)과 reconcile하고, 옵션에 따라 post합니다.
    ///
    /// Takes the child's writer lease for the whole run, plus the target's
    /// when posting. Fails with `NotAnAncestor` when the target is not an
    /// ancestor of `version`, and with `Conflict` when a post would leave
    /// conflicts unresolved.
    #[instrument(skip(self, options), fields(policy = ?options.policy, post = options.posting()))]
    pub fn reconcile(&self, version: VersionId, options: ReconcileOptions) -> GdxResult<ReconcileResult> {
        self.require_version(version)?;
        let parent = self.graph.parent(version)?.ok_or_else(|| {
            GdxError::unsupported("reconcile", "DEFAULT has no parent to reconcile with")
        })?;
        let target = options.target.unwrap_or(parent);
        self.require_version(target)?;
        if target != parent {
            return Err(if self.graph.is_ancestor(target, version)? {
                GdxError::unsupported(
                    "reconcile",
                    format!(
                        "'{}' is not the direct parent of '{}'",
                        self.version_label(target),
                        self.version_label(version)
                    ),
                )
            } else {
                GdxError::NotAnAncestor {
                    version: self.version_label(version),
                    target: self.version_label(target),
                }
            });
        }

        let child_label = self.version_label(version);
        let child_lease = self
            .leases
            .acquire(version, LeaseHolder::Reconcile, &child_label)?;
        let target_lease = if options.posting() {
            Some(self.leases.acquire(
                target,
                LeaseHolder::Post,
                &self.version_label(target),
            )?)
        } else {
            None
        };

        let result = post::Reconciler::new(self, version, target, &options).run()?;
        info!(
            version = %child_label,
            conflicts = result.conflicts,
            unresolved = result.unresolved.len(),
            posted_rows = result.posted_rows,
            merged_rows = result.merged_rows,
            state = %result.state,
            "reconcile finished"
        );
        drop(target_lease);
        drop(child_lease);

        if result.posted && self.config.auto_compact {
            self.compact()?;
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::QueryFilter;
    use crate::schema::{FieldDescription, IndexDescription, TableDescription, Value};
    use crate::transaction::VersionAccess;

    const D: VersionId = VersionId::DEFAULT;

    fn setup() -> GdxResult<(Geodatabase, VersionId, RowId)> {
        let db = Geodatabase::open_in_memory()?;
        db.create_table(
            TableDescription::new("Trees")
                .field(FieldDescription::text("NAME", 32))
                .field(FieldDescription::text("STATUS", 16)),
        )?;
        let row = db.write_row(D, "Trees", None, [("NAME", "Pine"), ("STATUS", "healthy")])?;
        let child = db.create_version(D, "survey", VersionAccess::Public)?;
        Ok((db, child, row))
    }

    fn name(db: &Geodatabase, v: VersionId, row: RowId) -> GdxResult<Option<Value>> {
        Ok(db
            .try_get_row(v, "Trees", row)?
            .and_then(|r| r.get("NAME").cloned()))
    }

    #[test]
    fn target_must_be_the_parent() -> GdxResult<()> {
        let (db, child, _) = setup()?;
        let grandchild = db.create_version(child, "detail", VersionAccess::Public)?;
        let sibling = db.create_version(D, "other", VersionAccess::Public)?;

        let err = db
            .reconcile(grandchild, ReconcileOptions::new().target(D))
            .unwrap_err();
        assert!(matches!(err, GdxError::UnsupportedOperation { .. }));
        let err = db
            .reconcile(child, ReconcileOptions::new().target(sibling))
            .unwrap_err();
        assert!(matches!(err, GdxError::NotAnAncestor { .. }));
        assert!(db.reconcile(D, ReconcileOptions::new()).is_err());
        Ok(())
    }

    #[test]
    fn target_only_changes_flow_into_the_child() -> GdxResult<()> {
        let (db, child, row) = setup()?;
        let added = db.write_row(D, "Trees", None, [("NAME", "Fir")])?;
        assert_eq!(name(&db, child, added)?, None);

        let result = db.reconcile(child, ReconcileOptions::new())?;
        assert!(result.success);
        assert_eq!(result.conflicts, 0);
        assert!(!result.posted);
        assert_eq!(result.state, ReconcileState::Done);
        assert_eq!(name(&db, child, added)?, Some(Value::from("Fir")));
        assert_eq!(name(&db, child, row)?, Some(Value::from("Pine")));
        Ok(())
    }

    #[test]
    fn abort_if_conflicts_applies_nothing() -> GdxResult<()> {
        let (db, child, row) = setup()?;
        db.write_row(D, "Trees", Some(row), [("NAME", "Oak")])?;
        db.write_row(child, "Trees", Some(row), [("NAME", "Maple")])?;
        let before = db.current_generation();

        let result = db.reconcile(
            child,
            ReconcileOptions::new().abort_if_conflicts(true).post(true),
        )?;
        assert!(!result.success);
        assert_eq!(result.conflicts, 1);
        assert_eq!(result.state, ReconcileState::ConflictDetect);
        assert_eq!(db.current_generation(), before);
        assert_eq!(name(&db, D, row)?, Some(Value::from("Oak")));
        assert_eq!(name(&db, child, row)?, Some(Value::from("Maple")));
        Ok(())
    }

    #[test]
    fn favor_target_rewrites_the_child() -> GdxResult<()> {
        let (db, child, row) = setup()?;
        db.write_row(D, "Trees", Some(row), [("NAME", "Oak")])?;
        db.write_row(child, "Trees", Some(row), [("NAME", "Maple")])?;

        let result = db.reconcile(
            child,
            ReconcileOptions::new().policy(ConflictPolicy::FavorTargetVersion),
        )?;
        assert!(result.success);
        assert_eq!(result.resolved.len(), 1);
        assert_eq!(result.merged_rows, 1);
        assert_eq!(name(&db, child, row)?, Some(Value::from("Oak")));

        // nothing left to do
        let again = db.reconcile(child, ReconcileOptions::new().post(true))?;
        assert_eq!(again.conflicts, 0);
        assert_eq!(again.posted_rows, 0);
        Ok(())
    }

    #[test]
    fn by_column_merges_disjoint_fields() -> GdxResult<()> {
        let (db, child, row) = setup()?;
        db.write_row(D, "Trees", Some(row), [("STATUS", "felled")])?;
        db.write_row(child, "Trees", Some(row), [("NAME", "Maple")])?;

        let by_row = db.reconcile(
            child,
            ReconcileOptions::new()
                .detection(DetectionMode::ByRow)
                .abort_if_conflicts(true),
        )?;
        assert_eq!(by_row.conflicts, 1);
        assert_eq!(by_row.unresolved[0].changed_fields, vec!["NAME", "STATUS"]);

        let result = db.reconcile(
            child,
            ReconcileOptions::new()
                .detection(DetectionMode::ByColumn)
                .post(true),
        )?;
        assert_eq!(result.conflicts, 0);
        assert_eq!(result.merged_rows, 1);
        assert_eq!(result.posted_rows, 1);
        let merged = db.get_row(D, "Trees", row)?;
        assert_eq!(merged.get("NAME"), Some(&Value::from("Maple")));
        assert_eq!(merged.get("STATUS"), Some(&Value::from("felled")));
        Ok(())
    }

    #[test]
    fn delete_against_update_is_classified() -> GdxResult<()> {
        let (db, child, row) = setup()?;
        db.write_row(D, "Trees", Some(row), [("NAME", "Oak")])?;
        db.delete_row(child, "Trees", row)?;

        let result = db.reconcile(child, ReconcileOptions::new().policy(ConflictPolicy::Continue))?;
        assert!(!result.success);
        assert_eq!(result.unresolved[0].kind, ConflictKind::DeleteUpdate);
        assert!(result.unresolved[0].child.is_none());

        let err = db
            .reconcile(child, ReconcileOptions::new().post(true).policy(ConflictPolicy::Continue))
            .unwrap_err();
        assert!(matches!(err, GdxError::Conflict { count: 1, .. }));

        let result = db.reconcile(child, ReconcileOptions::new().post(true))?;
        assert!(result.success);
        assert!(db.try_get_row(D, "Trees", row)?.is_none());
        Ok(())
    }

    #[test]
    fn refused_post_still_merges_target_rows() -> GdxResult<()> {
        let (db, child, row) = setup()?;
        db.write_row(D, "Trees", Some(row), [("NAME", "Oak")])?;
        let fir = db.write_row(D, "Trees", None, [("NAME", "Fir")])?;
        db.write_row(child, "Trees", Some(row), [("NAME", "Maple")])?;
        let elm = db.write_row(child, "Trees", None, [("NAME", "Elm")])?;

        let err = db
            .reconcile(child, ReconcileOptions::new().policy(ConflictPolicy::Continue).post(true))
            .unwrap_err();
        assert!(matches!(err, GdxError::Conflict { count: 1, .. }));

        // the reconcile half completed
        assert_eq!(name(&db, child, fir)?, Some(Value::from("Fir")));
        assert_eq!(name(&db, child, row)?, Some(Value::from("Maple")));
        // nothing reached the parent
        assert_eq!(name(&db, D, row)?, Some(Value::from("Oak")));
        assert_eq!(name(&db, D, elm)?, None);

        // the pinned conflict is detected again
        let result = db.reconcile(child, ReconcileOptions::new().policy(ConflictPolicy::Continue))?;
        assert_eq!(result.unresolved.len(), 1);
        assert_eq!(result.unresolved[0].row_id, row);
        Ok(())
    }

    #[test]
    fn post_respects_unique_indexes_of_the_target() -> GdxResult<()> {
        let db = Geodatabase::open_in_memory()?;
        db.create_table(
            TableDescription::new("Parcels")
                .field(FieldDescription::text("APN", 12))
                .index(IndexDescription::new("apn_idx", ["APN"]).unique()),
        )?;
        let child = db.create_version(D, "survey", VersionAccess::Public)?;
        db.write_row(D, "Parcels", None, [("APN", "001")])?;
        let dup = db.write_row(child, "Parcels", None, [("APN", "001")])?;
        let generation = db.current_generation();

        let err = db
            .reconcile(child, ReconcileOptions::new().post(true))
            .unwrap_err();
        assert!(matches!(
            &err,
            GdxError::ConstraintViolation { table, field, .. } if table == "Parcels" && field == "APN"
        ));
        assert_eq!(db.current_generation(), generation);
        let filter = QueryFilter::new().where_clause("APN = '001'");
        assert_eq!(db.count(D, "Parcels", &filter)?, 1);

        // fixing the child lets the post through
        db.write_row(child, "Parcels", Some(dup), [("APN", "002")])?;
        let result = db.reconcile(child, ReconcileOptions::new().post(true))?;
        assert!(result.posted);
        assert_eq!(db.count(D, "Parcels", &QueryFilter::new())?, 2);
        Ok(())
    }

    #[test]
    fn partial_post_selection_is_validated() -> GdxResult<()> {
        let (db, child, row) = setup()?;
        let added = db.write_row(child, "Trees", None, [("NAME", "Elm")])?;
        db.delete_row(child, "Trees", row)?;

        let both = PartialPost::new("Trees").rows([added]).deleted([added]);
        let err = db
            .reconcile(child, ReconcileOptions::new().partial_post([both]))
            .unwrap_err();
        assert!(matches!(err, GdxError::Validation(_)));

        let selected_but_deleted = PartialPost::new("Trees").rows([row]);
        assert!(matches!(
            db.reconcile(child, ReconcileOptions::new().partial_post([selected_but_deleted])),
            Err(GdxError::Validation(_))
        ));

        let deleted_but_present = PartialPost::new("Trees").deleted([added]);
        assert!(matches!(
            db.reconcile(child, ReconcileOptions::new().partial_post([deleted_but_present])),
            Err(GdxError::Validation(_))
        ));

        let missing = PartialPost::new("Shrubs").rows([added]);
        assert!(matches!(
            db.reconcile(child, ReconcileOptions::new().partial_post([missing])),
            Err(GdxError::TableNotFound(_))
        ));

        // failed attempts changed nothing
        assert!(db.try_get_row(D, "Trees", added)?.is_none());
        assert!(db.try_get_row(D, "Trees", row)?.is_some());
        Ok(())
    }

    #[test]
    fn open_session_blocks_reconcile() -> GdxResult<()> {
        let (db, child, _) = setup()?;
        let session = db.begin_edit(child)?;
        assert!(matches!(
            db.reconcile(child, ReconcileOptions::new()),
            Err(GdxError::VersionBusy { .. })
        ));
        session.abort();

        let parent_session = db.begin_edit(D)?;
        assert!(db.reconcile(child, ReconcileOptions::new()).is_ok());
        assert!(matches!(
            db.reconcile(child, ReconcileOptions::new().post(true)),
            Err(GdxError::VersionBusy { .. })
        ));
        parent_session.abort();
        Ok(())
    }
}
