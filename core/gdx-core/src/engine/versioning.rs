//! Version management — create, alter, delete and navigate versions

use crate::engine::Geodatabase;
use crate::error::{GdxError, GdxResult};
use crate::storage::journal::JournalRecord;
use crate::transaction::{BaseEntry, LeaseHolder, VersionAccess, VersionId, VersionInfo};
use tracing::{info, instrument};

/// Properties applied by [`Geodatabase::alter_version`]; unset fields stay as they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VersionDescription {
    pub name: Option<String>,
    /// `Some(None)` clears the description.
    pub description: Option<Option<String>>,
    pub access: Option<VersionAccess>,
}

impl VersionDescription {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(Some(description.into()));
        self
    }

    pub fn clear_description(mut self) -> Self {
        self.description = Some(None);
        self
    }

    pub fn access(mut self, access: VersionAccess) -> Self {
        self.access = Some(access);
        self
    }
}

impl Geodatabase {
    /// 부모 버전의 현재 상태를 기준으로 자식 버전을 생성합니다.
    ///
    /// The child sees the parent as of the newest published generation; later
    /// parent edits stay invisible to it until a reconcile.
    #[instrument(skip(self))]
    pub fn create_version(
        &self,
        parent: VersionId,
        name: &str,
        access: VersionAccess,
    ) -> GdxResult<VersionId> {
        self.create_version_with(parent, name, access, None)
    }

    /// [`create_version`](Self::create_version) with a description.
    pub fn create_version_with(
        &self,
        parent: VersionId,
        name: &str,
        access: VersionAccess,
        description: Option<String>,
    ) -> GdxResult<VersionId> {
        let _commit = self.commit_lock.lock();
        let at = self.oracle.read();
        let info = self.graph.create(
            parent,
            name,
            access,
            description,
            self.config.user.clone(),
            at,
        )?;
        let id = info.id;
        if let Err(e) = self.journal_append(&JournalRecord::CreateVersion {
            info,
            base: BaseEntry::new(at, at),
        }) {
            // not durable, so not visible either
            let _ = self.graph.delete(id);
            return Err(e);
        }
        info!(version = %id, path = %self.graph.path(id), base = %at, "version created");
        Ok(id)
    }

    /// Deletes a leaf version and purges its delta layer.
    #[instrument(skip(self))]
    pub fn delete_version(&self, version: VersionId) -> GdxResult<()> {
        if version.is_default() {
            return Err(GdxError::DefaultVersionImmutable {
                operation: "deleted".to_string(),
            });
        }
        self.require_version(version)?;
        let label = self.version_label(version);
        let _lease = self
            .leases
            .acquire(version, LeaseHolder::Maintenance, &label)?;
        let _commit = self.commit_lock.lock();
        let children = self.graph.children(version)?;
        if !children.is_empty() {
            return Err(GdxError::HasChildren {
                version: label,
                children: children.len(),
            });
        }
        self.journal_append(&JournalRecord::DeleteVersion { id: version })?;
        self.graph.delete(version)?;
        let purged = self.store.purge_version(version);
        info!(version = %version, path = %label, purged, "version deleted");
        Ok(())
    }

    /// Renames a version or changes its description or access.
    #[instrument(skip(self, changes))]
    pub fn alter_version(&self, version: VersionId, changes: VersionDescription) -> GdxResult<VersionInfo> {
        self.require_version(version)?;
        let label = self.version_label(version);
        let _lease = self
            .leases
            .acquire(version, LeaseHolder::Maintenance, &label)?;
        let _commit = self.commit_lock.lock();
        let before = self.graph.info(version)?;
        let after = self.graph.alter(
            version,
            changes.name.as_deref(),
            changes.description,
            changes.access,
        )?;
        let record = JournalRecord::AlterVersion {
            id: version,
            name: after.name.clone(),
            description: after.description.clone(),
            access: after.access,
        };
        if let Err(e) = self.journal_append(&record) {
            let _ = self.graph.alter(
                version,
                Some(before.name.as_str()).filter(|_| !version.is_default()),
                Some(before.description),
                Some(before.access),
            );
            return Err(e);
        }
        info!(version = %version, name = %after.name, "version altered");
        Ok(after)
    }

    pub fn version_info(&self, version: VersionId) -> GdxResult<VersionInfo> {
        self.graph.info(version)
    }

    /// Every version, ordered by id.
    pub fn list_versions(&self) -> Vec<VersionInfo> {
        self.graph.list()
    }

    /// Looks up a version by bare name or `DEFAULT/a/b` path (case-insensitive).
    pub fn find_version(&self, name: &str) -> GdxResult<Option<VersionId>> {
        self.graph.find(name)
    }

    pub fn parent(&self, version: VersionId) -> GdxResult<Option<VersionId>> {
        self.graph.parent(version)
    }

    pub fn children(&self, version: VersionId) -> GdxResult<Vec<VersionId>> {
        self.graph.children(version)
    }

    /// `DEFAULT/edits/alice` style path of a version.
    pub fn version_path(&self, version: VersionId) -> GdxResult<String> {
        self.require_version(version)?;
        Ok(self.graph.path(version))
    }
}


#[cfg(test)]
mod chain_equivalence {
    use super::*;
    use crate::engine::GeodatabaseConfig;
    use crate::reconcile::{ConflictPolicy, ReconcileOptions};
    use crate::schema::{FieldDescription, RowId, TableDescription};
    use proptest::prelude::*;

    #[derive(Debug, Clone)]
    enum Step {
        Write { version: usize, row: RowId, value: i64 },
        Delete { version: usize, row: RowId },
        Branch { from: usize },
        Reconcile { version: usize, post: bool, keep_conflicts: bool },
    }

    fn step() -> impl Strategy<Value = Step> {
        prop_oneof![
            4 => (0..4usize, 1..8i64, 0..100i64)
                .prop_map(|(version, row, value)| Step::Write { version, row, value }),
            2 => (0..4usize, 1..8i64).prop_map(|(version, row)| Step::Delete { version, row }),
            1 => (0..4usize).prop_map(|from| Step::Branch { from }),
            2 => (0..4usize, any::<bool>(), any::<bool>()).prop_map(|(version, post, keep_conflicts)| {
                Step::Reconcile { version, post, keep_conflicts }
            }),
        ]
    }

    fn run(db: &Geodatabase, versions: &mut Vec<VersionId>, step: &Step) {
        let pick = |i: usize| versions[i % versions.len()];
        // individual steps may legitimately fail (missing rows, unresolved conflicts)
        match *step {
            Step::Write { version, row, value } => {
                let v = pick(version);
                let exists = matches!(db.try_get_row(v, "Parcels", row), Ok(Some(_)));
                let target = exists.then_some(row);
                let _ = db.write_row(v, "Parcels", target, [("ZONE", value)]);
            }
            Step::Delete { version, row } => {
                let _ = db.delete_row(pick(version), "Parcels", row);
            }
            Step::Branch { from } => {
                let name = format!("v{}", versions.len());
                if let Ok(id) = db.create_version(pick(from), &name, VersionAccess::Public) {
                    versions.push(id);
                }
            }
            Step::Reconcile { version, post, keep_conflicts } => {
                let policy = if keep_conflicts {
                    ConflictPolicy::Continue
                } else {
                    ConflictPolicy::FavorEditVersion
                };
                let _ = db.reconcile(pick(version), ReconcileOptions::new().policy(policy).post(post));
            }
        }
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(48))]

        /// Cached shadow chains resolve exactly like an uncached walk of the graph.
        #[test]
        fn cached_chain_matches_graph_walk(steps in prop::collection::vec(step(), 1..40)) {
            let db = Geodatabase::open_in_memory_with_config(
                GeodatabaseConfig::new().chain_cache_capacity(4),
            ).unwrap();
            db.create_table(TableDescription::new("Parcels").field(FieldDescription::integer("ZONE")))
                .unwrap();
            let table = db.table_definition("Parcels").unwrap().id;
            let mut versions = vec![VersionId::DEFAULT];
            let mut seen = vec![db.current_generation()];
            for step in &steps {
                run(&db, &mut versions, step);
                seen.push(db.current_generation());
            }
            let Some(map) = db.store.table(table) else {
                return Ok(());
            };
            let last_row = db.next_row_id(table);
            for snapshot in seen {
                for &v in &versions {
                    for row in 1..last_row {
                        let cached = db.resolve_change(v, table, row, snapshot).unwrap();
                        let walked = db.graph.resolve_walk(&map, table, row, v, snapshot).unwrap();
                        prop_assert_eq!(cached, walked, "version {} row {} at {}", v, row, snapshot);
                    }
                }
            }
        }
    }
}
