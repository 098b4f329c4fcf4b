//! Schema batch application — swaps the catalog after a successful plan

use crate::engine::Geodatabase;
use crate::engine::index::check_unique;
use crate::error::{GdxError, GdxResult};
use crate::schema::builder::{plan_batch, touched_tables};
use crate::schema::{BuildResult, DdlOp, SchemaBuilder, TableId};
use crate::storage::journal::JournalRecord;
use std::sync::Arc;
use tracing::{info, instrument, warn};

impl Geodatabase {
    /// 스키마 배치 빌더를 생성합니다.
    pub fn schema_builder(&self) -> SchemaBuilder<'_> {
        SchemaBuilder::new(self)
    }

    /// Applies a batch; `Ok(Err(errors))` when planning failed and nothing changed.
    ///
    /// Existing tables the batch rewrites must not be registered by an open
    /// edit session, else the whole batch fails with `SchemaLocked`.
    pub(crate) fn apply_schema_ops(
        &self,
        builder: u64,
        ops: &[DdlOp],
    ) -> GdxResult<Result<Vec<TableId>, Vec<GdxError>>> {
        let _gate = self.ddl_gate.write();
        let current = self.catalog();

        for table in touched_tables(&current, ops) {
            if self.usage.is_in_use(table.id) {
                return Err(GdxError::SchemaLocked {
                    table: table.name.clone(),
                });
            }
        }

        let plan = plan_batch(&current, builder, ops);
        if !plan.errors.is_empty() {
            warn!(errors = plan.errors.len(), "schema batch rejected");
            return Ok(Err(plan.errors));
        }

        // dropped or renamed tables reached through tokens are only known after planning
        for id in plan.dropped.iter().copied() {
            if self.usage.is_in_use(id) {
                let name = current
                    .table(id)
                    .map(|t| t.name.clone())
                    .unwrap_or_else(|| id.to_string());
                return Err(GdxError::SchemaLocked { table: name });
            }
        }

        let _commit = self.commit_lock.lock();
        if !plan.new_unique.is_empty() {
            let snapshot = self.oracle.read();
            let versions = self.graph.list();
            for (table_id, _) in &plan.new_unique {
                let Some(table) = plan.catalog.table(*table_id) else {
                    continue;
                };
                for info in &versions {
                    let rows = self.visible_records(info.id, *table_id, snapshot)?;
                    if let Err(e) = check_unique(table, rows.iter().map(|(id, r)| (*id, r)), None) {
                        return Ok(Err(vec![e]));
                    }
                }
            }
        }

        // the saved catalog is the commit point; replay ignores deltas of
        // tables it no longer lists
        let next = Arc::new(plan.catalog);
        self.persist_catalog(&next)?;
        for id in &plan.created {
            self.store.ensure_table(*id);
        }
        *self.catalog.write() = next;

        for id in &plan.dropped {
            let removed = self.store.drop_table(*id);
            self.row_counters.remove(id);
            self.journal_append(&JournalRecord::DropTable { table: *id })?;
            info!(table = %id, deltas = removed, "table dropped");
        }
        info!(
            ops = ops.len(),
            created = plan.created.len(),
            dropped = plan.dropped.len(),
            "schema batch applied"
        );
        Ok(Ok(plan.created))
    }

    #[instrument(skip(self, ops))]
    pub(crate) fn apply_schema_batch(&self, builder: u64, ops: &[DdlOp]) -> GdxResult<BuildResult> {
        Ok(match self.apply_schema_ops(builder, ops)? {
            Ok(_) => BuildResult {
                success: true,
                errors: Vec::new(),
            },
            Err(errors) => BuildResult {
                success: false,
                errors: errors.iter().map(ToString::to_string).collect(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::Geodatabase;
    use crate::error::GdxError;
    use crate::schema::{Domain, FieldDescription, FieldType, IndexDescription, TableDescription, Value};
    use crate::transaction::VersionId;

    fn db() -> Geodatabase {
        let db = Geodatabase::open_in_memory().unwrap();
        db.create_table(TableDescription::new("Hydrants").field(FieldDescription::text("CODE", 8)))
            .unwrap();
        db
    }

    #[test]
    fn failed_batch_changes_nothing() {
        let db = db();
        let mut builder = db.schema_builder();
        builder.add_field("Hydrants", FieldDescription::integer("PRESSURE"));
        builder.delete_table("NoSuchTable");
        let result = builder.build().unwrap();
        assert!(!result.success);
        assert_eq!(result.errors.len(), 1);
        assert!(db.table_definition("Hydrants").unwrap().field("PRESSURE").is_none());
    }

    #[test]
    fn open_session_locks_its_tables() {
        let db = db();
        let mut session = db.begin_edit(VersionId::DEFAULT).unwrap();
        session.create("Hydrants", [("CODE", "H1")]).unwrap();

        let mut builder = db.schema_builder();
        builder.add_field("Hydrants", FieldDescription::integer("PRESSURE"));
        assert!(matches!(builder.build(), Err(GdxError::SchemaLocked { .. })));

        // other tables are unaffected
        db.create_table(TableDescription::new("Valves")).unwrap();

        session.commit().unwrap();
        let mut builder = db.schema_builder();
        builder.add_field("Hydrants", FieldDescription::integer("PRESSURE"));
        assert!(builder.build().unwrap().success);
    }

    #[test]
    fn delete_table_drops_rows_everywhere() {
        let db = db();
        db.write_row(VersionId::DEFAULT, "Hydrants", None, [("CODE", "H1")])
            .unwrap();
        let child = db
            .create_version(VersionId::DEFAULT, "field", crate::transaction::VersionAccess::Public)
            .unwrap();
        db.write_row(child, "Hydrants", None, [("CODE", "H2")]).unwrap();

        let mut builder = db.schema_builder();
        builder.delete_table("Hydrants");
        assert!(builder.build().unwrap().success);
        assert!(!db.table_exists("Hydrants"));
        assert_eq!(db.store.entry_count(), 0);
    }

    #[test]
    fn dropped_table_stays_dropped_after_reopen() -> crate::error::GdxResult<()> {
        use crate::engine::{DurabilityLevel, GeodatabaseConfig};

        let dir = tempfile::tempdir()?;
        {
            let db = Geodatabase::open_with_config(
                dir.path(),
                GeodatabaseConfig::new().durability(DurabilityLevel::Full),
            )?;
            db.create_table(TableDescription::new("Hydrants").field(FieldDescription::text("CODE", 8)))?;
            db.create_table(TableDescription::new("Valves").field(FieldDescription::text("CODE", 8)))?;
            db.write_row(VersionId::DEFAULT, "Hydrants", None, [("CODE", "H1")])?;
            db.write_row(VersionId::DEFAULT, "Valves", None, [("CODE", "V1")])?;

            let mut builder = db.schema_builder();
            builder.delete_table("Hydrants");
            builder.add_field("Valves", FieldDescription::integer("SIZE"));
            assert!(builder.build()?.success);
        }

        let db = Geodatabase::open(dir.path())?;
        assert!(!db.table_exists("Hydrants"));
        assert!(db.table_definition("Valves")?.field("SIZE").is_some());
        assert_eq!(db.count(VersionId::DEFAULT, "Valves", &Default::default())?, 1);
        Ok(())
    }

    #[test]
    fn unique_index_on_duplicate_data_is_rejected() {
        let db = db();
        for code in ["H1", "H1"] {
            db.write_row(VersionId::DEFAULT, "Hydrants", None, [("CODE", code)])
                .unwrap();
        }
        let mut builder = db.schema_builder();
        builder.create_index("Hydrants", IndexDescription::new("code_idx", ["CODE"]).unique());
        let result = builder.build().unwrap();
        assert!(!result.success);
        assert!(db.table_definition("Hydrants").unwrap().indexes.is_empty());
    }

    #[test]
    fn domains_apply_to_later_writes() {
        let db = db();
        let mut builder = db.schema_builder();
        let domain = builder.create_domain(Domain::Coded {
            name: "HydrantCodes".into(),
            field_type: FieldType::Text,
            codes: vec![(Value::from("H1"), "Type 1".into())],
        });
        builder.add_field("Hydrants", FieldDescription::text("KIND", 8).domain(&domain));
        assert!(builder.build().unwrap().success);

        assert!(db
            .write_row(VersionId::DEFAULT, "Hydrants", None, [("KIND", "H1")])
            .is_ok());
        assert!(matches!(
            db.write_row(VersionId::DEFAULT, "Hydrants", None, [("KIND", "XX")]),
            Err(GdxError::ConstraintViolation { .. })
        ));
    }
}
