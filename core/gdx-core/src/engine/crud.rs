//! Geodatabase CRUD Operations — table lookup, row reads, searches and single-row edits

use crate::api::filter::QueryFilter;
use crate::api::row::Row;
use crate::engine::Geodatabase;
use crate::engine::cursor::{CompiledFilter, Cursor, Projection};
use crate::error::{GdxError, GdxResult};
use crate::schema::{
    Cardinality, DdlOp, RowId, TableDefinition, TableDescription, TableId, Value,
};
use crate::storage::delta_store::{Record, next_row_in};
use crate::transaction::gc::{CompactionStats, DeltaCompactor, ObservationPoints};
use crate::transaction::{Generation, VersionId};
use std::sync::Arc;
use tracing::{debug, info, instrument};

impl Geodatabase {
    // ════════════════════════════════════════════
    // Tables
    // ════════════════════════════════════════════

    /// 테이블을 생성합니다.
    ///
    /// 단일 연산 스키마 배치로 적용되며, 실패하면 첫 번째 에러를 반환합니다.
    pub fn create_table(&self, desc: TableDescription) -> GdxResult<TableId> {
        let plan = self.apply_schema_ops(0, &[DdlOp::CreateTable(desc)])?;
        match plan {
            Ok(created) => created
                .into_iter()
                .next()
                .ok_or_else(|| GdxError::Storage("table creation produced no table".to_string())),
            Err(mut errors) => Err(if errors.is_empty() {
                GdxError::Validation("table creation failed".to_string())
            } else {
                errors.swap_remove(0)
            }),
        }
    }

    pub fn table_exists(&self, name: &str) -> bool {
        self.catalog.read().table_by_name(name).is_some()
    }

    pub fn try_table_definition(&self, name: &str) -> Option<Arc<TableDefinition>> {
        self.catalog.read().table_by_name(name).cloned()
    }

    pub fn table_definition(&self, name: &str) -> GdxResult<Arc<TableDefinition>> {
        self.table_def(name)
    }

    // ════════════════════════════════════════════
    // READ Operations
    // ════════════════════════════════════════════

    /// 행을 조회합니다. 보이지 않으면 `RowNotFound`.
    pub fn get_row(&self, version: VersionId, table: &str, row_id: RowId) -> GdxResult<Row> {
        self.try_get_row(version, table, row_id)?
            .ok_or_else(|| GdxError::RowNotFound {
                table: table.to_string(),
                row_id,
            })
    }

    pub fn try_get_row(&self, version: VersionId, table: &str, row_id: RowId) -> GdxResult<Option<Row>> {
        let def = self.table_def(table)?;
        self.require_version(version)?;
        let snapshot = self.snapshots.acquire(&self.oracle);
        let change = self.resolve_change(version, def.id, row_id, snapshot.generation())?;
        Ok(change
            .and_then(|c| c.record().cloned())
            .map(|record| Projection::all(&def).row(&def, row_id, &record)))
    }

    /// 전체 스캔 커서 (빈 필터).
    pub fn scan(&self, version: VersionId, table: &str) -> GdxResult<Cursor> {
        self.search(version, table, &QueryFilter::default())
    }

    /// 쿼리 필터로 검색합니다.
    ///
    /// 반환된 커서는 호출 시점의 스냅샷을 읽습니다. 이후 커밋은 보이지 않습니다.
    ///
    /// # 예제
    ///
    /// ```rust
    /// use gdx_core::{Geodatabase, VersionId};
    /// use gdx_core::api::QueryFilter;
    /// use gdx_core::schema::{FieldDescription, TableDescription};
    ///
    /// # fn main() -> gdx_core::GdxResult<()> {
    /// let db = Geodatabase::open_in_memory()?;
    /// db.create_table(TableDescription::new("Roads").field(FieldDescription::integer("LANES")))?;
    /// for lanes in [1, 2, 4] {
    ///     db.write_row(VersionId::DEFAULT, "Roads", None, [("LANES", lanes)])?;
    /// }
    /// let wide = db.search(VersionId::DEFAULT, "Roads", &QueryFilter::new().where_clause("LANES >= 2"))?;
    /// assert_eq!(wide.count(), 2);
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, filter))]
    pub fn search(&self, version: VersionId, table: &str, filter: &QueryFilter) -> GdxResult<Cursor> {
        let def = self.table_def(table)?;
        self.require_version(version)?;
        let compiled = CompiledFilter::compile(&def, filter)?;
        let projection = match &filter.sub_fields {
            Some(names) => Projection::select(&def, names)?,
            None => Projection::all(&def),
        };
        let snapshot = self.snapshots.acquire(&self.oracle);
        let chain = self.graph.chain(version, snapshot.generation())?;
        let map = self.store.table(def.id);
        Cursor::new(
            snapshot,
            def,
            map,
            chain,
            projection,
            compiled,
            self.config.cursor_batch_size,
        )
    }

    /// 필터에 맞는 행 수.
    pub fn count(&self, version: VersionId, table: &str, filter: &QueryFilter) -> GdxResult<usize> {
        let mut n = 0;
        for row in self.search(version, table, filter)? {
            row?;
            n += 1;
        }
        Ok(n)
    }

    /// Every visible (row id, record) of a table at `snapshot`.
    pub(crate) fn visible_records(
        &self,
        version: VersionId,
        table: TableId,
        snapshot: Generation,
    ) -> GdxResult<Vec<(RowId, Record)>> {
        let Some(map) = self.store.table(table) else {
            return Ok(Vec::new());
        };
        let chain = self.graph.chain(version, snapshot)?;
        let mut out = Vec::new();
        let mut next = RowId::MIN;
        while let Some(row_id) = next_row_in(&map, next) {
            if let Some(record) = chain.state(&map, table, row_id) {
                out.push((row_id, record));
            }
            match row_id.checked_add(1) {
                Some(n) => next = n,
                None => break,
            }
        }
        Ok(out)
    }

    /// Destination rows related to the given origin rows through a relationship class.
    pub fn related_rows(
        &self,
        version: VersionId,
        relationship: &str,
        origin_ids: &[RowId],
    ) -> GdxResult<Vec<Row>> {
        let rel = self
            .catalog
            .read()
            .relationship(relationship)
            .cloned()
            .ok_or_else(|| GdxError::RelationshipNotFound(relationship.to_string()))?;
        let mut keys: Vec<Value> = Vec::new();
        for id in origin_ids {
            let origin = self.get_row(version, &rel.origin_table, *id)?;
            let key = origin.value(&rel.origin_primary_key)?.clone();
            if !key.is_null() {
                keys.push(key);
            }
        }
        let mut out = Vec::new();
        if keys.is_empty() {
            return Ok(out);
        }
        for row in self.scan(version, &rel.destination_table)? {
            let row = row?;
            let matched = row.get(&rel.origin_foreign_key).is_some_and(|fk| {
                keys.iter()
                    .any(|k| k.compare(fk, true) == Some(std::cmp::Ordering::Equal))
            });
            if matched {
                out.push(row);
                if rel.cardinality == Cardinality::OneToOne && out.len() == origin_ids.len() {
                    break;
                }
            }
        }
        Ok(out)
    }

    // ════════════════════════════════════════════
    // Single-op edits
    // ════════════════════════════════════════════

    /// 단일 행 쓰기 — `row_id`가 `None`이면 삽입, 아니면 갱신 (자동 커밋)
    pub fn write_row<I, K, V>(
        &self,
        version: VersionId,
        table: &str,
        row_id: Option<RowId>,
        values: I,
    ) -> GdxResult<RowId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let mut session = self.begin_edit(version)?;
        let id = match row_id {
            Some(id) => {
                session.update(table, id, values)?;
                id
            }
            None => session.create(table, values)?,
        };
        session.commit()?;
        Ok(id)
    }

    /// 단일 행 삭제 (자동 커밋)
    pub fn delete_row(&self, version: VersionId, table: &str, row_id: RowId) -> GdxResult<()> {
        let mut session = self.begin_edit(version)?;
        session.delete(table, row_id)?;
        session.commit()?;
        Ok(())
    }

    // ════════════════════════════════════════════
    // Compaction
    // ════════════════════════════════════════════

    /// Observation points of every version layer at this instant.
    pub(crate) fn observation_points(&self) -> ObservationPoints {
        let mut points = ObservationPoints {
            global: self.snapshots.protected(&self.oracle),
            ..Default::default()
        };
        for info in self.graph.list() {
            let mut observed = Vec::new();
            for history in self.graph.child_histories(info.id) {
                for entry in history {
                    observed.push(entry.base);
                    observed.extend(entry.pins.values().copied());
                }
            }
            if !observed.is_empty() {
                observed.sort();
                observed.dedup();
                points.per_version.insert(info.id, observed);
            }
        }
        points
    }

    /// 더 이상 관측될 수 없는 delta를 제거합니다.
    #[instrument(skip(self))]
    pub fn compact(&self) -> GdxResult<CompactionStats> {
        let _commit = self.commit_lock.lock();
        let points = self.observation_points();
        let stats = DeltaCompactor::new().collect(&self.store, &points);
        if stats.removed > 0 {
            info!(removed = stats.removed, examined = stats.examined, "compaction removed deltas");
        } else {
            debug!(examined = stats.examined, "compaction found nothing to remove");
        }
        Ok(stats)
    }
}
