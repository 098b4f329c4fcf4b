//! Typestate Edit Session — 타입 안전 편집 세션
//!
//! Typestate 패턴을 사용하여 세션 오용을 컴파일 타임에 방지.
//! 세션 내 쓰기는 로컬 버퍼에 축적되며,
//! `commit()` 시 하나의 delta generation으로 원자적으로 반영됩니다.
//!
//! A session owns its version's writer lease and the schema locks of every
//! table it touched; both are released when the session value goes away,
//! whether committed, aborted or simply dropped.

use crate::engine::Geodatabase;
use crate::engine::index::check_unique;
use crate::error::{GdxError, GdxResult};
use crate::schema::{RowId, TableDefinition, TableId, Value};
use crate::storage::delta_store::{Change, Record};
use crate::storage::journal::JournalWrite;
use crate::transaction::lease::TableRegistration;
use crate::transaction::{Generation, VersionId, WriterLease};
use ahash::AHashSet;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// 세션 상태 트레이트
pub trait SessionState {}

/// Active 상태 — 편집 진행 중
pub struct Active;

/// Committed 상태 — 커밋 완료
pub struct Committed;

/// Aborted 상태 — 편집 폐기
pub struct Aborted;

impl SessionState for Active {}
impl SessionState for Committed {}
impl SessionState for Aborted {}

/// 세션 내 쓰기 작업 로그
#[derive(Debug, Clone, PartialEq)]
pub enum EditOp {
    Insert { table: TableId, row_id: RowId, record: Record },
    Update { table: TableId, row_id: RowId, record: Record },
    Delete { table: TableId, row_id: RowId },
}

impl EditOp {
    pub fn table(&self) -> TableId {
        match self {
            EditOp::Insert { table, .. } | EditOp::Update { table, .. } | EditOp::Delete { table, .. } => {
                *table
            }
        }
    }

    pub fn row_id(&self) -> RowId {
        match self {
            EditOp::Insert { row_id, .. }
            | EditOp::Update { row_id, .. }
            | EditOp::Delete { row_id, .. } => *row_id,
        }
    }
}

/// Buffered edits against one version.
///
/// Active 상태에서만 쓰기가 가능하며,
/// commit/abort 후에는 컴파일 타임에 사용 불가.
pub struct EditSession<'a, S: SessionState = Active> {
    db: &'a Geodatabase,
    version: VersionId,
    lease: Option<WriterLease>,
    registration: Option<TableRegistration>,
    ops: Vec<EditOp>,
    /// 로컬 읽기 버퍼 (read-your-writes); `None` is a buffered delete
    overlay: HashMap<(TableId, RowId), Option<Record>>,
    /// Rows inserted by this session.
    created: AHashSet<(TableId, RowId)>,
    generation: Option<Generation>,
    _state: PhantomData<S>,
}

impl<S: SessionState> std::fmt::Debug for EditSession<'_, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditSession")
            .field("version", &self.version)
            .field("ops", &self.ops.len())
            .field("generation", &self.generation)
            .finish()
    }
}

impl<S: SessionState> EditSession<'_, S> {
    pub fn version(&self) -> VersionId {
        self.version
    }
}

impl Geodatabase {
    /// 편집 세션 시작
    ///
    /// 버전의 writer lease를 즉시 획득합니다. 다른 세션이나 reconcile이
    /// 이미 잡고 있으면 기다리지 않고 `SessionAlreadyOpen` / `VersionBusy`로 실패합니다.
    pub fn begin_edit(&self, version: VersionId) -> GdxResult<EditSession<'_, Active>> {
        self.require_version(version)?;
        let lease = self.leases.acquire(
            version,
            crate::transaction::LeaseHolder::EditSession,
            &self.version_label(version),
        )?;
        // deleted between the check and the lease
        self.require_version(version)?;
        debug!(%version, "edit session opened");
        Ok(EditSession {
            db: self,
            version,
            lease: Some(lease),
            registration: Some(TableRegistration::new(Arc::clone(&self.usage))),
            ops: Vec::new(),
            overlay: HashMap::new(),
            created: AHashSet::new(),
            generation: None,
            _state: PhantomData,
        })
    }
}

impl<'a> EditSession<'a, Active> {
    /// Resolves a table and registers the session on it (schema lock).
    fn touch(&mut self, name: &str) -> GdxResult<Arc<TableDefinition>> {
        let _gate = self.db.ddl_gate.read();
        let table = self.db.table_def(name)?;
        if let Some(registration) = &mut self.registration {
            registration.touch(table.id);
        }
        Ok(table)
    }

    /// Visible record: local buffer first, then the version's committed state.
    fn visible(&self, table: &TableDefinition, row_id: RowId) -> GdxResult<Option<Record>> {
        if let Some(local) = self.overlay.get(&(table.id, row_id)) {
            return Ok(local.clone());
        }
        let change = self
            .db
            .resolve_change(self.version, table.id, row_id, self.db.oracle.read())?;
        Ok(change.and_then(|c| c.record().cloned()))
    }

    fn row_not_found(table: &TableDefinition, row_id: RowId) -> GdxError {
        GdxError::RowNotFound {
            table: table.name.clone(),
            row_id,
        }
    }

    // ════════════════════════════════════════════
    // Buffered Write Operations
    // ════════════════════════════════════════════

    /// 세션 내 INSERT — 새 row id를 할당하고 로컬 버퍼에 저장
    pub fn create<I, K, V>(&mut self, table: &str, values: I) -> GdxResult<RowId>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let def = self.touch(table)?;
        let catalog = self.db.catalog();
        let record = def.build_record(
            values.into_iter().map(|(k, v)| (k.into(), v.into())),
            None,
            &catalog,
        )?;
        let row_id = self.db.next_row_id(def.id);
        self.ops.push(EditOp::Insert {
            table: def.id,
            row_id,
            record: record.clone(),
        });
        self.overlay.insert((def.id, row_id), Some(record));
        self.created.insert((def.id, row_id));
        Ok(row_id)
    }

    /// 세션 내 UPDATE — 지정한 필드만 바꾸고 나머지는 유지
    pub fn update<I, K, V>(&mut self, table: &str, row_id: RowId, values: I) -> GdxResult<()>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        let def = self.touch(table)?;
        let base = self
            .visible(&def, row_id)?
            .ok_or_else(|| Self::row_not_found(&def, row_id))?;
        let catalog = self.db.catalog();
        let record = def.build_record(
            values.into_iter().map(|(k, v)| (k.into(), v.into())),
            Some(&base),
            &catalog,
        )?;
        self.ops.push(EditOp::Update {
            table: def.id,
            row_id,
            record: record.clone(),
        });
        self.overlay.insert((def.id, row_id), Some(record));
        Ok(())
    }

    /// 세션 내 DELETE — 로컬 버퍼에 tombstone 기록
    pub fn delete(&mut self, table: &str, row_id: RowId) -> GdxResult<()> {
        let def = self.touch(table)?;
        if self.visible(&def, row_id)?.is_none() {
            return Err(Self::row_not_found(&def, row_id));
        }
        self.ops.push(EditOp::Delete {
            table: def.id,
            row_id,
        });
        self.overlay.insert((def.id, row_id), None);
        Ok(())
    }

    /// 세션 내 GET — 로컬 버퍼 우선, 없으면 버전의 커밋된 상태 조회
    pub fn get(&mut self, table: &str, row_id: RowId) -> GdxResult<Option<crate::api::Row>> {
        let def = self.touch(table)?;
        Ok(self
            .visible(&def, row_id)?
            .map(|record| crate::engine::cursor::Projection::all(&def).row(&def, row_id, &record)))
    }

    /// 현재 세션의 보류 중인 연산
    pub fn pending_ops(&self) -> &[EditOp] {
        &self.ops
    }

    // ════════════════════════════════════════════
    // Commit / Abort
    // ════════════════════════════════════════════

    /// Final state per touched row, skipping rows created and deleted here.
    fn final_writes(&self) -> Vec<JournalWrite> {
        let ordered: BTreeMap<&(TableId, RowId), &Option<Record>> = self.overlay.iter().collect();
        ordered
            .into_iter()
            .filter(|(key, state)| !(state.is_none() && self.created.contains(*key)))
            .map(|(&(table, row_id), state)| JournalWrite {
                table,
                version: self.version,
                row_id,
                change: Change::from_state(state.clone()),
            })
            .collect()
    }

    fn check_unique_indexes(&self) -> GdxResult<()> {
        let catalog = self.db.catalog();
        let snapshot = self.db.oracle.read();
        let mut touched: BTreeMap<TableId, AHashSet<RowId>> = BTreeMap::new();
        for (table, row_id) in self.overlay.keys() {
            touched.entry(*table).or_default().insert(*row_id);
        }
        for (table_id, rows) in touched {
            let Some(table) = catalog.table(table_id) else {
                continue;
            };
            if !table.indexes.iter().any(|i| i.unique) {
                continue;
            }
            let mut state: BTreeMap<RowId, Record> = self
                .db
                .visible_records(self.version, table_id, snapshot)?
                .into_iter()
                .collect();
            for row_id in &rows {
                match self.overlay.get(&(table_id, *row_id)) {
                    Some(Some(record)) => {
                        state.insert(*row_id, record.clone());
                    }
                    Some(None) => {
                        state.remove(row_id);
                    }
                    None => {}
                }
            }
            check_unique(
                table,
                state.iter().map(|(id, r)| (*id, r)),
                Some(&rows),
            )?;
        }
        Ok(())
    }

    /// 세션 커밋 — 모든 버퍼링된 쓰기를 하나의 generation으로 원자적으로 반영
    pub fn commit(mut self) -> GdxResult<EditSession<'a, Committed>> {
        let writes = self.final_writes();
        let mut generation = None;
        if !writes.is_empty() {
            self.check_unique_indexes()?;
            let count = writes.len();
            let _commit = self.db.commit_lock.lock();
            let g = self.db.oracle.next();
            self.db.write_generation(g, writes, Vec::new())?;
            debug!(version = %self.version, generation = %g, rows = count, "edit session committed");
            generation = Some(g);
        }
        Ok(EditSession {
            db: self.db,
            version: self.version,
            lease: self.lease.take(),
            registration: self.registration.take(),
            ops: Vec::new(),
            overlay: HashMap::new(),
            created: AHashSet::new(),
            generation,
            _state: PhantomData,
        }
        .release())
    }

    /// 세션 폐기 — 모든 버퍼링된 쓰기를 버림
    pub fn abort(mut self) -> EditSession<'a, Aborted> {
        debug!(version = %self.version, ops = self.ops.len(), "edit session aborted");
        EditSession {
            db: self.db,
            version: self.version,
            lease: self.lease.take(),
            registration: self.registration.take(),
            ops: Vec::new(),
            overlay: HashMap::new(),
            created: AHashSet::new(),
            generation: None,
            _state: PhantomData,
        }
        .release()
    }
}

impl<'a, S: SessionState> EditSession<'a, S> {
    /// Drops the lease and schema locks held by a finished session.
    fn release(mut self) -> Self {
        self.registration = None;
        self.lease = None;
        self
    }
}

// Committed/Aborted 상태에서는 편집 불가 (컴파일 에러)
impl<'a> EditSession<'a, Committed> {
    /// Generation the edits were published in; `None` for an empty session.
    pub fn generation(&self) -> Option<Generation> {
        self.generation
    }

    pub fn is_committed(&self) -> bool {
        true
    }
}

impl<'a> EditSession<'a, Aborted> {
    pub fn is_aborted(&self) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use crate::engine::Geodatabase;
    use crate::error::GdxError;
    use crate::schema::{FieldDescription, IndexDescription, TableDescription, Value};
    use crate::transaction::VersionId;

    fn db() -> Geodatabase {
        let db = Geodatabase::open_in_memory().unwrap();
        db.create_table(
            TableDescription::new("Parcels")
                .field(FieldDescription::text("APN", 12).required())
                .field(FieldDescription::integer("ZONE"))
                .index(IndexDescription::new("apn_idx", ["APN"]).unique()),
        )
        .unwrap();
        db
    }

    #[test]
    fn read_your_writes_before_commit() {
        let db = db();
        let mut session = db.begin_edit(VersionId::DEFAULT).unwrap();
        let id = session.create("Parcels", [("APN", "001")]).unwrap();

        // 커밋 전: 메인 스토리지에는 없음
        assert!(db.try_get_row(VersionId::DEFAULT, "Parcels", id).unwrap().is_none());
        let row = session.get("Parcels", id).unwrap().unwrap();
        assert_eq!(row.get("APN"), Some(&Value::from("001")));

        let committed = session.commit().unwrap();
        assert!(committed.generation().is_some());
        let row = db.get_row(VersionId::DEFAULT, "Parcels", id).unwrap();
        assert_eq!(row.get("APN"), Some(&Value::from("001")));
    }

    #[test]
    fn abort_discards_everything() {
        let db = db();
        let mut session = db.begin_edit(VersionId::DEFAULT).unwrap();
        let id = session.create("Parcels", [("APN", "001")]).unwrap();
        assert_eq!(session.pending_ops().len(), 1);
        assert!(session.abort().is_aborted());
        assert!(db.try_get_row(VersionId::DEFAULT, "Parcels", id).unwrap().is_none());
        // lease released
        db.begin_edit(VersionId::DEFAULT).unwrap();
    }

    #[test]
    fn single_writer_per_version() {
        let db = db();
        let first = db.begin_edit(VersionId::DEFAULT).unwrap();
        assert!(matches!(
            db.begin_edit(VersionId::DEFAULT),
            Err(GdxError::SessionAlreadyOpen { .. })
        ));
        drop(first);
        assert!(db.begin_edit(VersionId::DEFAULT).is_ok());
    }

    #[test]
    fn update_and_delete_require_visible_rows() {
        let db = db();
        let mut session = db.begin_edit(VersionId::DEFAULT).unwrap();
        assert!(matches!(
            session.update("Parcels", 42, [("ZONE", 1)]),
            Err(GdxError::RowNotFound { row_id: 42, .. })
        ));
        let id = session.create("Parcels", [("APN", "001")]).unwrap();
        session.update("Parcels", id, [("ZONE", 3)]).unwrap();
        session.delete("Parcels", id).unwrap();
        assert!(session.get("Parcels", id).unwrap().is_none());
        assert!(matches!(
            session.delete("Parcels", id),
            Err(GdxError::RowNotFound { .. })
        ));
        // created and deleted in the same session: nothing to publish
        let committed = session.commit().unwrap();
        assert_eq!(committed.generation(), None);
    }

    #[test]
    fn constraint_violations_surface_immediately() {
        let db = db();
        let mut session = db.begin_edit(VersionId::DEFAULT).unwrap();
        assert!(matches!(
            session.create("Parcels", [("ZONE", 1)]),
            Err(GdxError::ConstraintViolation { .. })
        ));
        assert!(matches!(
            session.create("Parcels", [("APN", "this is far too long")]),
            Err(GdxError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn unique_index_checked_at_commit() {
        let db = db();
        db.write_row(VersionId::DEFAULT, "Parcels", None, [("APN", "001")])
            .unwrap();
        let mut session = db.begin_edit(VersionId::DEFAULT).unwrap();
        session.create("Parcels", [("APN", "001")]).unwrap();
        let err = session.commit().unwrap_err();
        assert!(matches!(err, GdxError::ConstraintViolation { .. }));
        // failed commit released the lease
        assert!(db.begin_edit(VersionId::DEFAULT).is_ok());
    }
}
