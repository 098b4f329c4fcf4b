//! Geodatabase struct definition — the core data structure

use crate::engine::metadata::save_catalog;
use crate::engine::types::{DurabilityLevel, GeodatabaseConfig};
use crate::error::{GdxError, GdxResult};
use crate::schema::{Catalog, RowId, TableDefinition, TableId};
use crate::storage::delta_store::{Change, DeltaKey, DeltaStore};
use crate::storage::journal::{Journal, JournalRecord, JournalWrite};
use crate::transaction::chain::BaseEntry;
use crate::transaction::lease::SchemaUsage;
use crate::transaction::{
    Generation, LeaseTable, SnapshotRegistry, TimestampOracle, VersionGraph, VersionId,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use tracing::{debug, trace};

/// GDX 지오데이터베이스 엔진
///
/// 버전 트리 위의 트랜잭션 테이블 저장소입니다. 모든 읽기·쓰기는 명시적인
/// [`VersionId`]를 받으며, 활성 버전 같은 전역 상태는 없습니다.
///
/// # 데이터 흐름
///
/// - **READ**: 버전의 Shadow Chain을 한 번 만들고 Delta Store에서 행을 해석
/// - **EDIT**: [`EditSession`](crate::api::EditSession)에 버퍼링 후 commit 시 한 generation으로 추가
/// - **RECONCILE/POST**: 자식과 부모의 차이를 계산하고 한 generation으로 적용
/// - **DDL**: [`SchemaBuilder`](crate::schema::SchemaBuilder) 배치로 카탈로그 교체
///
/// # 예제
///
/// ```rust
/// use gdx_core::{Geodatabase, VersionId};
/// use gdx_core::schema::{FieldDescription, TableDescription, Value};
///
/// # fn main() -> gdx_core::GdxResult<()> {
/// let db = Geodatabase::open_in_memory()?;
/// db.create_table(TableDescription::new("Trees").field(FieldDescription::text("NAME", 32)))?;
/// let id = db.write_row(VersionId::DEFAULT, "Trees", None, [("NAME", Value::from("Pine"))])?;
/// let row = db.get_row(VersionId::DEFAULT, "Trees", id)?;
/// assert_eq!(row.get("NAME"), Some(&Value::from("Pine")));
/// # Ok(())
/// # }
/// ```
pub struct Geodatabase {
    pub(crate) config: GeodatabaseConfig,

    /// Directory of the sled journal; `None` in memory.
    pub(crate) location: Option<PathBuf>,

    /// Published schema. DDL swaps the whole catalog.
    pub(crate) catalog: RwLock<Arc<Catalog>>,

    /// DDL holds it exclusively; sessions register table usage under the shared side.
    pub(crate) ddl_gate: RwLock<()>,

    /// Tier 1: Delta Store (in-memory, append-only)
    pub(crate) store: Arc<DeltaStore>,

    pub(crate) graph: VersionGraph,

    pub(crate) oracle: TimestampOracle,

    pub(crate) snapshots: Arc<SnapshotRegistry>,

    /// Serializes generation allocation, append and publish.
    pub(crate) commit_lock: Mutex<()>,

    /// Writer leases: one edit session or reconcile per version.
    pub(crate) leases: Arc<LeaseTable>,

    /// Open edit sessions per table (schema locks).
    pub(crate) usage: Arc<SchemaUsage>,

    /// Row ID counters: table → last assigned row id, shared by all versions
    pub(crate) row_counters: DashMap<TableId, AtomicI64>,

    /// Durable journal (optional)
    pub(crate) journal: Option<Journal>,
}

impl std::fmt::Debug for Geodatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Geodatabase")
            .field("location", &self.location)
            .field("durability", &self.config.durability)
            .field("published", &self.oracle.read())
            .field("deltas", &self.store.entry_count())
            .finish()
    }
}

impl Geodatabase {
    pub fn config(&self) -> &GeodatabaseConfig {
        &self.config
    }

    pub fn location(&self) -> Option<&std::path::Path> {
        self.location.as_deref()
    }

    /// Current published catalog.
    pub fn catalog(&self) -> Arc<Catalog> {
        Arc::clone(&self.catalog.read())
    }

    /// Newest published generation.
    pub fn current_generation(&self) -> Generation {
        self.oracle.read()
    }

    pub(crate) fn table_def(&self, name: &str) -> GdxResult<Arc<TableDefinition>> {
        self.catalog.read().require_table(name).cloned()
    }

    /// Human-readable label used in error messages.
    pub(crate) fn version_label(&self, version: VersionId) -> String {
        self.graph.path(version)
    }

    pub(crate) fn require_version(&self, version: VersionId) -> GdxResult<()> {
        if self.graph.exists(version) {
            Ok(())
        } else {
            Err(GdxError::VersionNotFound(version.to_string()))
        }
    }

    /// Allocates the next row id of a table; ids are never reused across versions.
    pub(crate) fn next_row_id(&self, table: TableId) -> RowId {
        self.row_counters
            .entry(table)
            .or_insert_with(|| AtomicI64::new(self.store.max_row_id(table).unwrap_or(0)))
            .fetch_add(1, Ordering::SeqCst)
            + 1
    }

    pub(crate) fn journal_append(&self, record: &JournalRecord) -> GdxResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        if self.config.durability == DurabilityLevel::None {
            return Ok(());
        }
        let seq = journal.append(record)?;
        if self.config.durability == DurabilityLevel::Full {
            journal.flush()?;
        }
        trace!(seq, "journal record appended");
        Ok(())
    }

    /// Saves the catalog; flushed at once under `DurabilityLevel::Full`.
    ///
    /// Runs at every durability level, `None` included.
    pub(crate) fn persist_catalog(&self, catalog: &Catalog) -> GdxResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        save_catalog(journal, catalog)?;
        if self.config.durability == DurabilityLevel::Full {
            journal.flush()?;
        }
        Ok(())
    }

    /// Writes one generation: journal first, then deltas and base advances,
    /// then publish. Caller holds the commit lock and allocated `generation`.
    pub(crate) fn write_generation(
        &self,
        generation: Generation,
        writes: Vec<JournalWrite>,
        bases: Vec<(VersionId, BaseEntry)>,
    ) -> GdxResult<()> {
        if writes.is_empty() && bases.is_empty() {
            self.oracle.publish(generation);
            return Ok(());
        }
        let record = JournalRecord::Generation {
            generation,
            writes,
            bases,
        };
        self.journal_append(&record)?;
        let JournalRecord::Generation { writes, bases, .. } = record else {
            return Err(GdxError::Storage("journal record changed shape".to_string()));
        };
        self.apply_generation(generation, writes, bases)?;
        self.oracle.publish(generation);
        debug!(%generation, "generation published");
        Ok(())
    }

    /// In-memory half of [`write_generation`](Self::write_generation); also used by replay.
    pub(crate) fn apply_generation(
        &self,
        generation: Generation,
        writes: Vec<JournalWrite>,
        bases: Vec<(VersionId, BaseEntry)>,
    ) -> GdxResult<()> {
        for w in writes {
            self.store.ensure_table(w.table);
            self.store.append(
                w.table,
                DeltaKey::new(w.row_id, w.version, generation),
                w.change,
            )?;
            self.graph.touch(w.version, generation);
        }
        for (version, entry) in bases {
            self.graph.push_base(version, entry)?;
        }
        Ok(())
    }

    /// Visible change of one row, or `None` when the version never saw it.
    pub(crate) fn resolve_change(
        &self,
        version: VersionId,
        table: TableId,
        row_id: RowId,
        snapshot: Generation,
    ) -> GdxResult<Option<Arc<Change>>> {
        let Some(map) = self.store.table(table) else {
            return Ok(None);
        };
        let chain = self.graph.chain(version, snapshot)?;
        Ok(chain.resolve(&map, table, row_id))
    }
}
