//! Geodatabase Constructors — open, connect and journal replay

use crate::engine::metadata::load_catalog;
use crate::engine::types::{ConnectionProperties, GeodatabaseConfig};
use crate::engine::Geodatabase;
use crate::error::{GdxError, GdxResult};
use crate::schema::Catalog;
use crate::storage::delta_store::DeltaStore;
use crate::storage::journal::{Journal, JournalRecord};
use crate::transaction::lease::SchemaUsage;
use crate::transaction::{
    Generation, LeaseTable, SnapshotRegistry, TimestampOracle, VersionGraph, VersionId,
};
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, instrument};

impl Geodatabase {
    /// 지오데이터베이스를 열거나 생성합니다.
    ///
    /// 지정된 디렉토리의 sled journal을 열고 카탈로그를 읽은 뒤 journal을
    /// 재생하여 Delta Store와 버전 트리를 복원합니다.
    ///
    /// # 예제
    ///
    /// ```rust
    /// use gdx_core::Geodatabase;
    ///
    /// # fn main() -> gdx_core::GdxResult<()> {
    /// let dir = tempfile::tempdir()?;
    /// let db = Geodatabase::open(dir.path())?;
    /// assert!(db.location().is_some());
    /// # Ok(())
    /// # }
    /// ```
    pub fn open(path: &Path) -> GdxResult<Self> {
        Self::open_with_config(path, GeodatabaseConfig::default())
    }

    #[instrument(skip(path, config))]
    pub fn open_with_config(path: &Path, config: GeodatabaseConfig) -> GdxResult<Self> {
        info!("Opening geodatabase at {:?}", path);
        std::fs::create_dir_all(path)?;
        let journal = Journal::open(path)?;
        let catalog = load_catalog(&journal)?;
        info!(
            tables = catalog.tables().count(),
            records = journal.len(),
            "catalog loaded"
        );
        let db = Self::assemble(config, Some(path.to_path_buf()), catalog, Some(journal));
        db.replay()?;
        Ok(db)
    }

    /// 인메모리 지오데이터베이스를 생성합니다 (journal 없음).
    pub fn open_in_memory() -> GdxResult<Self> {
        Self::open_in_memory_with_config(GeodatabaseConfig::default())
    }

    pub fn open_in_memory_with_config(config: GeodatabaseConfig) -> GdxResult<Self> {
        debug!("Opening in-memory geodatabase");
        Ok(Self::assemble(config, None, Catalog::default(), None))
    }

    /// Opens the location named by `props` and resolves its version.
    ///
    /// Returns the handle plus the version to work in (`DEFAULT` when unset).
    /// Remote instances, unreadable directories and unknown versions fail
    /// with [`GdxError::Connection`].
    pub fn connect(props: &ConnectionProperties) -> GdxResult<(Self, VersionId)> {
        let mut config = GeodatabaseConfig::default();
        if let Some(durability) = props.durability {
            config.durability = durability;
        }
        config.user = props.user.clone();

        let db = if props.is_in_memory() {
            Self::open_in_memory_with_config(config)?
        } else {
            let path = props.local_path()?;
            Self::open_with_config(&path, config).map_err(|e| match e {
                GdxError::Io { .. } | GdxError::Sled { .. } | GdxError::Storage(_) => {
                    GdxError::Connection {
                        location: path.display().to_string(),
                        message: e.to_string(),
                    }
                }
                other => other,
            })?
        };

        let version = match props.version.as_deref().map(str::trim) {
            None | Some("") => VersionId::DEFAULT,
            Some(name) => db.find_version(name)?.ok_or_else(|| GdxError::Connection {
                location: props.instance.clone(),
                message: format!("version '{}' does not exist", name),
            })?,
        };
        info!(version = %version, "connected");
        Ok((db, version))
    }

    fn assemble(
        config: GeodatabaseConfig,
        location: Option<std::path::PathBuf>,
        catalog: Catalog,
        journal: Option<Journal>,
    ) -> Self {
        let store = Arc::new(DeltaStore::new());
        for table in catalog.tables() {
            store.ensure_table(table.id);
        }
        Self {
            graph: VersionGraph::new(config.chain_cache_capacity),
            config,
            location,
            catalog: RwLock::new(Arc::new(catalog)),
            ddl_gate: RwLock::new(()),
            store,
            oracle: TimestampOracle::new(0),
            snapshots: Arc::new(SnapshotRegistry::new()),
            commit_lock: Mutex::new(()),
            leases: Arc::new(LeaseTable::new()),
            usage: Arc::new(SchemaUsage::new()),
            row_counters: DashMap::new(),
            journal,
        }
    }

    /// Rebuilds deltas, versions and the generation counter from the journal.
    fn replay(&self) -> GdxResult<()> {
        let Some(journal) = &self.journal else {
            return Ok(());
        };
        let catalog = self.catalog();
        let records = journal.replay()?;
        let total = records.len();
        let mut last = Generation::ZERO;
        let mut skipped = 0usize;

        for record in records {
            match record {
                JournalRecord::Generation {
                    generation,
                    writes,
                    bases,
                } => {
                    let before = writes.len();
                    let writes: Vec<_> = writes
                        .into_iter()
                        .filter(|w| catalog.table(w.table).is_some())
                        .collect();
                    skipped += before - writes.len();
                    self.apply_generation(generation, writes, bases)?;
                    last = last.max(generation);
                }
                JournalRecord::CreateVersion { info, base } => {
                    last = last.max(info.created_at);
                    self.graph.restore(info, base)?;
                }
                JournalRecord::AlterVersion {
                    id,
                    name,
                    description,
                    access,
                } => {
                    let name = (!id.is_default()).then_some(name);
                    self.graph
                        .alter(id, name.as_deref(), Some(description), Some(access))?;
                }
                JournalRecord::DeleteVersion { id } => {
                    self.graph.delete(id)?;
                    self.store.purge_version(id);
                }
                JournalRecord::DropTable { table } => {
                    self.store.drop_table(table);
                }
            }
        }
        self.oracle.advance_to(last);
        info!(
            records = total,
            generation = %last,
            versions = self.graph.list().len(),
            skipped_writes = skipped,
            "journal replayed"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::types::DurabilityLevel;
    use crate::schema::{FieldDescription, TableDescription, Value};
    use crate::transaction::VersionAccess;

    #[test]
    fn reopen_restores_rows_and_versions() -> GdxResult<()> {
        let dir = tempfile::tempdir()?;
        let (row, child) = {
            let db = Geodatabase::open_with_config(
                dir.path(),
                GeodatabaseConfig::new().durability(DurabilityLevel::Full),
            )?;
            db.create_table(TableDescription::new("Parcels").field(FieldDescription::text("APN", 16)))?;
            let row = db.write_row(VersionId::DEFAULT, "Parcels", None, [("APN", "001")])?;
            let child = db.create_version(VersionId::DEFAULT, "survey", VersionAccess::Public)?;
            db.write_row(child, "Parcels", Some(row), [("APN", "002")])?;
            (row, child)
        };

        let db = Geodatabase::open(dir.path())?;
        assert_eq!(
            db.get_row(VersionId::DEFAULT, "Parcels", row)?.get("APN"),
            Some(&Value::from("001"))
        );
        assert_eq!(db.get_row(child, "Parcels", row)?.get("APN"), Some(&Value::from("002")));
        assert_eq!(db.find_version("survey")?, Some(child));

        // counters resume past replayed ids
        let next = db.write_row(VersionId::DEFAULT, "Parcels", None, [("APN", "003")])?;
        assert!(next > row);
        Ok(())
    }

    #[test]
    fn connect_resolves_versions() -> GdxResult<()> {
        let (db, version) = Geodatabase::connect(&ConnectionProperties::new(":memory:"))?;
        assert_eq!(version, VersionId::DEFAULT);
        assert!(db.location().is_none());

        let err = Geodatabase::connect(&ConnectionProperties::new("").version("nowhere")).unwrap_err();
        assert!(matches!(err, GdxError::Connection { .. }));

        let err = Geodatabase::connect(&ConnectionProperties::new("gis.example.com:5151")).unwrap_err();
        assert!(matches!(err, GdxError::Connection { .. }));
        Ok(())
    }

    #[test]
    fn unusable_location_is_a_connection_error() -> GdxResult<()> {
        let dir = tempfile::tempdir()?;
        let file = dir.path().join("not-a-directory");
        std::fs::write(&file, b"plain file")?;

        let props = ConnectionProperties::new(file.to_string_lossy());
        let err = Geodatabase::connect(&props).unwrap_err();
        assert!(
            matches!(&err, GdxError::Connection { location, .. } if location.contains("not-a-directory"))
        );
        Ok(())
    }

    #[test]
    fn durability_none_writes_no_journal() -> GdxResult<()> {
        let dir = tempfile::tempdir()?;
        {
            let db = Geodatabase::open_with_config(
                dir.path(),
                GeodatabaseConfig::new().durability(DurabilityLevel::None),
            )?;
            db.create_table(TableDescription::new("Scratch"))?;
            db.write_row(VersionId::DEFAULT, "Scratch", None, Vec::<(&str, Value)>::new())?;
            assert_eq!(db.journal.as_ref().map(Journal::len), Some(0));
        }
        let db = Geodatabase::open(dir.path())?;
        // the catalog is still saved; the rows are not
        assert!(db.table_exists("Scratch"));
        assert_eq!(db.count(VersionId::DEFAULT, "Scratch", &Default::default())?, 0);
        Ok(())
    }
}
