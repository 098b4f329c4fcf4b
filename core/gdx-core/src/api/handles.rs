//! Version and table handles
//!
//! Thin borrowed wrappers that carry a [`VersionId`] so call sites do not
//! repeat it. They hold no state of their own; every call goes straight to
//! the [`Geodatabase`].

use crate::api::filter::QueryFilter;
use crate::api::row::Row;
use crate::api::session::{Active, EditSession};
use crate::engine::{Cursor, Geodatabase};
use crate::error::GdxResult;
use crate::reconcile::{ReconcileOptions, ReconcileResult};
use crate::schema::{Dataset, DatasetKind, RowId, TableDefinition};
use crate::transaction::{VersionAccess, VersionId, VersionInfo};
use std::sync::Arc;

/// A version of one geodatabase.
#[derive(Debug, Clone, Copy)]
pub struct VersionHandle<'a> {
    db: &'a Geodatabase,
    id: VersionId,
}

impl Geodatabase {
    /// Handle on an existing version.
    pub fn version(&self, id: VersionId) -> GdxResult<VersionHandle<'_>> {
        self.require_version(id)?;
        Ok(VersionHandle { db: self, id })
    }

    /// Handle on the root version.
    pub fn default_version(&self) -> VersionHandle<'_> {
        VersionHandle {
            db: self,
            id: VersionId::DEFAULT,
        }
    }

    /// Opens a table as seen from `version`.
    pub fn open_table(&self, version: VersionId, name: &str) -> GdxResult<TableHandle<'_>> {
        self.require_version(version)?;
        Ok(TableHandle {
            db: self,
            version,
            definition: self.table_def(name)?,
        })
    }
}

impl<'a> VersionHandle<'a> {
    pub fn id(&self) -> VersionId {
        self.id
    }

    pub fn info(&self) -> GdxResult<VersionInfo> {
        self.db.version_info(self.id)
    }

    pub fn path(&self) -> GdxResult<String> {
        self.db.version_path(self.id)
    }

    pub fn parent(&self) -> GdxResult<Option<VersionHandle<'a>>> {
        Ok(self.db.parent(self.id)?.map(|id| VersionHandle { db: self.db, id }))
    }

    pub fn children(&self) -> GdxResult<Vec<VersionHandle<'a>>> {
        Ok(self
            .db
            .children(self.id)?
            .into_iter()
            .map(|id| VersionHandle { db: self.db, id })
            .collect())
    }

    pub fn create_child(&self, name: &str, access: VersionAccess) -> GdxResult<VersionHandle<'a>> {
        let id = self.db.create_version(self.id, name, access)?;
        Ok(VersionHandle { db: self.db, id })
    }

    pub fn table(&self, name: &str) -> GdxResult<TableHandle<'a>> {
        self.db.open_table(self.id, name)
    }

    pub fn begin_edit(&self) -> GdxResult<EditSession<'a, Active>> {
        self.db.begin_edit(self.id)
    }

    pub fn search(&self, table: &str, filter: &QueryFilter) -> GdxResult<Cursor> {
        self.db.search(self.id, table, filter)
    }

    pub fn get_row(&self, table: &str, row_id: RowId) -> GdxResult<Row> {
        self.db.get_row(self.id, table, row_id)
    }

    pub fn reconcile(&self, options: ReconcileOptions) -> GdxResult<ReconcileResult> {
        self.db.reconcile(self.id, options)
    }

    /// Deletes the version; the handle is consumed.
    pub fn delete(self) -> GdxResult<()> {
        self.db.delete_version(self.id)
    }
}

/// A table as seen from one version.
#[derive(Debug, Clone)]
pub struct TableHandle<'a> {
    db: &'a Geodatabase,
    version: VersionId,
    definition: Arc<TableDefinition>,
}

impl Dataset for TableHandle<'_> {
    fn name(&self) -> &str {
        &self.definition.name
    }

    fn kind(&self) -> DatasetKind {
        self.definition.kind
    }
}

impl TableHandle<'_> {
    pub fn version(&self) -> VersionId {
        self.version
    }

    /// Definition captured when the handle was opened.
    pub fn definition(&self) -> &TableDefinition {
        &self.definition
    }

    pub fn search(&self, filter: &QueryFilter) -> GdxResult<Cursor> {
        self.db.search(self.version, &self.definition.name, filter)
    }

    pub fn get_row(&self, row_id: RowId) -> GdxResult<Row> {
        self.db.get_row(self.version, &self.definition.name, row_id)
    }

    pub fn try_get_row(&self, row_id: RowId) -> GdxResult<Option<Row>> {
        self.db.try_get_row(self.version, &self.definition.name, row_id)
    }

    pub fn count(&self, filter: &QueryFilter) -> GdxResult<usize> {
        self.db.count(self.version, &self.definition.name, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::GdxError;
    use crate::geometry::GeometryType;
    use crate::schema::{FieldDescription, TableDescription};

    #[test]
    fn handles_navigate_and_read() -> GdxResult<()> {
        let db = Geodatabase::open_in_memory()?;
        db.create_table(
            TableDescription::feature_class("Wells", GeometryType::Point)
                .field(FieldDescription::integer("DEPTH")),
        )?;
        let root = db.default_version();
        let child = root.create_child("drilling", VersionAccess::Protected)?;
        assert_eq!(child.parent()?.map(|p| p.id()), Some(VersionId::DEFAULT));
        assert_eq!(root.children()?.len(), 1);

        let mut session = child.begin_edit()?;
        let id = session.create("Wells", [("DEPTH", 40)])?;
        session.commit()?;

        let wells = child.table("Wells")?;
        assert_eq!(wells.name(), "Wells");
        assert!(wells.kind().is_spatial());
        assert_eq!(wells.count(&QueryFilter::new().where_clause("DEPTH > 10"))?, 1);
        assert_eq!(wells.get_row(id)?.row_id(), id);
        assert!(root.table("Wells")?.try_get_row(id)?.is_none());

        assert!(matches!(db.version(VersionId(42)), Err(GdxError::VersionNotFound(_))));
        child.delete()?;
        assert!(root.children()?.is_empty());
        Ok(())
    }
}
