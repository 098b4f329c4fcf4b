//! Metadata Persistence — catalog serialization and storage
//!
//! The published catalog is stored as one serde_json document under the
//! `catalog` key of the journal's `__meta__` tree and rewritten after every
//! successful schema batch.

use crate::error::GdxResult;
use crate::schema::{Catalog, Domain, FeatureDataset, RelationshipDefinition, TableDefinition};
use crate::storage::journal::Journal;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

const CATALOG_KEY: &str = "catalog";

// ════════════════════════════════════════════
// Metadata Structures
// ════════════════════════════════════════════

/// Serializable form of [`Catalog`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub tables: Vec<TableDefinition>,
    pub domains: Vec<Domain>,
    pub relationships: Vec<RelationshipDefinition>,
    pub feature_datasets: Vec<FeatureDataset>,
    pub next_table_id: u32,
}

impl From<&Catalog> for CatalogMetadata {
    fn from(catalog: &Catalog) -> Self {
        Self {
            tables: catalog.tables().map(|t| TableDefinition::clone(t)).collect(),
            domains: catalog.domains().cloned().collect(),
            relationships: catalog.relationships().cloned().collect(),
            feature_datasets: catalog.feature_datasets().cloned().collect(),
            next_table_id: catalog.next_table_id,
        }
    }
}

impl From<CatalogMetadata> for Catalog {
    fn from(meta: CatalogMetadata) -> Self {
        let mut catalog = Catalog {
            next_table_id: meta.next_table_id,
            ..Catalog::default()
        };
        for table in meta.tables {
            catalog.next_table_id = catalog.next_table_id.max(table.id.0 + 1);
            catalog.tables.insert(table.id, Arc::new(table));
        }
        for domain in meta.domains {
            catalog.domains.insert(domain.name().to_lowercase(), domain);
        }
        for rel in meta.relationships {
            catalog.relationships.insert(rel.name.to_lowercase(), rel);
        }
        for fd in meta.feature_datasets {
            catalog.feature_datasets.insert(fd.name.to_lowercase(), fd);
        }
        catalog
    }
}

// ════════════════════════════════════════════
// Catalog Persistence Functions
// ════════════════════════════════════════════

/// Save the catalog to persistent storage
pub fn save_catalog(journal: &Journal, catalog: &Catalog) -> GdxResult<()> {
    let json = serde_json::to_vec(&CatalogMetadata::from(catalog))?;
    journal.put_meta(CATALOG_KEY, &json)
}

/// Load the catalog; an empty catalog when none was saved yet.
pub fn load_catalog(journal: &Journal) -> GdxResult<Catalog> {
    match journal.get_meta(CATALOG_KEY)? {
        Some(bytes) => {
            let meta: CatalogMetadata = serde_json::from_slice(&bytes)?;
            Ok(meta.into())
        }
        None => Ok(Catalog::default()),
    }
}
