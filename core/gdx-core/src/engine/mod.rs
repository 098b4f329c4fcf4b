//! Geodatabase Engine Module

pub mod constructors;
pub mod crud;
pub mod cursor;
pub mod database;
pub mod ddl;
pub mod index;
pub mod metadata;
pub mod types;
pub mod versioning;

pub use cursor::Cursor;
pub use database::Geodatabase;
pub use metadata::CatalogMetadata;
pub use types::{ConnectionProperties, DurabilityLevel, GeodatabaseConfig};
pub use versioning::VersionDescription;
