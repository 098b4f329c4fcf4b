//! Schema — catalog definitions, values and the DDL batch builder.

pub mod builder;
pub mod catalog;
pub mod description;
pub mod value;

pub use builder::{BuildResult, DdlOp, SchemaBuilder};
pub use catalog::{
    Cardinality, Catalog, Dataset, DatasetKind, Domain, FeatureDataset, FieldDefinition, FieldId,
    IndexDefinition, RelationshipDefinition, RowId, TableDefinition, TableId,
};
pub use description::{
    DEFAULT_OBJECT_ID_FIELD, DEFAULT_SHAPE_FIELD, FeatureDatasetDescription, FieldDescription,
    IndexDescription, NameRef, ObjectKind, RelationshipDescription, TableDescription, Token,
};
pub use value::{FieldType, Value};
