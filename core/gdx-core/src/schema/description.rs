//! Schema descriptions — caller-side shapes of tables, fields, indexes,
//! relationship classes and feature datasets fed to the schema builder.

use crate::geometry::GeometryType;
use crate::schema::catalog::{Cardinality, DatasetKind};
use crate::schema::value::{FieldType, Value};

/// Default name of the object-id field.
pub const DEFAULT_OBJECT_ID_FIELD: &str = "OBJECTID";
/// Default name of the shape field of feature classes.
pub const DEFAULT_SHAPE_FIELD: &str = "SHAPE";

/// Object kinds a token can stand for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    FeatureDataset,
    Domain,
    Table,
    Index,
    Relationship,
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ObjectKind::FeatureDataset => "feature dataset",
            ObjectKind::Domain => "domain",
            ObjectKind::Table => "table",
            ObjectKind::Index => "index",
            ObjectKind::Relationship => "relationship class",
        };
        write!(f, "{}", s)
    }
}

/// Forward reference to an object created earlier in the same schema batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub(crate) builder: u64,
    pub(crate) op: usize,
    pub(crate) kind: ObjectKind,
    pub(crate) name: String,
}

impl Token {
    pub fn kind(&self) -> ObjectKind {
        self.kind
    }

    /// Name the object was queued with.
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Reference to a schema object: an existing name or a batch token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NameRef {
    Name(String),
    Token(Token),
}

impl NameRef {
    /// Name for diagnostics.
    pub fn display_name(&self) -> &str {
        match self {
            NameRef::Name(n) => n,
            NameRef::Token(t) => &t.name,
        }
    }
}

impl From<&str> for NameRef {
    fn from(s: &str) -> Self {
        NameRef::Name(s.to_string())
    }
}

impl From<String> for NameRef {
    fn from(s: String) -> Self {
        NameRef::Name(s)
    }
}

impl From<Token> for NameRef {
    fn from(t: Token) -> Self {
        NameRef::Token(t)
    }
}

impl From<&Token> for NameRef {
    fn from(t: &Token) -> Self {
        NameRef::Token(t.clone())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescription {
    pub name: String,
    pub alias: Option<String>,
    pub field_type: FieldType,
    pub nullable: bool,
    pub length: Option<usize>,
    pub default: Option<Value>,
    pub domain: Option<NameRef>,
    pub geometry_type: Option<GeometryType>,
}

impl FieldDescription {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            alias: None,
            field_type,
            nullable: true,
            length: None,
            default: None,
            domain: None,
            geometry_type: None,
        }
    }

    pub fn text(name: impl Into<String>, length: usize) -> Self {
        Self::new(name, FieldType::Text).length(length)
    }

    pub fn integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Integer)
    }

    pub fn small_integer(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::SmallInteger)
    }

    pub fn double(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Double)
    }

    pub fn date(name: impl Into<String>) -> Self {
        Self::new(name, FieldType::Date)
    }

    pub fn geometry(name: impl Into<String>, geometry_type: GeometryType) -> Self {
        let mut f = Self::new(name, FieldType::Geometry);
        f.geometry_type = Some(geometry_type);
        f
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Marks the field non-nullable.
    pub fn required(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn domain(mut self, domain: impl Into<NameRef>) -> Self {
        self.domain = Some(domain.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDescription {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

impl IndexDescription {
    pub fn new<I, S>(name: impl Into<String>, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            fields: fields.into_iter().map(Into::into).collect(),
            unique: false,
        }
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }
}

/// Table, feature class or annotation class description.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDescription {
    pub name: String,
    pub alias: Option<String>,
    pub kind: DatasetKind,
    pub fields: Vec<FieldDescription>,
    pub object_id_field: String,
    /// Shape field name; feature classes default to `SHAPE`.
    pub shape_field: Option<String>,
    pub feature_dataset: Option<NameRef>,
    pub indexes: Vec<IndexDescription>,
}

impl TableDescription {
    /// Plain (non-spatial) table.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            alias: None,
            kind: DatasetKind::Table,
            fields: Vec::new(),
            object_id_field: DEFAULT_OBJECT_ID_FIELD.to_string(),
            shape_field: None,
            feature_dataset: None,
            indexes: Vec::new(),
        }
    }

    pub fn feature_class(name: impl Into<String>, geometry_type: GeometryType) -> Self {
        let mut desc = Self::new(name);
        desc.kind = DatasetKind::FeatureClass { geometry_type };
        desc
    }

    /// Annotation class; text placements are stored as polygon shapes.
    pub fn annotation(name: impl Into<String>) -> Self {
        let mut desc = Self::new(name);
        desc.kind = DatasetKind::Annotation;
        desc
    }

    pub fn alias(mut self, alias: impl Into<String>) -> Self {
        self.alias = Some(alias.into());
        self
    }

    pub fn field(mut self, field: FieldDescription) -> Self {
        self.fields.push(field);
        self
    }

    pub fn object_id_field(mut self, name: impl Into<String>) -> Self {
        self.object_id_field = name.into();
        self
    }

    pub fn shape_field(mut self, name: impl Into<String>) -> Self {
        self.shape_field = Some(name.into());
        self
    }

    pub fn in_dataset(mut self, dataset: impl Into<NameRef>) -> Self {
        self.feature_dataset = Some(dataset.into());
        self
    }

    pub fn index(mut self, index: IndexDescription) -> Self {
        self.indexes.push(index);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipDescription {
    pub name: String,
    pub origin: NameRef,
    pub destination: NameRef,
    pub origin_primary_key: String,
    pub origin_foreign_key: String,
    pub cardinality: Cardinality,
    pub forward_label: Option<String>,
    pub backward_label: Option<String>,
}

impl RelationshipDescription {
    pub fn new(
        name: impl Into<String>,
        origin: impl Into<NameRef>,
        destination: impl Into<NameRef>,
        origin_primary_key: impl Into<String>,
        origin_foreign_key: impl Into<String>,
        cardinality: Cardinality,
    ) -> Self {
        Self {
            name: name.into(),
            origin: origin.into(),
            destination: destination.into(),
            origin_primary_key: origin_primary_key.into(),
            origin_foreign_key: origin_foreign_key.into(),
            cardinality,
            forward_label: None,
            backward_label: None,
        }
    }

    pub fn labels(mut self, forward: impl Into<String>, backward: impl Into<String>) -> Self {
        self.forward_label = Some(forward.into());
        self.backward_label = Some(backward.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureDatasetDescription {
    pub name: String,
    pub spatial_reference: Option<u32>,
}

impl FeatureDatasetDescription {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spatial_reference: None,
        }
    }

    pub fn spatial_reference(mut self, wkid: u32) -> Self {
        self.spatial_reference = Some(wkid);
        self
    }
}
