//! Catalog — 데이터셋 정의 레지스트리
//!
//! Holds every table, feature class, domain, relationship class and feature
//! dataset definition. A catalog is immutable once published; the schema builder
//! edits a clone and swaps it in as a whole.

use crate::error::{GdxError, GdxResult};
use crate::geometry::GeometryType;
use crate::schema::value::{FieldType, Value};
use crate::storage::delta_store::Record;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Row identifier. Assigned from a per-table counter shared by every version.
pub type RowId = i64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TableId(pub u32);

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stable field identifier; survives renames so stored deltas never need rewriting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FieldId(pub u32);

/// Tagged dataset variant shared by every table-like object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DatasetKind {
    Table,
    FeatureClass { geometry_type: GeometryType },
    Annotation,
    Relationship,
}

impl DatasetKind {
    pub fn is_spatial(self) -> bool {
        matches!(self, DatasetKind::FeatureClass { .. } | DatasetKind::Annotation)
    }

    pub fn geometry_type(self) -> Option<GeometryType> {
        match self {
            DatasetKind::FeatureClass { geometry_type } => Some(geometry_type),
            DatasetKind::Annotation => Some(GeometryType::Polygon),
            _ => None,
        }
    }
}

impl fmt::Display for DatasetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatasetKind::Table => write!(f, "table"),
            DatasetKind::FeatureClass { geometry_type } => {
                write!(f, "{} feature class", geometry_type)
            }
            DatasetKind::Annotation => write!(f, "annotation feature class"),
            DatasetKind::Relationship => write!(f, "relationship class"),
        }
    }
}

/// Shared capability of everything the catalog can describe.
pub trait Dataset {
    fn name(&self) -> &str;
    fn kind(&self) -> DatasetKind;
}

// ════════════════════════════════════════════
// Fields & domains
// ════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub id: FieldId,
    pub name: String,
    pub alias: Option<String>,
    pub field_type: FieldType,
    pub nullable: bool,
    /// Maximum character count for text fields.
    pub length: Option<usize>,
    pub default: Option<Value>,
    pub domain: Option<String>,
    /// Shape type enforced on geometry fields.
    pub geometry_type: Option<GeometryType>,
}

impl FieldDefinition {
    /// Value a row shows for this field when no value was ever stored.
    pub fn fallback(&self) -> Value {
        self.default.clone().unwrap_or(Value::Null)
    }

    /// Coerces and validates a value destined for this field.
    pub(crate) fn check_value(&self, table: &str, value: Value, catalog: &Catalog) -> GdxResult<Value> {
        if self.field_type == FieldType::ObjectId {
            return Err(GdxError::constraint(table, &self.name, "object id is read-only"));
        }
        let type_name = value.type_name();
        let value = self.field_type.coerce(value).ok_or_else(|| {
            GdxError::constraint(
                table,
                &self.name,
                format!("expected {}, got {}", self.field_type, type_name),
            )
        })?;

        if value.is_null() {
            if !self.nullable {
                return Err(GdxError::constraint(table, &self.name, "value is required"));
            }
            return Ok(value);
        }

        if let (Some(max), Value::Text(s)) = (self.length, &value) {
            let len = s.chars().count();
            if len > max {
                return Err(GdxError::constraint(
                    table,
                    &self.name,
                    format!("text length {} exceeds {}", len, max),
                ));
            }
        }

        if let Value::Geometry(g) = &value {
            g.validate()
                .map_err(|e| GdxError::constraint(table, &self.name, e.to_string()))?;
            if let Some(expected) = self.geometry_type
                && g.geometry_type() != expected
            {
                return Err(GdxError::constraint(
                    table,
                    &self.name,
                    format!("expected {} shape, got {}", expected, g.geometry_type()),
                ));
            }
        }

        if let Some(domain_name) = &self.domain {
            let domain = catalog
                .domain(domain_name)
                .ok_or_else(|| GdxError::DomainNotFound(domain_name.clone()))?;
            domain
                .check(&value)
                .map_err(|message| GdxError::constraint(table, &self.name, message))?;
        }

        Ok(value)
    }
}

/// Attribute domain restricting the values a field accepts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Domain {
    Coded {
        name: String,
        field_type: FieldType,
        /// (code, description)
        codes: Vec<(Value, String)>,
    },
    Range {
        name: String,
        field_type: FieldType,
        min: Value,
        max: Value,
    },
}

impl Domain {
    pub fn name(&self) -> &str {
        match self {
            Domain::Coded { name, .. } | Domain::Range { name, .. } => name,
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Domain::Coded { field_type, .. } | Domain::Range { field_type, .. } => *field_type,
        }
    }

    pub(crate) fn set_name(&mut self, new_name: String) {
        match self {
            Domain::Coded { name, .. } | Domain::Range { name, .. } => *name = new_name,
        }
    }

    /// Checks membership; the error message names the offending value.
    pub fn check(&self, value: &Value) -> Result<(), String> {
        match self {
            Domain::Coded { name, codes, .. } => {
                if codes
                    .iter()
                    .any(|(code, _)| code.compare(value, true) == Some(std::cmp::Ordering::Equal))
                {
                    Ok(())
                } else {
                    Err(format!("value {} is not a code of domain '{}'", value, name))
                }
            }
            Domain::Range { name, min, max, .. } => {
                let above = value.compare(min, true).is_some_and(|o| o.is_ge());
                let below = value.compare(max, true).is_some_and(|o| o.is_le());
                if above && below {
                    Ok(())
                } else {
                    Err(format!(
                        "value {} outside range {}..={} of domain '{}'",
                        value, min, max, name
                    ))
                }
            }
        }
    }

    pub fn description_of(&self, value: &Value) -> Option<&str> {
        match self {
            Domain::Coded { codes, .. } => codes
                .iter()
                .find(|(code, _)| code == value)
                .map(|(_, desc)| desc.as_str()),
            Domain::Range { .. } => None,
        }
    }
}

// ════════════════════════════════════════════
// Tables
// ════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexDefinition {
    pub name: String,
    pub fields: Vec<String>,
    pub unique: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableDefinition {
    pub id: TableId,
    pub name: String,
    pub alias: Option<String>,
    pub kind: DatasetKind,
    pub fields: Vec<FieldDefinition>,
    pub object_id_field: String,
    pub shape_field: Option<String>,
    pub feature_dataset: Option<String>,
    pub indexes: Vec<IndexDefinition>,
    pub(crate) next_field_id: u32,
}

impl Dataset for TableDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DatasetKind {
        self.kind
    }
}

impl TableDefinition {
    pub fn is_spatial(&self) -> bool {
        self.kind.is_spatial()
    }

    /// Case-insensitive field lookup.
    pub fn field(&self, name: &str) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field_by_id(&self, id: FieldId) -> Option<&FieldDefinition> {
        self.fields.iter().find(|f| f.id == id)
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.iter().map(|f| f.name.clone()).collect()
    }

    /// Lookup used by predicates, sub-fields and sort keys.
    pub fn resolve_field(&self, name: &str) -> GdxResult<&FieldDefinition> {
        self.field(name).ok_or_else(|| GdxError::InvalidFieldReference {
            table: self.name.clone(),
            field: name.to_string(),
        })
    }

    pub fn object_id(&self) -> FieldId {
        self.field(&self.object_id_field)
            .map(|f| f.id)
            .unwrap_or(FieldId(0))
    }

    pub fn shape(&self) -> Option<&FieldDefinition> {
        self.shape_field.as_deref().and_then(|name| self.field(name))
    }

    /// Builds a stored record from caller-supplied values.
    ///
    /// `base` is the visible record for updates; fields it lacks keep their
    /// fallback. Creates (`base == None`) fill defaults and require every
    /// non-nullable field.
    pub(crate) fn build_record<I>(&self, values: I, base: Option<&Record>, catalog: &Catalog) -> GdxResult<Record>
    where
        I: IntoIterator<Item = (String, Value)>,
    {
        let mut record = base.cloned().unwrap_or_default();
        let creating = base.is_none();
        for (name, value) in values {
            let field = self.field(&name).ok_or_else(|| GdxError::FieldNotFound {
                table: self.name.clone(),
                field: name.clone(),
            })?;
            let value = field.check_value(&self.name, value, catalog)?;
            record.insert(field.id, value);
        }
        for field in &self.fields {
            if field.field_type == FieldType::ObjectId {
                continue;
            }
            if creating && !record.contains_key(&field.id) {
                if let Some(default) = &field.default {
                    record.insert(field.id, default.clone());
                }
            }
            let present = record.get(&field.id).is_some_and(|v| !v.is_null())
                || (!record.contains_key(&field.id) && field.default.is_some());
            if !field.nullable && !present {
                return Err(GdxError::constraint(&self.name, &field.name, "value is required"));
            }
        }
        Ok(record)
    }

    /// Visible value of a field for a stored record.
    pub fn value_of(&self, row_id: RowId, record: &Record, field: &FieldDefinition) -> Value {
        if field.field_type == FieldType::ObjectId {
            return Value::Integer(row_id);
        }
        record.get(&field.id).cloned().unwrap_or_else(|| field.fallback())
    }
}

// ════════════════════════════════════════════
// Relationships & feature datasets
// ════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Cardinality {
    OneToOne,
    OneToMany,
}

/// Relationship class linking origin rows to destination rows by key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelationshipDefinition {
    pub name: String,
    pub origin_table: String,
    pub destination_table: String,
    /// Key field on the origin table.
    pub origin_primary_key: String,
    /// Field on the destination table holding the origin key.
    pub origin_foreign_key: String,
    pub cardinality: Cardinality,
    pub forward_label: Option<String>,
    pub backward_label: Option<String>,
}

impl Dataset for RelationshipDefinition {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> DatasetKind {
        DatasetKind::Relationship
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureDataset {
    pub name: String,
    /// Well-known spatial reference id shared by member feature classes.
    pub spatial_reference: Option<u32>,
}

// ════════════════════════════════════════════
// Catalog
// ════════════════════════════════════════════

/// Published schema. Keys of the name maps are lower-cased.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    pub(crate) tables: BTreeMap<TableId, Arc<TableDefinition>>,
    pub(crate) domains: BTreeMap<String, Domain>,
    pub(crate) relationships: BTreeMap<String, RelationshipDefinition>,
    pub(crate) feature_datasets: BTreeMap<String, FeatureDataset>,
    pub(crate) next_table_id: u32,
}

impl Catalog {
    pub fn table(&self, id: TableId) -> Option<&Arc<TableDefinition>> {
        self.tables.get(&id)
    }

    pub fn table_by_name(&self, name: &str) -> Option<&Arc<TableDefinition>> {
        self.tables
            .values()
            .find(|t| t.name.eq_ignore_ascii_case(name))
    }

    pub fn require_table(&self, name: &str) -> GdxResult<&Arc<TableDefinition>> {
        self.table_by_name(name)
            .ok_or_else(|| GdxError::TableNotFound(name.to_string()))
    }

    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDefinition>> {
        self.tables.values()
    }

    pub fn domain(&self, name: &str) -> Option<&Domain> {
        self.domains.get(&name.to_lowercase())
    }

    pub fn domains(&self) -> impl Iterator<Item = &Domain> {
        self.domains.values()
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipDefinition> {
        self.relationships.get(&name.to_lowercase())
    }

    pub fn relationships(&self) -> impl Iterator<Item = &RelationshipDefinition> {
        self.relationships.values()
    }

    pub fn feature_dataset(&self, name: &str) -> Option<&FeatureDataset> {
        self.feature_datasets.get(&name.to_lowercase())
    }

    pub fn feature_datasets(&self) -> impl Iterator<Item = &FeatureDataset> {
        self.feature_datasets.values()
    }

    /// Any dataset (table-like or relationship class) by name.
    pub fn dataset(&self, name: &str) -> Option<&dyn Dataset> {
        if let Some(t) = self.table_by_name(name) {
            return Some(t.as_ref());
        }
        self.relationship(name).map(|r| r as &dyn Dataset)
    }

    pub fn dataset_exists(&self, name: &str) -> bool {
        self.dataset(name).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;

    fn trees() -> (Catalog, TableDefinition) {
        let mut catalog = Catalog::default();
        catalog.domains.insert(
            "height".into(),
            Domain::Range {
                name: "Height".into(),
                field_type: FieldType::Double,
                min: Value::Double(0.0),
                max: Value::Double(120.0),
            },
        );
        let field = |id, name: &str, field_type, nullable| FieldDefinition {
            id: FieldId(id),
            name: name.into(),
            alias: None,
            field_type,
            nullable,
            length: None,
            default: None,
            domain: None,
            geometry_type: None,
        };
        let mut name = field(1, "NAME", FieldType::Text, false);
        name.length = Some(8);
        let mut height = field(2, "HEIGHT", FieldType::Double, true);
        height.domain = Some("Height".into());
        let mut status = field(3, "STATUS", FieldType::Text, false);
        status.default = Some(Value::from("planted"));
        let mut shape = field(4, "SHAPE", FieldType::Geometry, true);
        shape.geometry_type = Some(GeometryType::Point);
        let table = TableDefinition {
            id: TableId(1),
            name: "Trees".into(),
            alias: None,
            kind: DatasetKind::FeatureClass {
                geometry_type: GeometryType::Point,
            },
            fields: vec![
                field(0, "OBJECTID", FieldType::ObjectId, false),
                name,
                height,
                status,
                shape,
            ],
            object_id_field: "OBJECTID".into(),
            shape_field: Some("SHAPE".into()),
            feature_dataset: None,
            indexes: Vec::new(),
            next_field_id: 5,
        };
        (catalog, table)
    }

    fn vals(pairs: &[(&str, Value)]) -> Vec<(String, Value)> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn create_fills_defaults() {
        let (catalog, table) = trees();
        let record = table
            .build_record(vals(&[("name", Value::from("Pine"))]), None, &catalog)
            .unwrap();
        assert_eq!(record.get(&FieldId(3)), Some(&Value::from("planted")));
        assert_eq!(record.get(&FieldId(1)), Some(&Value::from("Pine")));
    }

    #[test]
    fn required_field_missing_is_violation() {
        let (catalog, table) = trees();
        let err = table
            .build_record(vals(&[("HEIGHT", Value::from(3.0))]), None, &catalog)
            .unwrap_err();
        assert!(matches!(err, GdxError::ConstraintViolation { ref field, .. } if field == "NAME"));
    }

    #[test]
    fn domain_length_and_shape_checks() {
        let (catalog, table) = trees();
        let too_tall = table.build_record(
            vals(&[("NAME", Value::from("Oak")), ("HEIGHT", Value::from(500.0))]),
            None,
            &catalog,
        );
        assert!(matches!(too_tall, Err(GdxError::ConstraintViolation { .. })));

        let too_long = table.build_record(
            vals(&[("NAME", Value::from("Sequoiadendron"))]),
            None,
            &catalog,
        );
        assert!(matches!(too_long, Err(GdxError::ConstraintViolation { .. })));

        let wrong_shape = table.build_record(
            vals(&[
                ("NAME", Value::from("Fir")),
                ("SHAPE", Value::from(Geometry::polyline(&[(0.0, 0.0), (1.0, 1.0)]))),
            ]),
            None,
            &catalog,
        );
        assert!(matches!(wrong_shape, Err(GdxError::ConstraintViolation { .. })));
    }

    #[test]
    fn unknown_field_and_object_id_writes_fail() {
        let (catalog, table) = trees();
        assert!(matches!(
            table.build_record(vals(&[("GIRTH", Value::from(1))]), None, &catalog),
            Err(GdxError::FieldNotFound { .. })
        ));
        assert!(matches!(
            table.build_record(vals(&[("OBJECTID", Value::from(1))]), None, &catalog),
            Err(GdxError::ConstraintViolation { .. })
        ));
    }

    #[test]
    fn update_keeps_untouched_fields() {
        let (catalog, table) = trees();
        let base = table
            .build_record(vals(&[("NAME", Value::from("Pine"))]), None, &catalog)
            .unwrap();
        let updated = table
            .build_record(vals(&[("HEIGHT", Value::from(12))]), Some(&base), &catalog)
            .unwrap();
        assert_eq!(updated.get(&FieldId(1)), Some(&Value::from("Pine")));
        assert_eq!(updated.get(&FieldId(2)), Some(&Value::Double(12.0)));
    }

    #[test]
    fn coded_domain_membership() {
        let domain = Domain::Coded {
            name: "Species".into(),
            field_type: FieldType::Text,
            codes: vec![(Value::from("PI"), "Pine".into()), (Value::from("OA"), "Oak".into())],
        };
        assert!(domain.check(&Value::from("PI")).is_ok());
        assert!(domain.check(&Value::from("XX")).is_err());
        assert_eq!(domain.description_of(&Value::from("OA")), Some("Oak"));
    }
}
