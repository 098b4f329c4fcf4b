//! Row — 커서와 get_row가 반환하는 행

use crate::api::traits::FromRow;
use crate::error::{GdxError, GdxResult};
use crate::geometry::Geometry;
use crate::schema::{FieldDefinition, RowId, Value};
use std::sync::Arc;

/// One visible row, values ordered like `fields`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    row_id: RowId,
    fields: Arc<[FieldDefinition]>,
    values: Vec<Value>,
    shape: Option<usize>,
}

impl Row {
    pub(crate) fn new(
        row_id: RowId,
        fields: Arc<[FieldDefinition]>,
        values: Vec<Value>,
        shape: Option<usize>,
    ) -> Self {
        Self {
            row_id,
            fields,
            values,
            shape,
        }
    }

    pub fn row_id(&self) -> RowId {
        self.row_id
    }

    pub fn fields(&self) -> &[FieldDefinition] {
        &self.fields
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Value by field name (case-insensitive).
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .position(|f| f.name.eq_ignore_ascii_case(name))
            .map(|i| &self.values[i])
    }

    /// Like [`get`](Self::get), failing with `FieldNotFound` for an absent field.
    pub fn value(&self, name: &str) -> GdxResult<&Value> {
        self.get(name).ok_or_else(|| GdxError::FieldNotFound {
            table: String::new(),
            field: name.to_string(),
        })
    }

    /// Shape of a feature row; `None` for tables or a projection without the shape field.
    pub fn shape(&self) -> Option<&Geometry> {
        self.shape.and_then(|i| self.values[i].as_geometry())
    }

    pub fn into_values(self) -> Vec<Value> {
        self.values
    }

    /// Decodes the row into a typed struct.
    pub fn decode<T: FromRow>(&self) -> GdxResult<T> {
        T::from_row(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldId, FieldType};

    fn field(id: u32, name: &str, field_type: FieldType) -> FieldDefinition {
        FieldDefinition {
            id: FieldId(id),
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

    #[test]
    fn lookup_by_name_and_shape() {
        let fields: Arc<[FieldDefinition]> = vec![
            field(0, "OBJECTID", FieldType::ObjectId),
            field(1, "NAME", FieldType::Text),
            field(2, "SHAPE", FieldType::Geometry),
        ]
        .into();
        let row = Row::new(
            7,
            fields,
            vec![
                Value::Integer(7),
                Value::from("Pine"),
                Value::from(Geometry::point(1.0, 2.0)),
            ],
            Some(2),
        );
        assert_eq!(row.row_id(), 7);
        assert_eq!(row.get("name"), Some(&Value::from("Pine")));
        assert!(row.get("HEIGHT").is_none());
        assert!(row.value("HEIGHT").is_err());
        assert_eq!(row.shape(), Some(&Geometry::point(1.0, 2.0)));
        assert_eq!(row.len(), 3);
    }
}
