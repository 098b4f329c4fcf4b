//! Arrow export — cursor rows → `RecordBatch`.
//!
//! Column types follow the field type; geometry is exported as WKT text.

use crate::error::{GdxError, GdxResult};
use crate::schema::{FieldDefinition, FieldType, Value};
use arrow::array::{
    ArrayRef, BinaryBuilder, Date64Builder, Float64Builder, Int64Builder, StringBuilder,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::{RecordBatch, RecordBatchOptions};
use std::sync::Arc;

/// Arrow type a field exports as.
pub fn arrow_type(field_type: FieldType) -> DataType {
    match field_type {
        FieldType::ObjectId | FieldType::SmallInteger | FieldType::Integer => DataType::Int64,
        FieldType::Double => DataType::Float64,
        FieldType::Text | FieldType::Guid | FieldType::Geometry => DataType::Utf8,
        FieldType::Date => DataType::Date64,
        FieldType::Blob => DataType::Binary,
    }
}

pub fn arrow_schema(fields: &[FieldDefinition]) -> Schema {
    Schema::new(
        fields
            .iter()
            .map(|f| {
                Field::new(
                    &f.name,
                    arrow_type(f.field_type),
                    f.nullable && f.field_type != FieldType::ObjectId,
                )
            })
            .collect::<Vec<_>>(),
    )
}

/// Builds one batch; `rows[i][j]` is the value of `fields[j]`.
pub fn to_record_batch(fields: &[FieldDefinition], rows: &[Vec<Value>]) -> GdxResult<RecordBatch> {
    let schema = Arc::new(arrow_schema(fields));
    let columns = fields
        .iter()
        .enumerate()
        .map(|(i, f)| build_column(rows, i, f))
        .collect::<GdxResult<Vec<ArrayRef>>>()?;
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

fn mismatch(field: &FieldDefinition, value: &Value) -> GdxError {
    GdxError::Storage(format!(
        "cannot export {} value into {} column '{}'",
        value.type_name(),
        field.field_type,
        field.name
    ))
}

fn build_column(rows: &[Vec<Value>], idx: usize, field: &FieldDefinition) -> GdxResult<ArrayRef> {
    let cell = |row: &'_ Vec<Value>| row.get(idx).cloned().unwrap_or(Value::Null);
    match arrow_type(field.field_type) {
        DataType::Int64 => {
            let mut builder = Int64Builder::with_capacity(rows.len());
            for row in rows {
                match cell(row) {
                    Value::Integer(v) => builder.append_value(v),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(field, &other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Float64 => {
            let mut builder = Float64Builder::with_capacity(rows.len());
            for row in rows {
                match cell(row) {
                    Value::Double(v) => builder.append_value(v),
                    Value::Integer(v) => builder.append_value(v as f64),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(field, &other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Date64 => {
            let mut builder = Date64Builder::with_capacity(rows.len());
            for row in rows {
                match cell(row) {
                    Value::Date(ms) => builder.append_value(ms),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(field, &other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        DataType::Binary => {
            let mut builder = BinaryBuilder::with_capacity(rows.len(), 1024);
            for row in rows {
                match cell(row) {
                    Value::Blob(bytes) => builder.append_value(bytes),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(field, &other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
        _ => {
            let mut builder = StringBuilder::with_capacity(rows.len(), 256);
            for row in rows {
                match cell(row) {
                    Value::Text(s) | Value::Guid(s) => builder.append_value(s),
                    Value::Geometry(g) => builder.append_value(g.to_wkt()),
                    Value::Null => builder.append_null(),
                    other => return Err(mismatch(field, &other)),
                }
            }
            Ok(Arc::new(builder.finish()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Geometry;
    use crate::schema::FieldId;
    use arrow::array::{Array, Float64Array, Int64Array, StringArray};

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
    fn exports_typed_columns() {
        let fields = vec![
            field(0, "OBJECTID", FieldType::ObjectId),
            field(1, "NAME", FieldType::Text),
            field(2, "HEIGHT", FieldType::Double),
            field(3, "SHAPE", FieldType::Geometry),
        ];
        let rows = vec![
            vec![
                Value::Integer(1),
                Value::from("Pine"),
                Value::Double(12.5),
                Value::from(Geometry::point(1.0, 2.0)),
            ],
            vec![Value::Integer(2), Value::Null, Value::Null, Value::Null],
        ];
        let batch = to_record_batch(&fields, &rows).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 4);
        assert!(!batch.schema().field(0).is_nullable());

        let ids = batch.column(0).as_any().downcast_ref::<Int64Array>().unwrap();
        assert_eq!(ids.value(1), 2);
        let names = batch.column(1).as_any().downcast_ref::<StringArray>().unwrap();
        assert_eq!(names.value(0), "Pine");
        assert!(names.is_null(1));
        let heights = batch.column(2).as_any().downcast_ref::<Float64Array>().unwrap();
        assert_eq!(heights.value(0), 12.5);
        let shapes = batch.column(3).as_any().downcast_ref::<StringArray>().unwrap();
        assert!(shapes.value(0).starts_with("POINT"));
    }

    #[test]
    fn empty_projection_keeps_row_count() {
        let batch = to_record_batch(&[], &[vec![], vec![]]).unwrap();
        assert_eq!(batch.num_rows(), 2);
        assert_eq!(batch.num_columns(), 0);
    }
}
