//! API 트레이트 정의

use crate::api::row::Row;
use crate::error::{GdxError, GdxResult};
use crate::geometry::Geometry;
use crate::schema::{FieldType, TableDescription, Value};

/// Row에서 구조체로 변환하는 트레이트
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> GdxResult<Self>;
}

/// Structs that describe their own table; implemented by `#[derive(Table)]`.
pub trait TableSchema {
    const TABLE_NAME: &'static str;
    fn description() -> TableDescription;
}

/// Rust 타입을 FieldType으로 변환하는 트레이트
pub trait IntoFieldType {
    fn field_type() -> FieldType;
    fn is_nullable() -> bool {
        false
    }
}

/// Value에서 Rust 타입으로 변환하는 트레이트
pub trait FromValue: Sized {
    fn from_value(value: &Value) -> GdxResult<Self>;
}

fn mismatch(expected: &str, value: &Value) -> GdxError {
    GdxError::Validation(format!("expected {}, got {}", expected, value.type_name()))
}

// 기본 타입 구현
impl IntoFieldType for i16 {
    fn field_type() -> FieldType {
        FieldType::SmallInteger
    }
}

impl FromValue for i16 {
    fn from_value(value: &Value) -> GdxResult<Self> {
        value
            .as_i64()
            .and_then(|v| i16::try_from(v).ok())
            .ok_or_else(|| mismatch("SmallInteger", value))
    }
}

impl IntoFieldType for i32 {
    fn field_type() -> FieldType {
        FieldType::Integer
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> GdxResult<Self> {
        value
            .as_i64()
            .and_then(|v| i32::try_from(v).ok())
            .ok_or_else(|| mismatch("Integer", value))
    }
}

impl IntoFieldType for i64 {
    fn field_type() -> FieldType {
        FieldType::Integer
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> GdxResult<Self> {
        value.as_i64().ok_or_else(|| mismatch("Integer", value))
    }
}

impl IntoFieldType for f64 {
    fn field_type() -> FieldType {
        FieldType::Double
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> GdxResult<Self> {
        value.as_f64().ok_or_else(|| mismatch("Double", value))
    }
}

impl IntoFieldType for String {
    fn field_type() -> FieldType {
        FieldType::Text
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> GdxResult<Self> {
        value
            .as_str()
            .map(str::to_string)
            .ok_or_else(|| mismatch("Text", value))
    }
}

impl IntoFieldType for Vec<u8> {
    fn field_type() -> FieldType {
        FieldType::Blob
    }
}

impl FromValue for Vec<u8> {
    fn from_value(value: &Value) -> GdxResult<Self> {
        match value {
            Value::Blob(b) => Ok(b.clone()),
            other => Err(mismatch("Blob", other)),
        }
    }
}

impl IntoFieldType for Geometry {
    fn field_type() -> FieldType {
        FieldType::Geometry
    }
}

impl FromValue for Geometry {
    fn from_value(value: &Value) -> GdxResult<Self> {
        value
            .as_geometry()
            .cloned()
            .ok_or_else(|| mismatch("Geometry", value))
    }
}

impl<T: IntoFieldType> IntoFieldType for Option<T> {
    fn field_type() -> FieldType {
        T::field_type()
    }
    fn is_nullable() -> bool {
        true
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> GdxResult<Self> {
        if value.is_null() {
            Ok(None)
        } else {
            T::from_value(value).map(Some)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scalar_conversions() {
        assert_eq!(i32::from_value(&Value::Integer(5)).unwrap(), 5);
        assert!(i16::from_value(&Value::Integer(70_000)).is_err());
        assert_eq!(String::from_value(&Value::from("a")).unwrap(), "a");
        assert_eq!(Option::<f64>::from_value(&Value::Null).unwrap(), None);
        assert!(String::from_value(&Value::Integer(1)).is_err());
        assert!(Option::<String>::is_nullable());
        assert_eq!(<Option<i16>>::field_type(), FieldType::SmallInteger);
    }
}
