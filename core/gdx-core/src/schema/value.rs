//! Field values and field types.

use crate::geometry::Geometry;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Storage type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Row identifier, assigned by the engine and read-only.
    ObjectId,
    SmallInteger,
    Integer,
    Double,
    Text,
    /// Milliseconds since the Unix epoch.
    Date,
    Guid,
    Blob,
    Geometry,
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::ObjectId => "ObjectID",
            FieldType::SmallInteger => "SmallInteger",
            FieldType::Integer => "Integer",
            FieldType::Double => "Double",
            FieldType::Text => "Text",
            FieldType::Date => "Date",
            FieldType::Guid => "GUID",
            FieldType::Blob => "Blob",
            FieldType::Geometry => "Geometry",
        };
        write!(f, "{}", name)
    }
}

impl FieldType {
    /// Converts `value` into this field's representation, or `None` on a type mismatch.
    ///
    /// Integers widen to doubles and text is accepted for GUIDs; nothing narrows.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (FieldType::SmallInteger, Value::Integer(v)) => {
                i16::try_from(v).ok().map(|_| Value::Integer(v))
            }
            (FieldType::Integer | FieldType::ObjectId, Value::Integer(v)) => Some(Value::Integer(v)),
            (FieldType::Double, Value::Double(v)) => Some(Value::Double(v)),
            (FieldType::Double, Value::Integer(v)) => Some(Value::Double(v as f64)),
            (FieldType::Text, Value::Text(s)) => Some(Value::Text(s)),
            (FieldType::Date, Value::Date(ms)) => Some(Value::Date(ms)),
            (FieldType::Guid, Value::Guid(g) | Value::Text(g)) => Some(Value::Guid(g)),
            (FieldType::Blob, Value::Blob(b)) => Some(Value::Blob(b)),
            (FieldType::Geometry, Value::Geometry(g)) => Some(Value::Geometry(g)),
            _ => None,
        }
    }
}

/// A single field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Integer(i64),
    Double(f64),
    Text(String),
    Date(i64),
    Guid(String),
    Blob(Vec<u8>),
    Geometry(Geometry),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(v) | Value::Date(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(v) | Value::Date(v) => Some(*v as f64),
            Value::Double(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) | Value::Guid(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_geometry(&self) -> Option<&Geometry> {
        match self {
            Value::Geometry(g) => Some(g),
            _ => None,
        }
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Integer(_) => "Integer",
            Value::Double(_) => "Double",
            Value::Text(_) => "Text",
            Value::Date(_) => "Date",
            Value::Guid(_) => "GUID",
            Value::Blob(_) => "Blob",
            Value::Geometry(_) => "Geometry",
        }
    }

    /// SQL comparison: `None` when either side is null or the types are incomparable.
    pub fn compare(&self, other: &Value, case_sensitive: bool) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) | (Value::Date(a), Value::Date(b)) => {
                Some(a.cmp(b))
            }
            (Value::Text(a), Value::Text(b))
            | (Value::Guid(a), Value::Guid(b))
            | (Value::Text(a), Value::Guid(b))
            | (Value::Guid(a), Value::Text(b)) => Some(if case_sensitive {
                a.cmp(b)
            } else {
                a.to_lowercase().cmp(&b.to_lowercase())
            }),
            (Value::Blob(a), Value::Blob(b)) => Some(a.cmp(b)),
            (Value::Geometry(_), _) | (_, Value::Geometry(_)) => None,
            (a, b) => {
                let (x, y) = (a.as_f64()?, b.as_f64()?);
                x.partial_cmp(&y)
            }
        }
    }

    /// Total order for sorting: nulls first, then by value, mixed types by type rank.
    pub fn sort_cmp(&self, other: &Value, case_sensitive: bool) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        self.compare(other, case_sensitive)
            .unwrap_or_else(|| self.rank().cmp(&other.rank()))
    }

    fn rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Integer(_) | Value::Double(_) | Value::Date(_) => 1,
            Value::Text(_) | Value::Guid(_) => 2,
            Value::Blob(_) => 3,
            Value::Geometry(_) => 4,
        }
    }

    /// SQL truthiness: non-zero numbers are true, null is unknown.
    pub fn truth(&self) -> Option<bool> {
        match self {
            Value::Null => None,
            Value::Integer(v) => Some(*v != 0),
            Value::Double(v) => Some(*v != 0.0),
            _ => Some(true),
        }
    }

    pub(crate) fn from_bool(b: bool) -> Value {
        Value::Integer(i64::from(b))
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "NULL"),
            Value::Integer(v) | Value::Date(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::Text(s) | Value::Guid(s) => write!(f, "{}", s),
            Value::Blob(b) => write!(f, "<{} bytes>", b.len()),
            Value::Geometry(g) => write!(f, "{}", g.to_wkt()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Value::Integer(i64::from(v))
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Blob(v)
    }
}

impl From<Geometry> for Value {
    fn from(g: Geometry) -> Self {
        Value::Geometry(g)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}
