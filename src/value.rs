//! The closed set of typed values a compiled query can bind.

use crate::ast::raw::RawFragment;
use chrono::{DateTime, Utc};

/// A single bound parameter value.
///
/// `Decimal` is carried as its canonical string form rather than a float to avoid
/// precision loss; drivers that want a native decimal type parse it themselves via
/// `Driver::prep_bindings`.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Decimal(String),
    Text(String),
    Blob(Vec<u8>),
    /// A timestamp with explicit timezone intent (always normalized to UTC on entry).
    Timestamp(DateTime<Utc>),
    Json(serde_json::Value),
    /// An embedded raw fragment that itself expands at compile time.
    Raw(Box<RawFragment>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

macro_rules! impl_from_int {
    ($($t:ty),*) => {
        $(impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::Int(v as i64)
            }
        })*
    };
}
impl_from_int!(i8, i16, i32, i64, u8, u16, u32);

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Value::Float(v as f64)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
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

impl From<DateTime<Utc>> for Value {
    fn from(v: DateTime<Utc>) -> Self {
        Value::Timestamp(v)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Json(v)
    }
}

impl From<RawFragment> for Value {
    fn from(v: RawFragment) -> Self {
        Value::Raw(Box::new(v))
    }
}

impl<T> From<Option<T>> for Value
where
    Value: From<T>,
{
    fn from(v: Option<T>) -> Self {
        match v {
            Some(v) => Value::from(v),
            None => Value::Null,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn option_none_becomes_null() {
        let v: Value = Option::<i32>::None.into();
        assert_eq!(v, Value::Null);
        assert!(v.is_null());
    }

    #[test]
    fn option_some_delegates_to_inner_conversion() {
        let v: Value = Some(5i32).into();
        assert_eq!(v, Value::Int(5));
    }

    #[test]
    fn integer_widths_all_become_int() {
        assert_eq!(Value::from(1i8), Value::Int(1));
        assert_eq!(Value::from(2u32), Value::Int(2));
        assert_eq!(Value::from(3i64), Value::Int(3));
    }

    #[test]
    fn strings_become_text() {
        assert_eq!(Value::from("hi"), Value::Text("hi".to_string()));
        assert_eq!(Value::from(String::from("hi")), Value::Text("hi".to_string()));
    }
}
