use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

pub mod params;
pub mod result;
pub mod streaming;

pub use params::{
    FilterValue, Pagination, ParamsPatch, QueryDescription, QueryParams, SortDirection, SortParam,
};
pub use result::{ResultSet, SyncStatus};
pub use streaming::{
    BatchMetadata, Change, ChangeBatch, ChangeOrigin, Checkpoint, DocumentChange, WithMetadata,
};

/// A stored document: field name to value.
///
/// Documents are plain maps so the same type can carry products, orders or
/// customers without a per-collection struct.
pub type Document = HashMap<String, Value>;

/// Dynamically typed field value shared by documents, filters and REST payloads.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Value {
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Array(Vec<Value>),
    Object(HashMap<String, Value>),
    Null,
}

impl Value {
    /// Create a Value from a serde_json::Value
    pub fn from_json_value(v: serde_json::Value) -> Self {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Boolean(b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Integer(i)
                } else if let Some(f) = n.as_f64() {
                    Value::Float(f)
                } else {
                    Value::String(n.to_string())
                }
            }
            serde_json::Value::String(s) => Value::String(s),
            serde_json::Value::Array(arr) => {
                Value::Array(arr.into_iter().map(Value::from_json_value).collect())
            }
            serde_json::Value::Object(obj) => Value::Object(
                obj.into_iter()
                    .map(|(k, v)| (k, Value::from_json_value(v)))
                    .collect(),
            ),
        }
    }

    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Integer(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Object(obj) => Some(obj),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Text used for free-text matching. Numbers are rendered so that a SKU
    /// or barcode stored as an integer is still searchable.
    pub fn search_text(&self) -> Option<String> {
        match self {
            Value::String(s) => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            _ => None,
        }
    }

    /// Key form of a primary-key value. Integer and string ids map onto the
    /// same key space, so `1` and `"1"` address the same document.
    pub fn as_key(&self) -> Option<String> {
        match self {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Integer(i) => Some(i.to_string()),
            Value::Float(f) if f.fract() == 0.0 => Some((*f as i64).to_string()),
            _ => None,
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) | Value::Float(_) => 2,
            Value::String(_) => 3,
            Value::Array(_) => 4,
            Value::Object(_) => 5,
        }
    }

    /// Total order over values of any type.
    ///
    /// Values of different kinds order by kind
    /// (null < bool < number < string < array < object); integers and floats
    /// compare numerically with each other.
    pub fn total_cmp(&self, other: &Value) -> Ordering {
        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Integer(_) | Value::Float(_), Value::Integer(_) | Value::Float(_)) => {
                let a = self.as_f64().unwrap_or_default();
                let b = other.as_f64().unwrap_or_default();
                a.total_cmp(&b)
            }
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Array(a), Value::Array(b)) => {
                for (x, y) in a.iter().zip(b.iter()) {
                    let ord = x.total_cmp(y);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                a.len().cmp(&b.len())
            }
            (Value::Object(a), Value::Object(b)) => {
                let mut a_keys: Vec<_> = a.keys().collect();
                let mut b_keys: Vec<_> = b.keys().collect();
                a_keys.sort();
                b_keys.sort();
                let ord = a_keys.cmp(&b_keys);
                if ord != Ordering::Equal {
                    return ord;
                }
                for key in a_keys {
                    let ord = a[key].total_cmp(&b[key]);
                    if ord != Ordering::Equal {
                        return ord;
                    }
                }
                Ordering::Equal
            }
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    /// Equality under [`Value::total_cmp`], so `1` equals `1.0`.
    pub fn loosely_equals(&self, other: &Value) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }

    pub fn to_json_string(&self) -> String {
        serde_json::Value::from(self.clone()).to_string()
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Boolean(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Integer(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Integer(i as i64)
    }
}

impl From<u32> for Value {
    fn from(u: u32) -> Self {
        Value::Integer(u as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl<T> From<Vec<T>> for Value
where
    T: Into<Value>,
{
    fn from(v: Vec<T>) -> Self {
        Value::Array(v.into_iter().map(|x| x.into()).collect())
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(opt: Option<T>) -> Self {
        match opt {
            Some(v) => v.into(),
            None => Value::Null,
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::from_json_value(v)
    }
}

impl From<Value> for serde_json::Value {
    fn from(v: Value) -> Self {
        match v {
            Value::String(s) => serde_json::Value::String(s),
            Value::Integer(i) => serde_json::Value::Number(serde_json::Number::from(i)),
            Value::Float(f) => serde_json::Number::from_f64(f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Boolean(b) => serde_json::Value::Bool(b),
            Value::Array(arr) => {
                serde_json::Value::Array(arr.into_iter().map(Into::into).collect())
            }
            Value::Object(obj) => {
                serde_json::Value::Object(obj.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
            Value::Null => serde_json::Value::Null,
        }
    }
}

/// Build a document from `(field, value)` pairs.
pub fn document<K, V, I>(fields: I) -> Document
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Structured error types for query and sync operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum ApiError {
    #[error("Collection unavailable: {collection}")]
    CollectionUnavailable { collection: String },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Query disposed: {fingerprint}")]
    QueryDisposed { fingerprint: String },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },

    #[error("Internal error: {message}")]
    InternalError { message: String },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        ApiError::NetworkError {
            message: message.into(),
        }
    }

    pub fn collection_unavailable(collection: impl Into<String>) -> Self {
        ApiError::CollectionUnavailable {
            collection: collection.into(),
        }
    }

    /// Transient errors leave the query usable; the caller decides whether to retry.
    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::NetworkError { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_accessors() {
        let v = Value::Boolean(true);
        assert_eq!(v.as_bool(), Some(true));
        assert_eq!(v.as_i64(), None);

        let v = Value::Integer(42);
        assert_eq!(v.as_i64(), Some(42));
        assert_eq!(v.as_f64(), Some(42.0));

        let v = Value::String("hello".to_string());
        assert_eq!(v.as_string(), Some("hello"));

        assert!(Value::Null.is_null());
    }

    #[test]
    fn test_value_from() {
        let v: Value = 42i64.into();
        assert_eq!(v, Value::Integer(42));

        let v: Value = None::<i64>.into();
        assert_eq!(v, Value::Null);

        let v: Value = vec!["a", "b"].into();
        assert_eq!(
            v,
            Value::Array(vec![Value::from("a"), Value::from("b")])
        );
    }

    #[test]
    fn test_total_cmp_orders_by_kind_then_value() {
        let mut values = vec![
            Value::from("b"),
            Value::Integer(3),
            Value::Null,
            Value::Float(1.5),
            Value::Boolean(true),
            Value::from("a"),
        ];
        values.sort_by(|a, b| a.total_cmp(b));
        assert_eq!(
            values,
            vec![
                Value::Null,
                Value::Boolean(true),
                Value::Float(1.5),
                Value::Integer(3),
                Value::from("a"),
                Value::from("b"),
            ]
        );
    }

    #[test]
    fn test_integer_and_float_compare_numerically() {
        assert!(Value::Integer(1).loosely_equals(&Value::Float(1.0)));
        assert!(!Value::Integer(1).loosely_equals(&Value::from("1")));
    }

    #[test]
    fn test_key_form() {
        assert_eq!(Value::Integer(7).as_key(), Some("7".to_string()));
        assert_eq!(Value::from("7").as_key(), Some("7".to_string()));
        assert_eq!(Value::from("").as_key(), None);
        assert_eq!(Value::Null.as_key(), None);
    }

    #[test]
    fn test_json_conversion() {
        let json = serde_json::json!({"id": 1, "name": "Mug", "price": 4.5, "tags": ["a"]});
        let value = Value::from_json_value(json.clone());
        let obj = value.as_object().unwrap();
        assert_eq!(obj["id"], Value::Integer(1));
        assert_eq!(obj["price"], Value::Float(4.5));
        assert_eq!(serde_json::Value::from(value), json);
    }

    #[test]
    fn test_search_text() {
        assert_eq!(Value::Integer(1234).search_text(), Some("1234".to_string()));
        assert_eq!(Value::Boolean(true).search_text(), None);
    }
}
