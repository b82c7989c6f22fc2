//! Dynamic values exchanged through request and response formats.
//!
//! # Design
//! Every built-in format encodes from and decodes to `Value`. The variant
//! set is the union of what JSON, EDN and transit can express: keywords and
//! symbols survive EDN and transit round-trips, while the JSON conversion
//! flattens them to their names. Maps keep insertion order so encoded
//! output (query strings, JSON objects) follows the caller's ordering.

use std::fmt;

use bytes::Bytes;

/// A dynamically typed value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    /// A keyword, stored without its leading colon (`:user/id` → `user/id`).
    Keyword(String),
    Symbol(String),
    Bytes(Bytes),
    List(Vec<Value>),
    Set(Vec<Value>),
    /// Ordered key/value pairs.
    Map(Vec<(Value, Value)>),
    /// A tagged element such as `#inst "..."` or a transit extension type.
    Tagged(String, Box<Value>),
}

impl Value {
    pub fn keyword(name: &str) -> Self {
        Value::Keyword(name.to_string())
    }

    pub fn symbol(name: &str) -> Self {
        Value::Symbol(name.to_string())
    }

    /// Build a map from key/value pairs, preserving their order.
    pub fn map<K, V, I>(pairs: I) -> Self
    where
        K: Into<Value>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Value::Map(pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn list<V: Into<Value>, I: IntoIterator<Item = V>>(items: I) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }

    /// Look up a map entry whose key is the string or keyword `key`.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(pairs) => pairs
                .iter()
                .find(|(k, _)| matches!(k, Value::Str(s) | Value::Keyword(s) if s == key))
                .map(|(_, v)| v),
            _ => None,
        }
    }

    /// The name used when this value is a map key in a string-keyed format.
    pub fn key_name(&self) -> String {
        match self {
            Value::Str(s) | Value::Keyword(s) | Value::Symbol(s) => s.clone(),
            Value::Nil => "null".to_string(),
            other => other.to_string(),
        }
    }

    /// Convert into a `serde_json::Value`. Keywords and symbols become their
    /// names, map keys are stringified, tagged values lose their tag.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as J;
        match self {
            Value::Nil => J::Null,
            Value::Bool(b) => J::Bool(*b),
            Value::Int(n) => J::from(*n),
            Value::Float(f) => serde_json::Number::from_f64(*f).map(J::Number).unwrap_or(J::Null),
            Value::Str(s) | Value::Keyword(s) | Value::Symbol(s) => J::String(s.clone()),
            Value::Bytes(b) => J::Array(b.iter().map(|byte| J::from(*byte)).collect()),
            Value::List(items) | Value::Set(items) => J::Array(items.iter().map(Value::to_json).collect()),
            Value::Map(pairs) => J::Object(
                pairs
                    .iter()
                    .map(|(k, v)| (k.key_name(), v.to_json()))
                    .collect(),
            ),
            Value::Tagged(_, inner) => inner.to_json(),
        }
    }

    /// Convert from a `serde_json::Value`. With `keywords` set, object keys
    /// become keywords instead of strings.
    pub fn from_json(json: &serde_json::Value, keywords: bool) -> Self {
        use serde_json::Value as J;
        match json {
            J::Null => Value::Nil,
            J::Bool(b) => Value::Bool(*b),
            J::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            J::String(s) => Value::Str(s.clone()),
            J::Array(items) => Value::List(items.iter().map(|v| Value::from_json(v, keywords)).collect()),
            J::Object(obj) => Value::Map(
                obj.iter()
                    .map(|(k, v)| {
                        let key = if keywords {
                            Value::Keyword(k.clone())
                        } else {
                            Value::Str(k.clone())
                        };
                        (key, Value::from_json(v, keywords))
                    })
                    .collect(),
            ),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Int(n)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Int(n as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::List(items)
    }
}

/// Renders the value as EDN text.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&crate::codec::edn::write(self))
    }
}
