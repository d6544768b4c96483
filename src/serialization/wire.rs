//! Wire values: the structured-value tree exchanged with the engine.
//!
//! Mirrors the transport's structured value (null, bool, number, string,
//! list, struct). Struct keys are kept sorted so that two serializations of the
//! same graph are byte-identical once marshalled.

use super::constants::*;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// String-keyed fields of a struct value.
pub type Struct = BTreeMap<String, Value>;

/// A single wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    List(Vec<Value>),
    Struct(Struct),
}

impl Value {
    /// Name of the wire kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Number(_) => "number",
            Self::String(_) => "string",
            Self::List(_) => "list",
            Self::Struct(_) => "struct",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_struct(&self) -> Option<&Struct> {
        match self {
            Self::Struct(fields) => Some(fields),
            _ => None,
        }
    }

    /// The unknown sentinel.
    pub fn unknown() -> Self {
        Self::String(UNKNOWN_VALUE.to_string())
    }

    pub fn is_unknown(&self) -> bool {
        self.as_str() == Some(UNKNOWN_VALUE)
    }

    /// Signature of a marker struct, if this value is one.
    pub fn signature(&self) -> Option<&str> {
        self.as_struct()?.get(SPECIAL_SIG_KEY)?.as_str()
    }

    /// Build a marker struct carrying `sig` plus the given fields.
    pub fn marker<I>(sig: &str, fields: I) -> Self
    where
        I: IntoIterator<Item = (&'static str, Value)>,
    {
        let mut map = Struct::new();
        map.insert(SPECIAL_SIG_KEY.to_string(), Self::String(sig.to_string()));
        for (k, v) in fields {
            map.insert(k.to_string(), v);
        }
        Self::Struct(map)
    }

    /// Wrap a value in the secret marker. An already secret value is
    /// returned as is.
    pub fn secret(inner: Value) -> Self {
        if inner.signature() == Some(SPECIAL_SECRET_SIG) {
            return inner;
        }
        Self::marker(SPECIAL_SECRET_SIG, [(SECRET_VALUE_NAME, inner)])
    }

    /// Marshal into the transport's structured value. Non-finite numbers
    /// have no JSON form and are rejected.
    pub fn to_json(&self) -> Result<serde_json::Value> {
        Ok(match self {
            Self::Null => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .ok_or_else(|| Error::MalformedWire(format!("non-finite number {}", n)))?,
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::List(items) => serde_json::Value::Array(
                items.iter().map(Value::to_json).collect::<Result<_>>()?,
            ),
            Self::Struct(fields) => serde_json::Value::Object(
                fields
                    .iter()
                    .map(|(k, v)| v.to_json().map(|v| (k.clone(), v)))
                    .collect::<Result<_>>()?,
            ),
        })
    }

    /// Unmarshal from the transport's structured value.
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        Ok(match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => Self::Number(
                n.as_f64()
                    .ok_or_else(|| Error::MalformedWire(format!("unrepresentable number {}", n)))?,
            ),
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => {
                Self::List(items.iter().map(Value::from_json).collect::<Result<_>>()?)
            }
            serde_json::Value::Object(fields) => Self::Struct(
                fields
                    .iter()
                    .map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                    .collect::<Result<_>>()?,
            ),
        })
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_json() {
            Ok(json) => write!(f, "{}", json),
            Err(_) => write!(f, "{:?}", self),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Self::Number(n)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}
