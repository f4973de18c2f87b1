use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

use crate::core::error::{ExecutionError, Result};

/// The alias for serde_json::Value since input parameters arrive as JSON
pub type ParamValue = serde_json::Value;

/// An opaque, transport-safe encoding of a piece of media (usually a data URI).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaRef {
    pub mime_type: String,
    pub uri: String,
}

impl MediaRef {
    pub fn new(mime_type: impl Into<String>, uri: impl Into<String>) -> Self {
        Self {
            mime_type: mime_type.into(),
            uri: uri.into(),
        }
    }
}

/// A value an execution can publish.
///
/// Closed set of shapes: scalars, text, a structured mapping, or a media
/// descriptor. Anything richer has to be encoded into one of these first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Map(BTreeMap<String, Value>),
    Media(MediaRef),
}

impl Value {
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_media(&self) -> Option<&MediaRef> {
        match self {
            Value::Media(m) => Some(m),
            _ => None,
        }
    }

    /// Converts into plain JSON for transports that do not want the tagged form.
    pub fn to_json(&self) -> ParamValue {
        match self {
            Value::Bool(b) => ParamValue::from(*b),
            Value::Int(i) => ParamValue::from(*i),
            Value::Float(f) => ParamValue::from(*f),
            Value::Text(s) => ParamValue::from(s.clone()),
            Value::Map(map) => ParamValue::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::Media(media) => serde_json::json!({
                "mime_type": media.mime_type,
                "uri": media.uri,
            }),
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<u64> for Value {
    fn from(i: u64) -> Self {
        Value::Int(i64::try_from(i).unwrap_or(i64::MAX))
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<MediaRef> for Value {
    fn from(m: MediaRef) -> Self {
        Value::Media(m)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Value::Map(map)
    }
}

/// Typed input parameters handed to an execution before it starts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Params(HashMap<String, ParamValue>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.0.insert(name.into(), value.into());
        self
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    pub fn get(&self, name: &str) -> Option<&ParamValue> {
        self.0.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.get(name).is_some_and(|v| !v.is_null())
    }

    pub fn str(&self, name: &str) -> Result<&str> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| ExecutionError::invalid_input(name, "expected a string"))
    }

    pub fn u64(&self, name: &str) -> Result<u64> {
        self.required(name)?
            .as_u64()
            .ok_or_else(|| ExecutionError::invalid_input(name, "expected a non-negative integer"))
    }

    pub fn u64_or(&self, name: &str, default: u64) -> Result<u64> {
        match self.0.get(name) {
            None | Some(ParamValue::Null) => Ok(default),
            Some(v) => v.as_u64().ok_or_else(|| {
                ExecutionError::invalid_input(name, "expected a non-negative integer")
            }),
        }
    }

    pub fn f64_or(&self, name: &str, default: f64) -> Result<f64> {
        match self.0.get(name) {
            None | Some(ParamValue::Null) => Ok(default),
            Some(v) => v
                .as_f64()
                .ok_or_else(|| ExecutionError::invalid_input(name, "expected a number")),
        }
    }

    pub fn bool_or(&self, name: &str, default: bool) -> Result<bool> {
        match self.0.get(name) {
            None | Some(ParamValue::Null) => Ok(default),
            Some(v) => v
                .as_bool()
                .ok_or_else(|| ExecutionError::invalid_input(name, "expected a boolean")),
        }
    }

    fn required(&self, name: &str) -> Result<&ParamValue> {
        match self.0.get(name) {
            None | Some(ParamValue::Null) => {
                Err(ExecutionError::invalid_input(name, "missing required input"))
            }
            Some(v) => Ok(v),
        }
    }
}

impl From<HashMap<String, ParamValue>> for Params {
    fn from(map: HashMap<String, ParamValue>) -> Self {
        Params(map)
    }
}
