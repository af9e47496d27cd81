//! Core data types exchanged with a grano server.
//!
//! Properties and file attachments are what callers send; [`ResourceData`]
//! is the typed view over the JSON documents the server sends back.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{GranoError, Result};

// ── Properties ────────────────────────────────────────────────────

/// A named property value with provenance, as stored on entities and relations.
///
/// A `value` of `None` on a non-file property is an explicit retraction:
/// the server marks prior values of the property inactive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Property {
    pub name: String,
    pub value: Option<String>,
    pub source_url: Option<String>,
    pub active: bool,
    #[serde(skip)]
    pub file: Option<FileBlob>,
}

impl Property {
    pub fn new(name: impl Into<String>, value: PropertyValue, source_url: Option<String>) -> Self {
        let (value, file) = match value {
            PropertyValue::Text(text) => (Some(text), None),
            PropertyValue::Null => (None, None),
            PropertyValue::File(blob) => (None, Some(blob)),
        };
        Self {
            name: name.into(),
            value,
            source_url,
            active: true,
            file,
        }
    }

    pub fn is_file(&self) -> bool {
        self.file.is_some()
    }

    /// JSON form of the property as sent to the server.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "name": self.name,
            "value": self.value,
            "source_url": self.source_url,
            "active": self.active,
        })
    }
}

/// A value handed to a property setter.
///
/// Numbers and booleans are stored in their string form, matching how the
/// server keeps property values.
#[derive(Debug, Clone, PartialEq)]
pub enum PropertyValue {
    Text(String),
    /// Retract the current value.
    Null,
    /// Upload a file instead of storing an inline value.
    File(FileBlob),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&String> for PropertyValue {
    fn from(value: &String) -> Self {
        Self::Text(value.clone())
    }
}

impl From<i64> for PropertyValue {
    fn from(value: i64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<f64> for PropertyValue {
    fn from(value: f64) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<FileBlob> for PropertyValue {
    fn from(value: FileBlob) -> Self {
        Self::File(value)
    }
}

impl<T: Into<PropertyValue>> From<Option<T>> for PropertyValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

impl TryFrom<&Value> for PropertyValue {
    type Error = GranoError;

    /// Scalar JSON values map onto text or null; arrays and objects are rejected.
    fn try_from(value: &Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self::Null),
            Value::String(s) => Ok(Self::Text(s.clone())),
            Value::Bool(b) => Ok(Self::Text(b.to_string())),
            Value::Number(n) => Ok(Self::Text(n.to_string())),
            other => Err(GranoError::Config(format!(
                "unsupported property value: {other}"
            ))),
        }
    }
}

// ── Files ─────────────────────────────────────────────────────────

pub const DEFAULT_MIME_TYPE: &str = "application/octet-stream";

/// A file payload attached to a property.
#[derive(Debug, Clone, PartialEq)]
pub struct FileBlob {
    /// Base name of the file, without directories.
    pub file_name: String,
    pub content: Vec<u8>,
    pub mime_type: Option<String>,
}

impl FileBlob {
    pub fn new(file_name: impl AsRef<str>, content: impl Into<Vec<u8>>) -> Self {
        let file_name = Path::new(file_name.as_ref())
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| file_name.as_ref().to_string());
        Self {
            file_name,
            content: content.into(),
            mime_type: None,
        }
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    /// Read a file from disk.
    pub fn from_path(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read(path)?;
        Ok(Self::new(path.to_string_lossy(), content))
    }

    pub fn mime_type(&self) -> &str {
        self.mime_type.as_deref().unwrap_or(DEFAULT_MIME_TYPE)
    }
}

/// File attachments keyed by property name. Later inserts replace earlier ones.
pub type FileSet = BTreeMap<String, FileBlob>;

// ── Resource documents ────────────────────────────────────────────

/// Typed view over a JSON object returned by the server.
///
/// Resources expose their fields through explicit accessors on this map
/// rather than through generated structs, since the set of keys depends on
/// the project's schemata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceData(Map<String, Value>);

impl ResourceData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_value(value: Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(GranoError::Transport(format!(
                "expected a JSON object, got: {other}"
            ))),
        }
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.0.get_mut(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn str(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    /// A string field that identifies the resource; its absence is an error.
    pub fn require_str(&self, resource: &'static str, key: &'static str) -> Result<&str> {
        self.str(key).ok_or(GranoError::MissingField {
            resource,
            field: key,
        })
    }

    pub fn u64(&self, key: &str) -> Option<u64> {
        self.0.get(key).and_then(Value::as_u64)
    }

    pub fn array(&self, key: &str) -> Option<&Vec<Value>> {
        self.0.get(key).and_then(Value::as_array)
    }

    pub fn object(&self, key: &str) -> Option<&Map<String, Value>> {
        self.0.get(key).and_then(Value::as_object)
    }

    /// Nested object field, inserted as `{}` if missing or not an object.
    pub fn object_mut(&mut self, key: &str) -> &mut Map<String, Value> {
        let slot = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Value::Object(Map::new()));
        if !slot.is_object() {
            *slot = Value::Object(Map::new());
        }
        match slot {
            Value::Object(map) => map,
            _ => unreachable!("slot was just made an object"),
        }
    }

    /// Nested array field, inserted as `[]` if missing or not an array.
    pub fn array_mut(&mut self, key: &str) -> &mut Vec<Value> {
        let slot = self
            .0
            .entry(key.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if !slot.is_array() {
            *slot = Value::Array(Vec::new());
        }
        match slot {
            Value::Array(items) => items,
            _ => unreachable!("slot was just made an array"),
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.0.keys()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }
}

impl From<Map<String, Value>> for ResourceData {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// Name of a schema reference, which the server renders either as a plain
/// name or as a schema object carrying a `name` field.
pub fn schema_name(value: &Value) -> Option<&str> {
    match value {
        Value::String(name) => Some(name.as_str()),
        Value::Object(obj) => obj.get("name").and_then(Value::as_str),
        _ => None,
    }
}
