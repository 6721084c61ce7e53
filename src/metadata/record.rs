use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{Result, SaveError};

/// Key under which the generation prompt is recorded.
pub const PROMPT_KEY: &str = "prompt";

/// A single metadata value.
///
/// Nested JSON (objects, arrays) and `null` are kept as their compact JSON
/// text, since neither container stores structured values per key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl MetadataValue {
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => Self::Number(n),
            Value::String(s) => Self::Text(s),
            other => Self::Text(other.to_string()),
        }
    }

    /// The value as stored in a text chunk.
    pub fn as_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetadataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for MetadataValue {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<bool> for MetadataValue {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

/// Generation parameters passed alongside the image batch.
///
/// `prompt` is the prompt graph (or text) that produced the images; `extra`
/// holds further entries such as a `workflow` document. Each is recorded as
/// its JSON text.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationParams {
    pub prompt: Option<Value>,
    pub extra: Map<String, Value>,
}

impl GenerationParams {
    pub fn is_empty(&self) -> bool {
        self.prompt.is_none() && self.extra.is_empty()
    }

    /// The prompt as JSON text.
    pub fn prompt_json(&self) -> Option<String> {
        self.prompt.as_ref().map(Value::to_string)
    }

    /// All extra entries' JSON texts, concatenated in key order.
    pub fn extra_json(&self) -> String {
        self.extra.values().map(Value::to_string).collect()
    }
}

/// The merged key/value metadata embedded into each written file.
///
/// Keys are unique; inserting an existing key replaces its value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataRecord {
    entries: BTreeMap<String, MetadataValue>,
}

impl MetadataRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse the free-form custom metadata field.
    ///
    /// Empty text and `{}` give an empty record. Anything that is not a JSON
    /// object is an error.
    pub fn parse_custom(text: &str) -> Result<Self> {
        let trimmed = text.trim();
        if trimmed.is_empty() || trimmed == "{}" {
            return Ok(Self::new());
        }

        let value: Value = serde_json::from_str(trimmed).map_err(SaveError::InvalidMetadata)?;
        match value {
            Value::Object(map) => Ok(Self::from_json_object(map)),
            Value::Array(_) => Err(SaveError::MetadataNotObject("an array")),
            Value::String(_) => Err(SaveError::MetadataNotObject("a string")),
            Value::Number(_) => Err(SaveError::MetadataNotObject("a number")),
            Value::Bool(_) => Err(SaveError::MetadataNotObject("a boolean")),
            Value::Null => Err(SaveError::MetadataNotObject("null")),
        }
    }

    pub fn from_json_object(map: Map<String, Value>) -> Self {
        let entries = map
            .into_iter()
            .map(|(k, v)| (k, MetadataValue::from_json(v)))
            .collect();
        Self { entries }
    }

    /// Record form of generation parameters: `prompt` plus each extra key,
    /// all as JSON text.
    pub fn from_generation_params(params: &GenerationParams) -> Self {
        let mut record = Self::new();
        if let Some(prompt) = params.prompt_json() {
            record.insert(PROMPT_KEY, prompt);
        }
        for (key, value) in &params.extra {
            record.insert(key.clone(), value.to_string());
        }
        record
    }

    /// Merge generation parameters (when given) with custom metadata.
    /// Custom entries win on key collisions.
    pub fn merged(params: Option<&GenerationParams>, custom: MetadataRecord) -> Self {
        let mut record = params.map(Self::from_generation_params).unwrap_or_default();
        record.extend(custom);
        record
    }

    /// Insert or replace, returning the replaced value.
    pub fn insert(
        &mut self,
        key: impl Into<String>,
        value: impl Into<MetadataValue>,
    ) -> Option<MetadataValue> {
        self.entries.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&MetadataValue> {
        self.entries.get(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &MetadataValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every entry rendered as text, the form a PNG reader sees.
    pub fn text_entries(&self) -> BTreeMap<String, String> {
        self.entries
            .iter()
            .map(|(k, v)| (k.clone(), v.as_text()))
            .collect()
    }
}

impl Extend<(String, MetadataValue)> for MetadataRecord {
    fn extend<I: IntoIterator<Item = (String, MetadataValue)>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for MetadataRecord {
    type Item = (String, MetadataValue);
    type IntoIter = std::collections::btree_map::IntoIter<String, MetadataValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl FromIterator<(String, MetadataValue)> for MetadataRecord {
    fn from_iter<I: IntoIterator<Item = (String, MetadataValue)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
