use super::StoreError;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

/// A document as persisted by a vector store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreDocument {
    pub id: String,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub vector: Option<Vec<f32>>,
    #[serde(default)]
    pub attributes: Map<String, Value>
}

impl StoreDocument {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: None,
            vector: None,
            attributes: Map::new()
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }

    pub fn with_vector(mut self, vector: Vec<f32>) -> Self {
        self.vector = Some(vector);
        self
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }
}

/// A document paired with its relevance score. Every built-in store ranks
/// higher scores first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResult {
    pub document: StoreDocument,
    pub score: f32
}

impl SearchResult {
    pub fn new(document: StoreDocument, score: f32) -> Self {
        Self { document, score }
    }
}

/// Backend-native restriction produced by [`crate::VectorStore::filter_by_id`].
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum QueryFilter {
    #[default]
    Unrestricted,
    Ids(BTreeSet<String>),
    Expression(String)
}

impl QueryFilter {
    pub fn is_unrestricted(&self) -> bool {
        matches!(self, QueryFilter::Unrestricted)
    }
}

/// Open-ended configuration bundle handed to a store constructor.
///
/// The factory never inspects it; each constructor decides which keys it
/// understands, usually through [`StoreConfig::deserialize_into`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StoreConfig {
    options: Map<String, Value>
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.options.insert(key.into(), value.into())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.options.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.options.get(key).and_then(Value::as_str)
    }

    /// Reads a count stored either as a JSON number or as its decimal string.
    pub fn get_usize(&self, key: &str) -> Option<usize> {
        match self.options.get(key)? {
            Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
            Value::String(s) => s.trim().parse().ok(),
            _ => None
        }
    }

    /// Reads a flag stored either as a JSON bool or as `"true"` / `"false"`.
    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self.options.get(key)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => s.trim().parse().ok(),
            _ => None
        }
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.options.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.options.len()
    }

    pub fn is_empty(&self) -> bool {
        self.options.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.options
    }

    /// Parses the bundle into a backend's typed configuration.
    pub fn deserialize_into<T: DeserializeOwned>(&self) -> Result<T, StoreError> {
        serde_json::from_value(Value::Object(self.options.clone()))
            .map_err(|e| StoreError::Configuration(e.to_string()))
    }
}

impl From<Map<String, Value>> for StoreConfig {
    fn from(options: Map<String, Value>) -> Self {
        Self { options }
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for StoreConfig {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            options: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub healthy: bool,
    pub latency_ms: Option<u64>,
    pub message: Option<String>,
    pub backend: String
}

impl HealthStatus {
    pub fn healthy(backend: &str) -> Self {
        Self {
            healthy: true,
            latency_ms: None,
            message: None,
            backend: backend.to_string()
        }
    }

    pub fn unhealthy(backend: &str, message: impl Into<String>) -> Self {
        Self {
            healthy: false,
            latency_ms: None,
            message: Some(message.into()),
            backend: backend.to_string()
        }
    }

    pub fn with_latency(mut self, ms: u64) -> Self {
        self.latency_ms = Some(ms);
        self
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrString {
    Number(u64),
    String(String)
}

impl NumberOrString {
    fn into_usize<E: serde::de::Error>(self) -> Result<usize, E> {
        match self {
            NumberOrString::Number(n) => usize::try_from(n).map_err(E::custom),
            NumberOrString::String(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid count: {:?}", s)))
        }
    }
}

/// Accepts `1536` as well as `"1536"`; environment options arrive as strings.
pub(crate) fn usize_from_number_or_string<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>
{
    NumberOrString::deserialize(deserializer)?.into_usize()
}

pub(crate) fn optional_usize_from_number_or_string<'de, D>(
    deserializer: D
) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>
{
    Option::<NumberOrString>::deserialize(deserializer)?
        .map(NumberOrString::into_usize)
        .transpose()
}

pub(crate) fn ensure_positive_k(k: usize) -> Result<(), StoreError> {
    if k == 0 {
        return Err(StoreError::InvalidArgument(
            "k must be a positive integer".to_string()
        ));
    }
    Ok(())
}

pub(crate) fn ensure_dimension(expected: Option<usize>, vector: &[f32]) -> Result<(), StoreError> {
    match expected {
        Some(expected) if expected != vector.len() => Err(StoreError::SchemaMismatch {
            expected,
            actual: vector.len()
        }),
        _ => Ok(())
    }
}
