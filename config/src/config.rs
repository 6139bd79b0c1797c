//! # Configuration Structures
//!
//! The vector store section of an application's settings: which store to
//! construct and the open-ended options handed to its constructor.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use validator::Validate;

/// Option keys whose values are masked when configuration changes are logged.
pub const SECRET_OPTION_KEYS: [&str; 3] = ["api_key", "token", "password"];

/// Top-level configuration document.
///
/// ## Example (YAML)
/// ```yaml
/// vector_store:
///   type: lancedb
///   db_uri: ./output/lancedb
///   collection_name: entity_description_embeddings
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate, PartialEq)]
pub struct Config {
    #[serde(default)]
    #[validate(nested)]
    pub vector_store: VectorStoreSettings
}

/// Store identifier plus the options bundle for its constructor.
///
/// Every key other than `type` is kept verbatim in `options`; the config
/// layer does not interpret them.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, PartialEq)]
pub struct VectorStoreSettings {
    #[serde(rename = "type", default)]
    #[validate(length(min = 1, max = 255))]
    pub store_type: String,

    #[serde(flatten)]
    pub options: Map<String, Value>
}

impl Default for VectorStoreSettings {
    fn default() -> Self {
        Self {
            store_type: "lancedb".to_string(),
            options: Map::new()
        }
    }
}

impl VectorStoreSettings {
    pub fn new(store_type: impl Into<String>) -> Self {
        Self {
            store_type: store_type.into(),
            options: Map::new()
        }
    }

    /// Settings with no store selected, used by partial sources such as the
    /// environment so they do not override a type chosen elsewhere.
    pub fn unset() -> Self {
        Self::new(String::new())
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }

    pub fn is_secret_key(key: &str) -> bool {
        SECRET_OPTION_KEYS.contains(&key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_selects_lancedb() {
        let config = Config::default();
        assert_eq!(config.vector_store.store_type, "lancedb");
        assert!(config.vector_store.options.is_empty());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_store_type_is_invalid() {
        let config = Config {
            vector_store: VectorStoreSettings::unset()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_options_are_flattened() {
        let settings: VectorStoreSettings = serde_json::from_value(serde_json::json!({
            "type": "milvus",
            "url": "http://milvus:19530",
            "vector_size": 768
        }))
        .unwrap();

        assert_eq!(settings.store_type, "milvus");
        assert_eq!(settings.options.get("url"), Some(&serde_json::json!("http://milvus:19530")));
        assert_eq!(settings.options.get("vector_size"), Some(&serde_json::json!(768)));
        assert!(!settings.options.contains_key("type"));
    }

    #[test]
    fn test_secret_keys() {
        assert!(VectorStoreSettings::is_secret_key("api_key"));
        assert!(VectorStoreSettings::is_secret_key("token"));
        assert!(!VectorStoreSettings::is_secret_key("url"));
    }
}
