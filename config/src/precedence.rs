//! # Configuration Precedence
//!
//! Merges vector store settings from multiple sources.
//!
//! # Precedence Order
//! 1. Explicit overrides (highest priority)
//! 2. Environment variables
//! 3. Configuration file
//! 4. Default values (lowest priority)

use crate::config::{Config, VectorStoreSettings};

/// Merge configuration sources with precedence.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Layers overrides > environment > file > defaults. Options merge key by
/// key. An empty store type means "not set" and keeps the lower layer's
/// choice. When a layer selects a different store type, options gathered
/// for the previous type are dropped.
///
/// ## Usage
/// ```rust,no_run
/// use config::{Config, load_from_env, load_from_file, merge_settings};
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let from_file = load_from_file(Path::new("settings.yaml")).ok();
///     let from_env = load_from_env()?;
///     let _config = merge_settings(Config::default(), from_file, from_env, None);
///     Ok(())
/// }
/// ```
pub fn merge_settings(
    defaults: Config,
    file_config: Option<Config>,
    env_config: Config,
    override_config: Option<Config>
) -> Config {
    let mut config = defaults;

    if let Some(file) = file_config {
        config = merge_with_logging(config, file, "file");
    }
    config = merge_with_logging(config, env_config, "env");
    if let Some(overrides) = override_config {
        config = merge_with_logging(config, overrides, "overrides");
    }

    config
}

fn merge_with_logging(mut base: Config, override_config: Config, source_name: &str) -> Config {
    let mut changes = Vec::new();
    merge_vector_store(
        &mut base.vector_store,
        override_config.vector_store,
        &mut changes
    );

    if !changes.is_empty() {
        tracing::info!("Configuration from {}: {:?}", source_name, changes);
    }

    base
}

fn merge_vector_store(
    base: &mut VectorStoreSettings,
    overrides: VectorStoreSettings,
    changes: &mut Vec<String>
) {
    if !overrides.store_type.is_empty() && overrides.store_type != base.store_type {
        changes.push(format!(
            "vector_store.type: {} -> {}",
            base.store_type, overrides.store_type
        ));
        base.store_type = overrides.store_type;
        base.options.clear();
    }

    for (key, value) in overrides.options {
        if base.options.get(&key) == Some(&value) {
            continue;
        }
        if VectorStoreSettings::is_secret_key(&key) {
            changes.push(format!("vector_store.{key}: ***"));
        } else {
            changes.push(format!("vector_store.{key}: {value}"));
        }
        base.options.insert(key, value);
    }
}
