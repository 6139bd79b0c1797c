//! # Configuration File Loading
//!
//! Loads the vector store section from TOML or YAML files, choosing the
//! format from the file extension.

use crate::config::Config;
use std::path::Path;

#[derive(Debug, thiserror::Error)]
pub enum ConfigFileError {
    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(String),

    #[error("Config file has no extension")]
    NoExtension,

    #[error("Unsupported config file format: {0}")]
    UnsupportedFormat(String)
}

fn read_config_file(path: &Path) -> Result<String, ConfigFileError> {
    std::fs::read_to_string(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => ConfigFileError::FileNotFound(path.display().to_string()),
        _ => ConfigFileError::Io(e)
    })
}

/// Load configuration from a TOML file.
///
/// # M-CANONICAL-DOCS
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_toml;
/// use std::path::Path;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_toml(Path::new("settings.toml"))?;
///     println!("Vector store: {}", config.vector_store.store_type);
///     Ok(())
/// }
/// ```
///
/// ## Error Handling
/// Returns `ConfigFileError` when the file is missing or is not valid TOML.
pub fn load_from_toml(path: &Path) -> Result<Config, ConfigFileError> {
    let contents = read_config_file(path)?;
    toml::from_str(&contents).map_err(|e| ConfigFileError::TomlParse(e.to_string()))
}

/// Load configuration from a YAML file.
///
/// ## Error Handling
/// Returns `ConfigFileError` when the file is missing or is not valid YAML.
pub fn load_from_yaml(path: &Path) -> Result<Config, ConfigFileError> {
    let contents = read_config_file(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigFileError::YamlParse(e.to_string()))
}

/// Load configuration from file with format auto-detection.
///
/// `.toml` files are parsed as TOML, `.yaml` and `.yml` as YAML. The
/// extension match is case-insensitive.
pub fn load_from_file(path: &Path) -> Result<Config, ConfigFileError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or(ConfigFileError::NoExtension)?;

    let config = match extension.to_lowercase().as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigFileError::UnsupportedFormat(other.to_string()))
    }?;

    tracing::debug!(
        path = %path.display(),
        store_type = %config.vector_store.store_type,
        "Loaded vector store configuration file"
    );
    Ok(config)
}
