//! # Environment Variable Loader
//!
//! Loads the vector store selection from environment variables.
//!
//! # Naming Convention
//! - `VECTOR_STORE_TYPE`: store identifier
//! - `VECTOR_STORE_<KEY>`: any other option, stored under the lower-cased
//!   `<key>`

use crate::config::{Config, VectorStoreSettings};
use serde_json::Value;
use std::env;
use std::ffi::OsString;

pub const ENV_PREFIX: &str = "VECTOR_STORE_";
pub const ENV_TYPE_KEY: &str = "VECTOR_STORE_TYPE";

#[derive(Debug, thiserror::Error)]
pub enum ConfigEnvError {
    #[error("Environment variable {0} is not valid unicode")]
    NotUnicode(String),

    #[error("Environment variable {0} does not name an option")]
    EmptyKey(String)
}

/// Load configuration from environment variables.
///
/// # M-CANONICAL-DOCS
///
/// ## Purpose
/// Reads `VECTOR_STORE_*` variables following 12-factor app principles.
/// When `VECTOR_STORE_TYPE` is absent the returned settings leave the store
/// type unset so that merging keeps the type chosen by a lower layer.
///
/// ## Values
/// Values are kept as strings, so `VECTOR_STORE_COLLECTION_NAME=2024` stays
/// `"2024"` and `007` keeps its zeros. Stores parse their numeric options
/// from either form.
///
/// ## Usage
/// ```rust,no_run
/// use config::load_from_env;
///
/// fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = load_from_env()?;
///     println!("Vector store: {}", config.vector_store.store_type);
///     Ok(())
/// }
/// ```
pub fn load_from_env() -> Result<Config, ConfigEnvError> {
    load_from_vars(env::vars_os())
}

/// Same as [`load_from_env`] over an explicit variable list.
pub fn load_from_vars<I>(vars: I) -> Result<Config, ConfigEnvError>
where
    I: IntoIterator<Item = (OsString, OsString)>
{
    let mut settings = VectorStoreSettings::unset();

    for (name, value) in vars {
        let Some(name) = name.to_str() else {
            continue;
        };
        let Some(key) = name.strip_prefix(ENV_PREFIX) else {
            continue;
        };
        let value = value
            .into_string()
            .map_err(|_| ConfigEnvError::NotUnicode(name.to_string()))?;

        if name == ENV_TYPE_KEY {
            settings.store_type = value;
            continue;
        }
        if key.is_empty() {
            return Err(ConfigEnvError::EmptyKey(name.to_string()));
        }

        settings
            .options
            .insert(key.to_lowercase(), Value::String(value));
    }

    Ok(Config {
        vector_store: settings
    })
}
