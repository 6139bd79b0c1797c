//! # Configuration System
//!
//! Selection and options for the vector store an application uses.
//!
//! This crate provides:
//! - The `vector_store` configuration section (`type` plus free-form options)
//! - Environment variable loading (`VECTOR_STORE_*`)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (overrides > env > file > defaults)
//! - Validation through the `validator` crate
//!
//! Option keys are not interpreted here; each store reads its own keys
//! when the factory constructs it.

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;

pub use config::{Config, VectorStoreSettings};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::{ConfigEnvError, load_from_env, load_from_vars};
pub use precedence::merge_settings;
pub use validator::Validate;
