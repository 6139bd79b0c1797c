//! Shared test fixtures for the vector store workspace.
//!
//! - [`MockEmbedder`]: deterministic keyword embeddings
//! - [`InMemoryStore`]: a registrable `"memory"` store
//! - [`ConstructorRecorder`]: a constructor that records every invocation
//! - [`sample_documents`]: a small corpus with known nearest neighbours

mod fixtures;

pub use fixtures::*;
