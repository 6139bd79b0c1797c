//! Pluggable vector stores behind a common capability contract.
//!
//! A [`VectorStoreFactory`] resolves a store identifier plus a [`StoreConfig`]
//! bundle into an `Arc<dyn VectorStore>`. Built-in identifiers are matched
//! first; anything else is looked up among constructors registered at runtime.
//!
//! # Built-in Stores
//!
//! | Identifier | Transport | Empty id filter |
//! |------------|-----------|-----------------|
//! | `lancedb` | Embedded, local directory | Unrestricted |
//! | `azure_ai_search` | Azure AI Search REST | Unrestricted |
//! | `milvus` | Milvus REST v2 | Unrestricted |

pub mod azure_ai_search;
pub mod embedding;
pub mod error;
pub mod factory;
pub mod lancedb;
pub mod milvus;
pub mod observability;
pub mod types;

pub use embedding::TextEmbedder;
pub use error::StoreError;
pub use factory::{StoreConstructor, VectorStoreFactory, VectorStoreType};
pub use observability::{InstrumentedStore, wrap_with_instrumentation};
pub use types::{HealthStatus, QueryFilter, SearchResult, StoreConfig, StoreDocument};

use async_trait::async_trait;
use std::collections::HashSet;

/// Operations every vector store implementation provides.
///
/// # Example
///
/// ```rust,ignore
/// use vector_stores::{StoreConfig, StoreDocument, VectorStoreFactory};
///
/// let factory = VectorStoreFactory::new();
/// let config = StoreConfig::new()
///     .with("db_uri", "./lancedb")
///     .with("collection_name", "entities");
/// let store = factory.get_store("lancedb", &config)?;
///
/// let docs = vec![StoreDocument::new("e-1").with_vector(vec![0.1, 0.2, 0.3])];
/// store.load_documents(docs, true).await?;
///
/// let filter = store.filter_by_id(&HashSet::from(["e-1".to_string()]));
/// let results = store
///     .similarity_search_by_vector(&[0.1, 0.2, 0.3], 5, Some(&filter))
///     .await?;
/// ```
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Returns the identifier of this implementation.
    fn store_name(&self) -> &'static str;

    /// Persists documents with their embeddings.
    ///
    /// With `overwrite` the whole collection is replaced, otherwise documents
    /// are merged by id. Documents without a vector are skipped.
    async fn load_documents(
        &self,
        documents: Vec<StoreDocument>,
        overwrite: bool
    ) -> Result<(), StoreError>;

    /// Returns at most `k` results ordered best first.
    ///
    /// Fails with [`StoreError::InvalidArgument`] when `k` is zero.
    async fn similarity_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&QueryFilter>
    ) -> Result<Vec<SearchResult>, StoreError>;

    /// Embeds `text` and runs a vector search with the result.
    async fn similarity_search_by_text(
        &self,
        text: &str,
        embedder: &dyn TextEmbedder,
        k: usize,
        filter: Option<&QueryFilter>
    ) -> Result<Vec<SearchResult>, StoreError> {
        types::ensure_positive_k(k)?;
        let query = embedder.embed(text).await?;
        if query.is_empty() {
            return Ok(Vec::new());
        }
        self.similarity_search_by_vector(&query, k, filter).await
    }

    /// Builds a filter restricting searches to `include_ids`.
    ///
    /// An empty set yields [`QueryFilter::Unrestricted`] for all built-in
    /// stores.
    fn filter_by_id(&self, include_ids: &HashSet<String>) -> QueryFilter;

    /// Looks up a single document.
    async fn search_by_id(&self, id: &str) -> Result<Option<StoreDocument>, StoreError>;

    /// Deletes documents by id.
    ///
    /// Returns the number of documents the backend reports as removed. Remote
    /// stores that do not report it return the number of ids submitted.
    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError>;

    async fn health_check(&self) -> Result<HealthStatus, StoreError>;
}
