use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use vector_stores::{
    HealthStatus, QueryFilter, SearchResult, StoreConfig, StoreConstructor, StoreDocument,
    StoreError, TextEmbedder, VectorStore
};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

pub fn unique_id(prefix: &str) -> String {
    let id = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
    format!("{}-{}", prefix, id)
}

/// Identifier under which tests register [`InMemoryStore`].
pub const MEMORY_STORE_TYPE: &str = "memory";

/// Keyword embedder with a fixed dimension of [`MockEmbedder::DIMENSION`].
pub struct MockEmbedder {
    calls: AtomicU32
}

impl MockEmbedder {
    pub const DIMENSION: usize = 4;

    pub fn new() -> Self {
        Self {
            calls: AtomicU32::new(0)
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn embedding_for(text: &str) -> Vec<f32> {
        let text_lower = text.to_lowercase();
        let mut embedding = vec![0.0; Self::DIMENSION];

        if text_lower.contains("rust") {
            embedding[0] = 0.9;
        }
        if text_lower.contains("python") {
            embedding[1] = 0.9;
        }
        if text_lower.contains("database") {
            embedding[2] = 0.8;
        }
        embedding[3] = (text.len() as f32).min(100.0) / 1000.0;

        embedding
    }
}

impl Default for MockEmbedder {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextEmbedder for MockEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Self::embedding_for(text))
    }
}

/// Documents embedded with [`MockEmbedder`], each with a `topic` attribute.
pub fn sample_documents() -> Vec<StoreDocument> {
    [
        ("doc-rust", "Rust ownership and borrowing", "rust"),
        ("doc-python", "Python data science notebooks", "python"),
        ("doc-database", "Database indexing strategies", "database"),
        ("doc-rust-db", "Rust database drivers", "rust")
    ]
    .into_iter()
    .map(|(id, text, topic)| {
        StoreDocument::new(id)
            .with_text(text)
            .with_vector(MockEmbedder::embedding_for(text))
            .with_attribute("topic", topic)
    })
    .collect()
}

/// Map-backed store that keeps the configuration it was built with.
///
/// Recognised options: `dim` (expected vector length).
pub struct InMemoryStore {
    config: StoreConfig,
    documents: RwLock<BTreeMap<String, StoreDocument>>
}

impl InMemoryStore {
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            documents: RwLock::new(BTreeMap::new())
        }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn dimension(&self) -> Option<usize> {
        self.config.get_usize("dim")
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Constructor suitable for `VectorStoreFactory::register`.
    pub fn constructor() -> StoreConstructor {
        Arc::new(|config: &StoreConfig| -> Result<Arc<dyn VectorStore>, StoreError> {
            Ok(Arc::new(InMemoryStore::new(config.clone())))
        })
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), StoreError> {
        match self.dimension() {
            Some(expected) if expected != vector.len() => Err(StoreError::SchemaMismatch {
                expected,
                actual: vector.len()
            }),
            _ => Ok(())
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

#[async_trait]
impl VectorStore for InMemoryStore {
    fn store_name(&self) -> &'static str {
        MEMORY_STORE_TYPE
    }

    async fn load_documents(
        &self,
        documents: Vec<StoreDocument>,
        overwrite: bool
    ) -> Result<(), StoreError> {
        for vector in documents.iter().filter_map(|d| d.vector.as_deref()) {
            self.check_dimension(vector)?;
        }

        let mut stored = self.documents.write();
        if overwrite {
            stored.clear();
        }
        for doc in documents.into_iter().filter(|d| d.vector.is_some()) {
            stored.insert(doc.id.clone(), doc);
        }
        Ok(())
    }

    async fn similarity_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&QueryFilter>
    ) -> Result<Vec<SearchResult>, StoreError> {
        if k == 0 {
            return Err(StoreError::InvalidArgument("k must be positive".to_string()));
        }
        self.check_dimension(query)?;

        let stored = self.documents.read();
        let mut results: Vec<SearchResult> = stored
            .values()
            .filter(|doc| match filter {
                Some(QueryFilter::Ids(ids)) => ids.contains(&doc.id),
                _ => true
            })
            .filter_map(|doc| {
                let vector = doc.vector.as_deref()?;
                Some(SearchResult::new(doc.clone(), dot(query, vector)))
            })
            .collect();

        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    fn filter_by_id(&self, include_ids: &HashSet<String>) -> QueryFilter {
        if include_ids.is_empty() {
            QueryFilter::Unrestricted
        } else {
            QueryFilter::Ids(include_ids.iter().cloned().collect())
        }
    }

    async fn search_by_id(&self, id: &str) -> Result<Option<StoreDocument>, StoreError> {
        Ok(self.documents.read().get(id).cloned())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        let mut stored = self.documents.write();
        Ok(ids.iter().filter(|id| stored.remove(*id).is_some()).count())
    }

    async fn health_check(&self) -> Result<HealthStatus, StoreError> {
        Ok(HealthStatus::healthy(MEMORY_STORE_TYPE))
    }
}

/// Wraps [`InMemoryStore::constructor`] and records each configuration
/// passed to it.
#[derive(Clone, Default)]
pub struct ConstructorRecorder {
    seen: Arc<Mutex<Vec<StoreConfig>>>
}

impl ConstructorRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn constructor(&self) -> StoreConstructor {
        let seen = Arc::clone(&self.seen);
        Arc::new(
            move |config: &StoreConfig| -> Result<Arc<dyn VectorStore>, StoreError> {
                seen.lock().push(config.clone());
                tracing::debug!(count = seen.lock().len(), "Recording constructor invoked");
                Ok(Arc::new(InMemoryStore::new(config.clone())))
            }
        )
    }

    /// Constructor that records the call and then fails.
    pub fn failing_constructor(&self, message: &str) -> StoreConstructor {
        let seen = Arc::clone(&self.seen);
        let message = message.to_string();
        Arc::new(
            move |config: &StoreConfig| -> Result<Arc<dyn VectorStore>, StoreError> {
                seen.lock().push(config.clone());
                Err(StoreError::Configuration(message.clone()))
            }
        )
    }

    pub fn invocations(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn last_config(&self) -> Option<StoreConfig> {
        self.seen.lock().last().cloned()
    }

    pub fn last_option(&self, key: &str) -> Option<Value> {
        self.seen.lock().last().and_then(|c| c.get(key).cloned())
    }
}
