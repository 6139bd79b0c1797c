use super::{
    HealthStatus, QueryFilter, SearchResult, StoreDocument, StoreError, TextEmbedder, VectorStore
};
use async_trait::async_trait;
use metrics::{counter, gauge, histogram};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Records per-operation metrics around any store.
///
/// Metrics are labelled with `store` (the wrapped store's name) and
/// `operation`. Errors are passed through untouched.
pub struct InstrumentedStore<S: VectorStore + ?Sized> {
    inner: Arc<S>
}

impl<S: VectorStore + ?Sized> InstrumentedStore<S> {
    pub fn new(inner: Arc<S>) -> Self {
        Self { inner }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }

    fn record(&self, operation: &'static str, duration: Duration, success: bool) {
        let store = self.inner.store_name();
        histogram!("vector_store_operation_duration_seconds", "store" => store, "operation" => operation)
            .record(duration.as_secs_f64());
        counter!("vector_store_operations_total", "store" => store, "operation" => operation)
            .increment(1);
        if !success {
            counter!("vector_store_errors_total", "store" => store, "operation" => operation)
                .increment(1);
        }
    }

    fn record_batch_size(&self, operation: &'static str, size: usize) {
        let store = self.inner.store_name();
        histogram!("vector_store_batch_size", "store" => store, "operation" => operation)
            .record(size as f64);
    }

    fn finish<T>(
        &self,
        operation: &'static str,
        start: Instant,
        result: Result<T, StoreError>
    ) -> Result<T, StoreError> {
        self.record(operation, start.elapsed(), result.is_ok());
        if let Err(ref e) = result {
            tracing::debug!(store = self.inner.store_name(), operation, error = %e, "Vector store operation failed");
        }
        result
    }
}

#[async_trait]
impl<S: VectorStore + ?Sized> VectorStore for InstrumentedStore<S> {
    fn store_name(&self) -> &'static str {
        self.inner.store_name()
    }

    async fn load_documents(
        &self,
        documents: Vec<StoreDocument>,
        overwrite: bool
    ) -> Result<(), StoreError> {
        self.record_batch_size("load_documents", documents.len());
        let start = Instant::now();
        let result = self.inner.load_documents(documents, overwrite).await;
        self.finish("load_documents", start, result)
    }

    async fn similarity_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&QueryFilter>
    ) -> Result<Vec<SearchResult>, StoreError> {
        let start = Instant::now();
        let result = self.inner.similarity_search_by_vector(query, k, filter).await;
        if let Ok(ref results) = result {
            histogram!("vector_store_search_results_count", "store" => self.inner.store_name())
                .record(results.len() as f64);
        }
        self.finish("similarity_search_by_vector", start, result)
    }

    async fn similarity_search_by_text(
        &self,
        text: &str,
        embedder: &dyn TextEmbedder,
        k: usize,
        filter: Option<&QueryFilter>
    ) -> Result<Vec<SearchResult>, StoreError> {
        let start = Instant::now();
        let result = self
            .inner
            .similarity_search_by_text(text, embedder, k, filter)
            .await;
        self.finish("similarity_search_by_text", start, result)
    }

    fn filter_by_id(&self, include_ids: &HashSet<String>) -> QueryFilter {
        self.inner.filter_by_id(include_ids)
    }

    async fn search_by_id(&self, id: &str) -> Result<Option<StoreDocument>, StoreError> {
        let start = Instant::now();
        let result = self.inner.search_by_id(id).await;
        if let Ok(ref found) = result {
            let hit = if found.is_some() { "true" } else { "false" };
            counter!("vector_store_get_hits_total", "store" => self.inner.store_name(), "hit" => hit)
                .increment(1);
        }
        self.finish("search_by_id", start, result)
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        self.record_batch_size("delete", ids.len());
        let start = Instant::now();
        let result = self.inner.delete(ids).await;
        self.finish("delete", start, result)
    }

    async fn health_check(&self) -> Result<HealthStatus, StoreError> {
        let start = Instant::now();
        let result = self.inner.health_check().await;

        let store = self.inner.store_name();
        histogram!("vector_store_health_check_duration_seconds", "store" => store)
            .record(start.elapsed().as_secs_f64());

        if let Ok(ref status) = result {
            gauge!("vector_store_healthy", "store" => store).set(if status.healthy {
                1.0
            } else {
                0.0
            });
        }

        result
    }
}

pub fn wrap_with_instrumentation(store: Arc<dyn VectorStore>) -> InstrumentedStore<dyn VectorStore> {
    InstrumentedStore::new(store)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lancedb::{LanceDbConfig, LanceDbStore};
    use metrics_util::debugging::{DebugValue, DebuggingRecorder};

    #[test]
    fn test_operations_and_errors_are_counted() {
        let dir = tempfile::TempDir::new().unwrap();
        let recorder = DebuggingRecorder::new();
        let snapshotter = recorder.snapshotter();

        metrics::with_local_recorder(&recorder, || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async {
                let store = wrap_with_instrumentation(Arc::new(LanceDbStore::new(LanceDbConfig {
                    db_uri: dir.path().display().to_string(),
                    ..Default::default()
                })));

                store
                    .load_documents(vec![StoreDocument::new("a").with_vector(vec![1.0, 0.0])], true)
                    .await
                    .unwrap();
                store
                    .similarity_search_by_vector(&[1.0, 0.0], 1, None)
                    .await
                    .unwrap();
                assert!(
                    store
                        .similarity_search_by_vector(&[1.0, 0.0], 0, None)
                        .await
                        .is_err()
                );
                assert_eq!(store.store_name(), "lancedb");
            });
        });

        let snapshot = snapshotter.snapshot().into_vec();
        let counter_value = |name: &str, operation: &str| -> u64 {
            snapshot
                .iter()
                .filter(|(key, _, _, _)| key.key().name() == name)
                .filter(|(key, _, _, _)| {
                    key.key()
                        .labels()
                        .any(|l| l.key() == "operation" && l.value() == operation)
                })
                .map(|(_, _, _, value)| match value {
                    DebugValue::Counter(n) => *n,
                    _ => 0
                })
                .sum()
        };

        assert_eq!(
            counter_value("vector_store_operations_total", "load_documents"),
            1
        );
        assert_eq!(
            counter_value("vector_store_operations_total", "similarity_search_by_vector"),
            2
        );
        assert_eq!(
            counter_value("vector_store_errors_total", "similarity_search_by_vector"),
            1
        );
    }
}
