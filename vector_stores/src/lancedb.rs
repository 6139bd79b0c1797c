//! Embedded store registered under the `lancedb` identifier.
//!
//! Each collection is a single JSON table at `<db_uri>/<collection_name>.json`,
//! loaded lazily on first use and rewritten after every mutation. Search is
//! exhaustive cosine similarity.
//!
//! Empty id filters are unrestricted.

use super::types::{
    ensure_dimension, ensure_positive_k, optional_usize_from_number_or_string
};
use super::{
    HealthStatus, QueryFilter, SearchResult, StoreConfig, StoreDocument, StoreError, VectorStore
};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;
use std::time::Instant;
use tokio::sync::{MappedMutexGuard, Mutex, MutexGuard};

type Table = BTreeMap<String, StoreDocument>;

#[derive(Debug, Clone, Deserialize)]
pub struct LanceDbConfig {
    #[serde(default = "default_db_uri")]
    pub db_uri: String,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(default, deserialize_with = "optional_usize_from_number_or_string")]
    pub vector_size: Option<usize>
}

fn default_db_uri() -> String {
    "./lancedb".to_string()
}

fn default_collection_name() -> String {
    "documents".to_string()
}

impl Default for LanceDbConfig {
    fn default() -> Self {
        Self {
            db_uri: default_db_uri(),
            collection_name: default_collection_name(),
            vector_size: None
        }
    }
}

pub struct LanceDbStore {
    config: LanceDbConfig,
    table: Mutex<Option<Table>>
}

impl LanceDbStore {
    pub fn new(config: LanceDbConfig) -> Self {
        Self {
            config,
            table: Mutex::new(None)
        }
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Ok(Self::new(config.deserialize_into()?))
    }

    pub fn table_path(&self) -> PathBuf {
        PathBuf::from(&self.config.db_uri).join(format!("{}.json", self.config.collection_name))
    }

    async fn read_table(&self) -> Result<Table, StoreError> {
        let path = self.table_path();
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Table::new()),
            Err(e) => return Err(StoreError::BackendUnavailable(format!("{}: {}", path.display(), e)))
        };

        let documents: Vec<StoreDocument> = serde_json::from_slice(&bytes)?;
        tracing::debug!(
            collection = %self.config.collection_name,
            count = documents.len(),
            "Loaded embedded table"
        );
        Ok(documents.into_iter().map(|d| (d.id.clone(), d)).collect())
    }

    async fn lock_table(&self) -> Result<MappedMutexGuard<'_, Table>, StoreError> {
        let mut guard = self.table.lock().await;
        if guard.is_none() {
            *guard = Some(self.read_table().await?);
        }
        Ok(MutexGuard::map(guard, |table| table.get_or_insert_with(Table::new)))
    }

    async fn persist(&self, table: &Table) -> Result<(), StoreError> {
        tokio::fs::create_dir_all(&self.config.db_uri).await?;

        let path = self.table_path();
        let tmp_path = path.with_extension("json.tmp");
        let documents: Vec<&StoreDocument> = table.values().collect();
        tokio::fs::write(&tmp_path, serde_json::to_vec(&documents)?).await?;
        tokio::fs::rename(&tmp_path, &path).await?;
        Ok(())
    }

    fn table_dimension(table: &Table) -> Option<usize> {
        table
            .values()
            .find_map(|d| d.vector.as_ref())
            .map(Vec::len)
    }
}

#[async_trait]
impl VectorStore for LanceDbStore {
    fn store_name(&self) -> &'static str {
        "lancedb"
    }

    async fn load_documents(
        &self,
        documents: Vec<StoreDocument>,
        overwrite: bool
    ) -> Result<(), StoreError> {
        let mut table = self.lock_table().await?;

        let incoming: Vec<StoreDocument> =
            documents.into_iter().filter(|d| d.vector.is_some()).collect();

        let existing_dimension = if overwrite {
            None
        } else {
            Self::table_dimension(&table)
        };
        let expected = self
            .config
            .vector_size
            .or(existing_dimension)
            .or_else(|| incoming.first().and_then(|d| d.vector.as_ref()).map(Vec::len));

        for document in &incoming {
            if let Some(vector) = &document.vector {
                ensure_dimension(expected, vector)?;
            }
        }

        let mut staged = if overwrite { Table::new() } else { table.clone() };
        let count = incoming.len();
        for document in incoming {
            staged.insert(document.id.clone(), document);
        }

        // the cached table only changes once the file write succeeded
        self.persist(&staged).await?;
        *table = staged;
        tracing::debug!(
            collection = %self.config.collection_name,
            count,
            overwrite,
            "Loaded documents into embedded table"
        );
        Ok(())
    }

    async fn similarity_search_by_vector(
        &self,
        query: &[f32],
        k: usize,
        filter: Option<&QueryFilter>
    ) -> Result<Vec<SearchResult>, StoreError> {
        ensure_positive_k(k)?;

        let allowed = match filter {
            None | Some(QueryFilter::Unrestricted) => None,
            Some(QueryFilter::Ids(ids)) => Some(ids),
            Some(QueryFilter::Expression(expr)) => {
                return Err(StoreError::InvalidArgument(format!(
                    "lancedb store only accepts id filters, got expression: {}",
                    expr
                )));
            }
        };

        let table = self.lock_table().await?;
        ensure_dimension(
            self.config.vector_size.or_else(|| Self::table_dimension(&table)),
            query
        )?;

        let mut results: Vec<SearchResult> = table
            .values()
            .filter(|d| allowed.is_none_or(|ids| ids.contains(&d.id)))
            .filter_map(|d| {
                let score = cosine_similarity(query, d.vector.as_deref()?);
                Some(SearchResult::new(d.clone(), score))
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
        Ok(self.lock_table().await?.get(id).cloned())
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let mut table = self.lock_table().await?;
        let mut staged = table.clone();
        let removed = ids.iter().filter(|id| staged.remove(*id).is_some()).count();
        if removed > 0 {
            self.persist(&staged).await?;
            *table = staged;
        }
        Ok(removed)
    }

    async fn health_check(&self) -> Result<HealthStatus, StoreError> {
        let start = Instant::now();
        match self.lock_table().await {
            Ok(_) => {
                let latency = start.elapsed().as_millis() as u64;
                Ok(HealthStatus::healthy("lancedb").with_latency(latency))
            }
            Err(e) => Ok(HealthStatus::unhealthy("lancedb", e.to_string()))
        }
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    dot / (norm_a * norm_b)
}
