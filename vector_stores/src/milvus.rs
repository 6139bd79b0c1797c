//! Milvus store over the RESTful v2 API (`/v2/vectordb/...`).
//!
//! Collections are created in quick-setup mode with a VarChar `id` primary key,
//! a `vector` field using the COSINE metric, and dynamic fields for `text` and
//! `attributes`. Id filters become boolean expressions of the form
//! `id in ["a", "b"]`; an empty id set is unrestricted.

use super::types::{ensure_dimension, ensure_positive_k, usize_from_number_or_string};
use super::{
    HealthStatus, QueryFilter, SearchResult, StoreConfig, StoreDocument, StoreError, VectorStore
};
use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Instant;

const ID_MAX_LENGTH: usize = 512;
const OUTPUT_FIELDS: [&str; 4] = ["id", "text", "attributes", "vector"];

#[derive(Debug, Clone, Deserialize)]
pub struct MilvusConfig {
    #[serde(default = "default_url")]
    pub url: String,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub db_name: Option<String>,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(
        default = "default_vector_size",
        deserialize_with = "usize_from_number_or_string"
    )]
    pub vector_size: usize
}

fn default_url() -> String {
    "http://localhost:19530".to_string()
}

fn default_collection_name() -> String {
    "documents".to_string()
}

fn default_vector_size() -> usize {
    1536
}

impl Default for MilvusConfig {
    fn default() -> Self {
        Self {
            url: default_url(),
            token: None,
            db_name: None,
            collection_name: default_collection_name(),
            vector_size: default_vector_size()
        }
    }
}

pub struct MilvusStore {
    client: Client,
    config: MilvusConfig
}

#[derive(Debug, Deserialize)]
struct MilvusResponse<T> {
    code: i64,
    #[serde(default)]
    message: Option<String>,
    data: Option<T>
}

#[derive(Debug, Deserialize)]
struct HasCollection {
    has: bool
}

#[derive(Debug, Serialize, Deserialize)]
struct MilvusEntity {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector: Option<Vec<f32>>,
    #[serde(default)]
    attributes: Map<String, Value>
}

impl MilvusEntity {
    fn into_store(self) -> StoreDocument {
        StoreDocument {
            id: self.id,
            text: self.text,
            vector: self.vector,
            attributes: self.attributes
        }
    }
}

impl From<StoreDocument> for MilvusEntity {
    fn from(document: StoreDocument) -> Self {
        Self {
            id: document.id,
            text: document.text,
            vector: document.vector,
            attributes: document.attributes
        }
    }
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    distance: f32,
    #[serde(flatten)]
    entity: MilvusEntity
}

impl MilvusStore {
    pub fn new(config: MilvusConfig) -> Result<Self, StoreError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ref token) = config.token {
            headers.insert(
                "Authorization",
                reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                    .map_err(|e| StoreError::Configuration(e.to_string()))?
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| StoreError::Configuration(e.to_string()))?;

        Ok(Self { client, config })
    }

    pub fn from_config(config: &StoreConfig) -> Result<Self, StoreError> {
        Self::new(config.deserialize_into()?)
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v2/vectordb/{}", self.config.url.trim_end_matches('/'), path)
    }

    /// Request body scoped to the configured database and collection.
    fn body(&self, extra: Value) -> Value {
        let mut body = Map::new();
        body.insert(
            "collectionName".to_string(),
            Value::String(self.config.collection_name.clone())
        );
        if let Some(ref db_name) = self.config.db_name {
            body.insert("dbName".to_string(), Value::String(db_name.clone()));
        }
        if let Value::Object(extra) = extra {
            body.extend(extra);
        }
        Value::Object(body)
    }

    async fn call<T: DeserializeOwned>(&self, path: &str, body: Value) -> Result<Option<T>, StoreError> {
        let resp = self
            .client
            .post(self.endpoint(path))
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(if status.is_server_error() {
                StoreError::BackendUnavailable(format!("{} failed with HTTP {}: {}", path, status, text))
            } else {
                StoreError::Internal(format!("{} failed with HTTP {}: {}", path, status, text))
            });
        }

        let envelope: MilvusResponse<T> = resp.json().await?;
        // Older proxies report success as 200
        if envelope.code != 0 && envelope.code != 200 {
            return Err(StoreError::Internal(format!(
                "{} failed with code {}: {}",
                path,
                envelope.code,
                envelope.message.unwrap_or_default()
            )));
        }
        Ok(envelope.data)
    }

    async fn has_collection(&self) -> Result<bool, StoreError> {
        let data: Option<HasCollection> = self
            .call("collections/has", self.body(Value::Null))
            .await?;
        Ok(data.is_some_and(|d| d.has))
    }

    async fn create_collection(&self) -> Result<(), StoreError> {
        let body = self.body(serde_json::json!({
            "dimension": self.config.vector_size,
            "metricType": "COSINE",
            "idType": "VarChar",
            "primaryFieldName": "id",
            "vectorFieldName": "vector",
            "params": { "max_length": ID_MAX_LENGTH }
        }));
        self.call::<Value>("collections/create", body).await?;
        tracing::info!(collection = %self.config.collection_name, "Created Milvus collection");
        Ok(())
    }

    async fn drop_collection(&self) -> Result<(), StoreError> {
        if self.has_collection().await? {
            self.call::<Value>("collections/drop", self.body(Value::Null))
                .await?;
        }
        Ok(())
    }

    async fn ensure_collection(&self) -> Result<(), StoreError> {
        if !self.has_collection().await? {
            self.create_collection().await?;
        }
        Ok(())
    }

    fn native_filter(&self, filter: Option<&QueryFilter>) -> Option<String> {
        match filter {
            None | Some(QueryFilter::Unrestricted) => None,
            Some(QueryFilter::Ids(ids)) => Some(id_in_expression(ids.iter())),
            Some(QueryFilter::Expression(expr)) => Some(expr.clone())
        }
    }
}

/// Milvus boolean expression matching the primary key against `ids`.
fn id_in_expression<'a>(ids: impl Iterator<Item = &'a String>) -> String {
    let mut ids: Vec<&String> = ids.collect();
    ids.sort();
    let literals = ids
        .iter()
        .map(|id| Value::String((*id).clone()).to_string())
        .collect::<Vec<_>>()
        .join(", ");
    format!("id in [{}]", literals)
}

#[async_trait]
impl VectorStore for MilvusStore {
    fn store_name(&self) -> &'static str {
        "milvus"
    }

    async fn load_documents(
        &self,
        documents: Vec<StoreDocument>,
        overwrite: bool
    ) -> Result<(), StoreError> {
        let mut entities = Vec::with_capacity(documents.len());
        for document in documents {
            let Some(vector) = &document.vector else {
                continue;
            };
            ensure_dimension(Some(self.config.vector_size), vector)?;
            entities.push(MilvusEntity::from(document));
        }

        if overwrite {
            self.drop_collection().await?;
            self.create_collection().await?;
        } else {
            self.ensure_collection().await?;
        }

        let count = entities.len();
        if count > 0 {
            let path = if overwrite {
                "entities/insert"
            } else {
                "entities/upsert"
            };
            let body = self.body(serde_json::json!({ "data": entities }));
            self.call::<Value>(path, body).await?;
        }

        tracing::debug!(
            collection = %self.config.collection_name,
            count,
            overwrite,
            "Loaded documents into Milvus"
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
        ensure_dimension(Some(self.config.vector_size), query)?;

        let mut extra = serde_json::json!({
            "data": [query],
            "annsField": "vector",
            "limit": k,
            "outputFields": OUTPUT_FIELDS
        });
        if let Some(expr) = self.native_filter(filter) {
            extra["filter"] = Value::String(expr);
        }

        let hits: Vec<SearchHit> = self
            .call("entities/search", self.body(extra))
            .await?
            .unwrap_or_default();

        let mut results: Vec<SearchResult> = hits
            .into_iter()
            .map(|hit| SearchResult::new(hit.entity.into_store(), hit.distance))
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    fn filter_by_id(&self, include_ids: &HashSet<String>) -> QueryFilter {
        if include_ids.is_empty() {
            QueryFilter::Unrestricted
        } else {
            QueryFilter::Expression(id_in_expression(include_ids.iter()))
        }
    }

    async fn search_by_id(&self, id: &str) -> Result<Option<StoreDocument>, StoreError> {
        let body = self.body(serde_json::json!({
            "id": [id],
            "outputFields": OUTPUT_FIELDS
        }));

        let entities: Vec<MilvusEntity> = self
            .call("entities/get", body)
            .await?
            .unwrap_or_default();
        Ok(entities.into_iter().next().map(MilvusEntity::into_store))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        if ids.is_empty() {
            return Ok(0);
        }

        let body = self.body(serde_json::json!({
            "filter": id_in_expression(ids.iter())
        }));
        self.call::<Value>("entities/delete", body).await?;
        Ok(ids.len())
    }

    async fn health_check(&self) -> Result<HealthStatus, StoreError> {
        let start = Instant::now();
        let body = match self.config.db_name {
            Some(ref db_name) => serde_json::json!({ "dbName": db_name }),
            None => serde_json::json!({})
        };

        match self.call::<Value>("collections/list", body).await {
            Ok(_) => {
                let latency = start.elapsed().as_millis() as u64;
                Ok(HealthStatus::healthy("milvus").with_latency(latency))
            }
            Err(e) => Ok(HealthStatus::unhealthy("milvus", e.to_string()))
        }
    }
}
