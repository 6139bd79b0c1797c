//! Azure AI Search store, spoken to over its REST API.
//!
//! Documents live in one search index per collection with the fields `id`
//! (key), `vector`, `text` and `attributes` (a JSON-encoded string). Id filters
//! become OData `search.in` expressions; an empty id set is unrestricted.

use super::types::{ensure_dimension, ensure_positive_k, usize_from_number_or_string};
use super::{
    HealthStatus, QueryFilter, SearchResult, StoreConfig, StoreDocument, StoreError, VectorStore
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::time::Instant;

const HNSW_ALGORITHM_NAME: &str = "hnsw-config";

#[derive(Debug, Clone, Deserialize)]
pub struct AzureAiSearchConfig {
    pub url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    #[serde(default = "default_collection_name")]
    pub collection_name: String,
    #[serde(
        default = "default_vector_size",
        deserialize_with = "usize_from_number_or_string"
    )]
    pub vector_size: usize,
    #[serde(default = "default_profile_name")]
    pub vector_search_profile_name: String,
    #[serde(default = "default_api_version")]
    pub api_version: String
}

fn default_collection_name() -> String {
    "documents".to_string()
}

fn default_vector_size() -> usize {
    1536
}

fn default_profile_name() -> String {
    "vectorSearchProfile".to_string()
}

fn default_api_version() -> String {
    "2024-07-01".to_string()
}

pub struct AzureAiSearchStore {
    client: Client,
    config: AzureAiSearchConfig
}

#[derive(Debug, Serialize, Deserialize)]
struct AzureDocument {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    vector: Option<Vec<f32>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    attributes: Option<String>
}

impl AzureDocument {
    fn from_store(document: StoreDocument) -> Result<Self, StoreError> {
        Ok(Self {
            id: document.id,
            text: document.text,
            vector: document.vector,
            attributes: Some(serde_json::to_string(&document.attributes)?)
        })
    }

    fn key_only(id: &str) -> Self {
        Self {
            id: id.to_string(),
            text: None,
            vector: None,
            attributes: None
        }
    }

    fn into_store(self) -> StoreDocument {
        let attributes: Map<String, Value> = self
            .attributes
            .as_deref()
            .and_then(|s| serde_json::from_str(s).ok())
            .unwrap_or_default();

        StoreDocument {
            id: self.id,
            text: self.text,
            vector: self.vector,
            attributes
        }
    }
}

#[derive(Debug, Serialize)]
struct IndexAction {
    #[serde(rename = "@search.action")]
    action: &'static str,
    #[serde(flatten)]
    document: AzureDocument
}

#[derive(Debug, Serialize)]
struct IndexBatch {
    value: Vec<IndexAction>
}

#[derive(Debug, Deserialize)]
struct IndexBatchResponse {
    #[serde(default)]
    value: Vec<IndexingResult>
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IndexingResult {
    key: String,
    status: bool,
    #[serde(default)]
    error_message: Option<String>
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest {
    vector_queries: Vec<VectorQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    filter: Option<String>,
    top: usize,
    select: &'static str
}

#[derive(Debug, Serialize)]
struct VectorQuery {
    kind: &'static str,
    vector: Vec<f32>,
    k: usize,
    fields: &'static str
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    value: Vec<SearchHit>
}

#[derive(Debug, Deserialize)]
struct SearchHit {
    #[serde(rename = "@search.score")]
    score: f32,
    #[serde(flatten)]
    document: AzureDocument
}

impl AzureAiSearchStore {
    pub fn new(config: AzureAiSearchConfig) -> Result<Self, StoreError> {
        let mut headers = reqwest::header::HeaderMap::new();
        if let Some(ref api_key) = config.api_key {
            headers.insert(
                "api-key",
                reqwest::header::HeaderValue::from_str(api_key)
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

    fn index_url(&self, suffix: &str) -> String {
        format!(
            "{}/indexes/{}{}?api-version={}",
            self.config.url.trim_end_matches('/'),
            self.config.collection_name,
            suffix,
            self.config.api_version
        )
    }

    fn index_schema(&self) -> Value {
        serde_json::json!({
            "name": self.config.collection_name,
            "fields": [
                {
                    "name": "id",
                    "type": "Edm.String",
                    "key": true,
                    "filterable": true
                },
                {
                    "name": "vector",
                    "type": "Collection(Edm.Single)",
                    "searchable": true,
                    "retrievable": true,
                    "dimensions": self.config.vector_size,
                    "vectorSearchProfile": self.config.vector_search_profile_name
                },
                {
                    "name": "text",
                    "type": "Edm.String",
                    "searchable": true
                },
                {
                    "name": "attributes",
                    "type": "Edm.String"
                }
            ],
            "vectorSearch": {
                "algorithms": [
                    {
                        "name": HNSW_ALGORITHM_NAME,
                        "kind": "hnsw",
                        "hnswParameters": { "metric": "cosine" }
                    }
                ],
                "profiles": [
                    {
                        "name": self.config.vector_search_profile_name,
                        "algorithm": HNSW_ALGORITHM_NAME
                    }
                ]
            }
        })
    }

    async fn delete_index(&self) -> Result<(), StoreError> {
        let resp = self.client.delete(self.index_url("")).send().await?;
        match resp.status() {
            s if s.is_success() || s == StatusCode::NOT_FOUND => Ok(()),
            status => Err(status_error(status, resp.text().await.unwrap_or_default(), "Delete index"))
        }
    }

    async fn create_index(&self) -> Result<(), StoreError> {
        let resp = self
            .client
            .put(self.index_url(""))
            .json(&self.index_schema())
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_error(status, resp.text().await.unwrap_or_default(), "Create index"));
        }
        tracing::info!(index = %self.config.collection_name, "Created Azure AI Search index");
        Ok(())
    }

    async fn ensure_index(&self) -> Result<(), StoreError> {
        let resp = self.client.get(self.index_url("")).send().await?;
        match resp.status() {
            s if s.is_success() => Ok(()),
            StatusCode::NOT_FOUND => self.create_index().await,
            status => Err(status_error(status, resp.text().await.unwrap_or_default(), "Get index"))
        }
    }

    async fn submit(&self, actions: Vec<IndexAction>) -> Result<Vec<IndexingResult>, StoreError> {
        if actions.is_empty() {
            return Ok(Vec::new());
        }

        let resp = self
            .client
            .post(self.index_url("/docs/index"))
            .json(&IndexBatch { value: actions })
            .send()
            .await?;

        let status = resp.status();
        // 207 carries per-document results
        if !status.is_success() {
            return Err(status_error(status, resp.text().await.unwrap_or_default(), "Index batch"));
        }

        let body: IndexBatchResponse = resp.json().await?;
        Ok(body.value)
    }

    fn native_filter(&self, filter: Option<&QueryFilter>) -> Option<String> {
        match filter {
            None | Some(QueryFilter::Unrestricted) => None,
            Some(QueryFilter::Ids(ids)) => Some(search_in_expression(ids.iter())),
            Some(QueryFilter::Expression(expr)) => Some(expr.clone())
        }
    }
}

fn status_error(status: StatusCode, body: String, context: &str) -> StoreError {
    match status {
        StatusCode::NOT_FOUND => StoreError::NotFound(format!("{} failed: {}", context, body)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            StoreError::Configuration(format!("{} rejected credentials: {}", context, body))
        }
        s if s.is_server_error() || s == StatusCode::TOO_MANY_REQUESTS => {
            StoreError::BackendUnavailable(format!("{} failed with HTTP {}: {}", context, s, body))
        }
        s => StoreError::Internal(format!("{} failed with HTTP {}: {}", context, s, body))
    }
}

const SEARCH_IN_DELIMITERS: [char; 6] = [',', '|', ';', '~', '^', '#'];

/// OData filter over the key field. Ids are sorted so the expression is
/// stable. `search.in` uses the first delimiter that no id contains; when
/// every candidate appears in some id, the ids are or-ed with `eq`.
fn search_in_expression<'a>(ids: impl Iterator<Item = &'a String>) -> String {
    let mut ids: Vec<String> = ids.map(|id| id.replace('\'', "''")).collect();
    ids.sort();

    let delimiter = SEARCH_IN_DELIMITERS
        .into_iter()
        .find(|d| !ids.iter().any(|id| id.contains(*d)));

    match delimiter {
        Some(delimiter) => format!(
            "search.in(id, '{}', '{}')",
            ids.join(&delimiter.to_string()),
            delimiter
        ),
        None => ids
            .iter()
            .map(|id| format!("id eq '{}'", id))
            .collect::<Vec<_>>()
            .join(" or ")
    }
}

#[async_trait]
impl VectorStore for AzureAiSearchStore {
    fn store_name(&self) -> &'static str {
        "azure_ai_search"
    }

    async fn load_documents(
        &self,
        documents: Vec<StoreDocument>,
        overwrite: bool
    ) -> Result<(), StoreError> {
        let mut actions = Vec::with_capacity(documents.len());
        for document in documents {
            let Some(vector) = &document.vector else {
                continue;
            };
            ensure_dimension(Some(self.config.vector_size), vector)?;
            actions.push(IndexAction {
                action: if overwrite { "upload" } else { "mergeOrUpload" },
                document: AzureDocument::from_store(document)?
            });
        }

        if overwrite {
            self.delete_index().await?;
            self.create_index().await?;
        } else {
            self.ensure_index().await?;
        }

        let count = actions.len();
        let results = self.submit(actions).await?;
        let failed: Vec<String> = results
            .into_iter()
            .filter(|r| !r.status)
            .map(|r| match r.error_message {
                Some(msg) => format!("{} ({})", r.key, msg),
                None => r.key
            })
            .collect();

        if !failed.is_empty() {
            return Err(StoreError::Internal(format!(
                "Failed to index documents: {}",
                failed.join(", ")
            )));
        }

        tracing::debug!(
            index = %self.config.collection_name,
            count,
            overwrite,
            "Loaded documents into Azure AI Search"
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

        let request = SearchRequest {
            vector_queries: vec![VectorQuery {
                kind: "vector",
                vector: query.to_vec(),
                k,
                fields: "vector"
            }],
            filter: self.native_filter(filter),
            top: k,
            select: "id,text,vector,attributes"
        };

        let resp = self
            .client
            .post(self.index_url("/docs/search"))
            .json(&request)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_error(status, resp.text().await.unwrap_or_default(), "Search"));
        }

        let body: SearchResponse = resp.json().await?;
        let mut results: Vec<SearchResult> = body
            .value
            .into_iter()
            .map(|hit| SearchResult::new(hit.document.into_store(), hit.score))
            .collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(k);
        Ok(results)
    }

    fn filter_by_id(&self, include_ids: &HashSet<String>) -> QueryFilter {
        if include_ids.is_empty() {
            QueryFilter::Unrestricted
        } else {
            QueryFilter::Expression(search_in_expression(include_ids.iter()))
        }
    }

    async fn search_by_id(&self, id: &str) -> Result<Option<StoreDocument>, StoreError> {
        let suffix = format!("/docs/{}", urlencoding::encode(id));
        let resp = self.client.get(self.index_url(&suffix)).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            return Err(status_error(status, resp.text().await.unwrap_or_default(), "Lookup"));
        }

        let document: AzureDocument = resp.json().await?;
        Ok(Some(document.into_store()))
    }

    async fn delete(&self, ids: &[String]) -> Result<usize, StoreError> {
        let actions = ids
            .iter()
            .map(|id| IndexAction {
                action: "delete",
                document: AzureDocument::key_only(id)
            })
            .collect();

        let results = self.submit(actions).await?;
        Ok(results.iter().filter(|r| r.status).count())
    }

    async fn health_check(&self) -> Result<HealthStatus, StoreError> {
        let start = Instant::now();
        let url = format!(
            "{}/servicestats?api-version={}",
            self.config.url.trim_end_matches('/'),
            self.config.api_version
        );

        match self.client.get(&url).send().await {
            Ok(resp) if resp.status().is_success() => {
                let latency = start.elapsed().as_millis() as u64;
                Ok(HealthStatus::healthy("azure_ai_search").with_latency(latency))
            }
            Ok(resp) => Ok(HealthStatus::unhealthy(
                "azure_ai_search",
                format!("HTTP {}", resp.status())
            )),
            Err(e) => Ok(HealthStatus::unhealthy("azure_ai_search", e.to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn store() -> AzureAiSearchStore {
        AzureAiSearchStore::from_config(
            &StoreConfig::new()
                .with("url", "https://search.example.net/")
                .with("collection_name", "entities")
        )
        .unwrap()
    }

    #[test]
    fn test_config_requires_url() {
        let err = AzureAiSearchStore::from_config(&StoreConfig::new())
            .err()
            .unwrap();
        assert!(matches!(err, StoreError::Configuration(_)));
    }

    #[test]
    fn test_config_defaults() {
        let config: AzureAiSearchConfig = StoreConfig::new()
            .with("url", "https://x")
            .deserialize_into()
            .unwrap();
        assert_eq!(config.vector_size, 1536);
        assert_eq!(config.collection_name, "documents");
        assert_eq!(config.vector_search_profile_name, "vectorSearchProfile");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn test_index_url_trims_trailing_slash() {
        assert_eq!(
            store().index_url("/docs/search"),
            "https://search.example.net/indexes/entities/docs/search?api-version=2024-07-01"
        );
    }

    #[test]
    fn test_filter_by_id() {
        let store = store();
        assert!(store.filter_by_id(&HashSet::new()).is_unrestricted());

        let ids = HashSet::from(["b".to_string(), "a".to_string()]);
        assert_eq!(
            store.filter_by_id(&ids),
            QueryFilter::Expression("search.in(id, 'a,b', ',')".into())
        );
    }

    #[test]
    fn test_search_in_escapes_and_switches_delimiter() {
        let ids: BTreeSet<String> = ["o'neil".to_string(), "x,y".to_string()].into();
        assert_eq!(
            search_in_expression(ids.iter()),
            "search.in(id, 'o''neil|x,y', '|')"
        );

        let ids: BTreeSet<String> = ["a,b".to_string(), "c|d".to_string()].into();
        assert_eq!(
            search_in_expression(ids.iter()),
            "search.in(id, 'a,b;c|d', ';')"
        );
    }

    #[test]
    fn test_search_in_falls_back_to_eq_chain() {
        let ids: BTreeSet<String> = [",|;".to_string(), "~^#".to_string()].into();
        assert_eq!(
            search_in_expression(ids.iter()),
            "id eq ',|;' or id eq '~^#'"
        );
    }

    #[test]
    fn test_native_filter_converts_id_sets() {
        let ids: BTreeSet<String> = ["a".to_string()].into();
        assert_eq!(
            store().native_filter(Some(&QueryFilter::Ids(ids))),
            Some("search.in(id, 'a', ',')".to_string())
        );
        assert_eq!(store().native_filter(Some(&QueryFilter::Unrestricted)), None);
    }

    #[test]
    fn test_document_round_trip_through_attributes_string() {
        let doc = StoreDocument::new("d")
            .with_text("t")
            .with_vector(vec![0.5])
            .with_attribute("title", "x");
        let azure = AzureDocument::from_store(doc.clone()).unwrap();
        assert_eq!(azure.attributes.as_deref(), Some(r#"{"title":"x"}"#));
        assert_eq!(azure.into_store(), doc);
    }

    #[test]
    fn test_index_action_serialization() {
        let action = IndexAction {
            action: "delete",
            document: AzureDocument::key_only("a")
        };
        assert_eq!(
            serde_json::to_value(&action).unwrap(),
            serde_json::json!({ "@search.action": "delete", "id": "a" })
        );
    }
}
