//! Pinecone vector store backend.
//!
//! Provides [`PineconeVectorStore`], which implements [`VectorStore`] over
//! Pinecone's REST API with `reqwest`. Index management goes to the control
//! plane; upserts and queries go to the index's own host, which is looked up
//! once per index and cached.
//!
//! Chunk text, document id and metadata are stored as flat Pinecone metadata
//! so that metadata filters can address them directly.
//!
//! # Example
//!
//! ```rust,ignore
//! use pdfchat_rag::pinecone::{PineconeConfig, PineconeVectorStore};
//!
//! let store = PineconeVectorStore::new(PineconeConfig::from_env()?);
//! store.ensure_collection(&CollectionSpec::default()).await?;
//! let results = store.query("collectiondb", &query_embedding, 4, None).await?;
//! ```

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Map, Value, json};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::document::{MetadataFilter, SearchResult, VectorEntry};
use crate::error::{RagError, Result};
use crate::retry::{RetryPolicy, with_timeout};
use crate::vectorstore::{CollectionSpec, DistanceMetric, FailedEntry, UpsertReport, VectorStore};

const BACKEND: &str = "pinecone";
const API_VERSION: &str = "2024-07";

/// Connection settings for Pinecone.
#[derive(Clone)]
pub struct PineconeConfig {
    pub api_key: String,
    /// Region serverless indexes are created in, e.g. `us-east-1`.
    pub environment: String,
    /// Cloud serverless indexes are created in.
    pub cloud: String,
    pub control_plane_url: String,
    /// Namespace within each index. `None` uses the default namespace.
    pub namespace: Option<String>,
    pub request_timeout: Duration,
    pub retry: RetryPolicy,
    /// Vectors per upsert request.
    pub upsert_batch_size: usize,
    /// How long to wait for a new index to become ready.
    pub ready_timeout: Duration,
    pub ready_poll_interval: Duration,
}

impl PineconeConfig {
    /// # Errors
    ///
    /// Returns [`RagError::ConfigError`] if the key or environment is empty.
    pub fn new(api_key: impl Into<String>, environment: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        let environment = environment.into();
        if api_key.trim().is_empty() {
            return Err(RagError::ConfigError("Pinecone API key must not be empty".to_string()));
        }
        if environment.trim().is_empty() {
            return Err(RagError::ConfigError("Pinecone environment must not be empty".to_string()));
        }
        Ok(Self {
            api_key,
            environment,
            cloud: "aws".to_string(),
            control_plane_url: "https://api.pinecone.io".to_string(),
            namespace: None,
            request_timeout: Duration::from_secs(60),
            retry: RetryPolicy::default(),
            upsert_batch_size: 100,
            ready_timeout: Duration::from_secs(120),
            ready_poll_interval: Duration::from_secs(1),
        })
    }

    /// Read `PINECONE_API_KEY` and `PINECONE_ENVIRONMENT`.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("PINECONE_API_KEY").map_err(|_| {
            RagError::ConfigError("PINECONE_API_KEY environment variable not set".to_string())
        })?;
        let environment = std::env::var("PINECONE_ENVIRONMENT").map_err(|_| {
            RagError::ConfigError("PINECONE_ENVIRONMENT environment variable not set".to_string())
        })?;
        Self::new(api_key, environment)
    }

    pub fn with_control_plane_url(mut self, url: impl Into<String>) -> Self {
        self.control_plane_url = url.into();
        self
    }

    pub fn with_cloud(mut self, cloud: impl Into<String>) -> Self {
        self.cloud = cloud.into();
        self
    }

    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_upsert_batch_size(mut self, size: usize) -> Self {
        self.upsert_batch_size = size.max(1);
        self
    }

    pub fn with_ready_timeout(mut self, timeout: Duration, poll_interval: Duration) -> Self {
        self.ready_timeout = timeout;
        self.ready_poll_interval = poll_interval;
        self
    }
}

impl fmt::Debug for PineconeConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeConfig")
            .field("api_key", &"<redacted>")
            .field("environment", &self.environment)
            .field("cloud", &self.cloud)
            .field("control_plane_url", &self.control_plane_url)
            .field("namespace", &self.namespace)
            .field("request_timeout", &self.request_timeout)
            .field("retry", &self.retry)
            .field("upsert_batch_size", &self.upsert_batch_size)
            .finish()
    }
}

/// Shape and location of an index. No vector data is cached.
#[derive(Debug, Clone, PartialEq)]
struct IndexInfo {
    base_url: String,
    dimension: usize,
    metric: DistanceMetric,
}

#[derive(Deserialize)]
struct IndexDescription {
    dimension: usize,
    metric: DistanceMetric,
    #[serde(default)]
    host: String,
    #[serde(default)]
    status: IndexStatus,
}

#[derive(Deserialize, Default)]
struct IndexStatus {
    #[serde(default)]
    ready: bool,
}

#[derive(Deserialize)]
struct QueryResponse {
    #[serde(default)]
    matches: Vec<QueryMatch>,
}

#[derive(Deserialize)]
struct QueryMatch {
    id: String,
    score: f32,
    #[serde(default)]
    metadata: Map<String, Value>,
}

/// A [`VectorStore`] backed by [Pinecone](https://www.pinecone.io/).
pub struct PineconeVectorStore {
    client: reqwest::Client,
    config: PineconeConfig,
    indexes: RwLock<HashMap<String, IndexInfo>>,
}

impl PineconeVectorStore {
    pub fn new(config: PineconeConfig) -> Self {
        Self { client: reqwest::Client::new(), config, indexes: RwLock::new(HashMap::new()) }
    }

    pub fn config(&self) -> &PineconeConfig {
        &self.config
    }

    fn control_url(&self, path: &str) -> String {
        format!("{}{path}", self.config.control_plane_url.trim_end_matches('/'))
    }

    fn request(&self, method: Method, url: &str) -> RequestBuilder {
        self.client
            .request(method, url)
            .header("Api-Key", &self.config.api_key)
            .header("X-Pinecone-API-Version", API_VERSION)
    }

    fn store_error(message: impl Into<String>) -> RagError {
        RagError::VectorStoreError { backend: BACKEND.to_string(), message: message.into() }
    }

    /// Send a request with retries. Rate limiting, server errors, connection
    /// failures and timeouts are retried; any other response is returned.
    async fn call<F>(&self, operation: &str, build: F) -> Result<Response>
    where
        F: Fn() -> RequestBuilder,
    {
        let timeout = self.config.request_timeout;
        self.config
            .retry
            .execute(operation, || {
                let request = build();
                let send = async move {
                    let response = request.send().await.map_err(|e| RagError::UnavailableError {
                        service: BACKEND.to_string(),
                        message: format!("request failed: {e}"),
                    })?;
                    let status = response.status();
                    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                        let body = response.text().await.unwrap_or_default();
                        return Err(RagError::UnavailableError {
                            service: BACKEND.to_string(),
                            message: format!("{status}: {body}"),
                        });
                    }
                    Ok(response)
                };
                with_timeout(operation, timeout, send)
            })
            .await
            .map_err(|e| match e {
                RagError::UnavailableError { message, .. } => {
                    Self::store_error(format!("{operation} failed after retries: {message}"))
                }
                other => other,
            })
    }

    async fn expect_success(operation: &str, response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Self::store_error(format!("{operation} returned {status}: {body}")))
    }

    /// Describe an index; `None` if it does not exist.
    async fn describe(&self, name: &str) -> Result<Option<IndexDescription>> {
        let url = self.control_url(&format!("/indexes/{name}"));
        let response = self.call("describe_index", || self.request(Method::GET, &url)).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::expect_success("describe_index", response).await?;
        let description = response
            .json::<IndexDescription>()
            .await
            .map_err(|e| Self::store_error(format!("invalid index description: {e}")))?;
        Ok(Some(description))
    }

    async fn cache(&self, name: &str, description: &IndexDescription) -> IndexInfo {
        let info = IndexInfo {
            base_url: normalize_host(&description.host),
            dimension: description.dimension,
            metric: description.metric,
        };
        self.indexes.write().await.insert(name.to_string(), info.clone());
        info
    }

    /// Resolve an index's host and shape, describing it on first use.
    async fn index(&self, name: &str) -> Result<IndexInfo> {
        if let Some(info) = self.indexes.read().await.get(name) {
            return Ok(info.clone());
        }
        match self.describe(name).await? {
            Some(description) => Ok(self.cache(name, &description).await),
            None => Err(Self::store_error(format!("index '{name}' does not exist"))),
        }
    }

    async fn wait_until_ready(&self, name: &str) -> Result<IndexDescription> {
        let deadline = tokio::time::Instant::now() + self.config.ready_timeout;
        loop {
            if let Some(description) = self.describe(name).await? {
                if description.status.ready && !description.host.is_empty() {
                    return Ok(description);
                }
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(RagError::TimeoutError {
                    operation: format!("waiting for index '{name}'"),
                    after: self.config.ready_timeout,
                });
            }
            debug!(index = name, "index not ready yet");
            tokio::time::sleep(self.config.ready_poll_interval).await;
        }
    }

    fn namespace_field(&self, body: &mut Map<String, Value>) {
        if let Some(namespace) = &self.config.namespace {
            body.insert("namespace".to_string(), Value::String(namespace.clone()));
        }
    }

    async fn upsert_batch(&self, info: &IndexInfo, batch: &[&VectorEntry]) -> Result<()> {
        let vectors: Vec<Value> = batch
            .iter()
            .map(|entry| {
                json!({
                    "id": entry.id,
                    "values": entry.vector,
                    "metadata": entry_metadata(entry),
                })
            })
            .collect();
        let mut body = Map::new();
        body.insert("vectors".to_string(), Value::Array(vectors));
        self.namespace_field(&mut body);
        let body = Value::Object(body);

        let url = format!("{}/vectors/upsert", info.base_url);
        let response =
            self.call("upsert", || self.request(Method::POST, &url).json(&body)).await?;
        Self::expect_success("upsert", response).await?;
        Ok(())
    }
}

impl fmt::Debug for PineconeVectorStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PineconeVectorStore").field("config", &self.config).finish()
    }
}

/// Index hosts are returned without a scheme.
fn normalize_host(host: &str) -> String {
    let host = host.trim_end_matches('/');
    if host.starts_with("http://") || host.starts_with("https://") {
        host.to_string()
    } else {
        format!("https://{host}")
    }
}

/// Flatten an entry into Pinecone metadata: its own metadata plus `text` and
/// `document_id`, which take precedence.
fn entry_metadata(entry: &VectorEntry) -> Map<String, Value> {
    let mut metadata: Map<String, Value> =
        entry.metadata.iter().map(|(k, v)| (k.clone(), Value::String(v.clone()))).collect();
    metadata.insert("text".to_string(), Value::String(entry.text.clone()));
    metadata.insert("document_id".to_string(), Value::String(entry.document_id.clone()));
    metadata
}

fn filter_body(filter: &MetadataFilter) -> Value {
    let clauses: Map<String, Value> =
        filter.0.iter().map(|(k, v)| (k.clone(), json!({ "$eq": v }))).collect();
    Value::Object(clauses)
}

fn take_string(metadata: &mut Map<String, Value>, key: &str) -> String {
    match metadata.remove(key) {
        Some(Value::String(s)) => s,
        Some(other) => other.to_string(),
        None => String::new(),
    }
}

fn into_result(mut m: QueryMatch) -> SearchResult {
    let text = take_string(&mut m.metadata, "text");
    let document_id = take_string(&mut m.metadata, "document_id");
    let metadata = m
        .metadata
        .into_iter()
        .map(|(k, v)| match v {
            Value::String(s) => (k, s),
            other => (k, other.to_string()),
        })
        .collect();
    SearchResult {
        entry: VectorEntry { id: m.id, vector: Vec::new(), text, document_id, metadata },
        score: m.score,
    }
}

#[async_trait]
impl VectorStore for PineconeVectorStore {
    async fn ensure_collection(&self, spec: &CollectionSpec) -> Result<()> {
        if let Some(existing) = self.describe(&spec.name).await? {
            if existing.dimension != spec.dimension || existing.metric != spec.metric {
                return Err(RagError::ConfigError(format!(
                    "index '{}' exists with dimension {} and metric {}, expected {} and {}",
                    spec.name, existing.dimension, existing.metric, spec.dimension, spec.metric
                )));
            }
            let ready = if existing.status.ready && !existing.host.is_empty() {
                existing
            } else {
                self.wait_until_ready(&spec.name).await?
            };
            self.cache(&spec.name, &ready).await;
            debug!(index = %spec.name, "pinecone index already exists");
            return Ok(());
        }

        let body = json!({
            "name": spec.name,
            "dimension": spec.dimension,
            "metric": spec.metric.as_str(),
            "spec": {
                "serverless": { "cloud": self.config.cloud, "region": self.config.environment }
            },
        });
        let url = self.control_url("/indexes");
        let response =
            self.call("create_index", || self.request(Method::POST, &url).json(&body)).await?;
        if response.status() == StatusCode::CONFLICT {
            warn!(index = %spec.name, "index was created concurrently");
        } else {
            Self::expect_success("create_index", response).await?;
        }

        let ready = self.wait_until_ready(&spec.name).await?;
        self.cache(&spec.name, &ready).await;
        info!(
            index = %spec.name,
            dimension = spec.dimension,
            metric = %spec.metric,
            "created pinecone index"
        );
        Ok(())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let url = self.control_url(&format!("/indexes/{name}"));
        let response = self.call("delete_index", || self.request(Method::DELETE, &url)).await?;
        self.indexes.write().await.remove(name);
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index = name, "pinecone index already absent");
            return Ok(());
        }
        Self::expect_success("delete_index", response).await?;
        debug!(index = name, "deleted pinecone index");
        Ok(())
    }

    async fn upsert(&self, collection: &str, entries: &[VectorEntry]) -> Result<UpsertReport> {
        let mut report = UpsertReport::default();
        if entries.is_empty() {
            return Ok(report);
        }
        let info = self.index(collection).await?;

        let (valid, invalid): (Vec<&VectorEntry>, Vec<&VectorEntry>) =
            entries.iter().partition(|e| e.vector.len() == info.dimension);
        for entry in invalid {
            report.failed.push(FailedEntry {
                id: entry.id.clone(),
                reason: format!(
                    "dimension mismatch: collection expects {}, got {}",
                    info.dimension,
                    entry.vector.len()
                ),
            });
        }

        for batch in valid.chunks(self.config.upsert_batch_size.max(1)) {
            match self.upsert_batch(&info, batch).await {
                Ok(()) => report.succeeded.extend(batch.iter().map(|e| e.id.clone())),
                Err(e) => {
                    warn!(
                        index = collection,
                        batch_size = batch.len(),
                        error = %e,
                        "upsert batch failed"
                    );
                    let reason = e.to_string();
                    report.failed.extend(batch.iter().map(|entry| FailedEntry {
                        id: entry.id.clone(),
                        reason: reason.clone(),
                    }));
                }
            }
        }

        debug!(
            index = collection,
            succeeded = report.succeeded.len(),
            failed = report.failed.len(),
            "upserted vectors to pinecone"
        );
        Ok(report)
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        top_k: usize,
        filter: Option<&MetadataFilter>,
    ) -> Result<Vec<SearchResult>> {
        let info = self.index(collection).await?;
        if embedding.len() != info.dimension {
            return Err(RagError::DimensionMismatchError {
                expected: info.dimension,
                actual: embedding.len(),
            });
        }
        if top_k == 0 {
            return Ok(Vec::new());
        }

        let mut body = Map::new();
        body.insert("vector".to_string(), json!(embedding));
        body.insert("topK".to_string(), json!(top_k));
        body.insert("includeMetadata".to_string(), Value::Bool(true));
        body.insert("includeValues".to_string(), Value::Bool(false));
        if let Some(filter) = filter.filter(|f| !f.is_empty()) {
            body.insert("filter".to_string(), filter_body(filter));
        }
        self.namespace_field(&mut body);
        let body = Value::Object(body);

        let url = format!("{}/query", info.base_url);
        let response = self.call("query", || self.request(Method::POST, &url).json(&body)).await?;
        let response = Self::expect_success("query", response).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Self::store_error(format!("invalid query response: {e}")))?;

        let mut results: Vec<SearchResult> = parsed.matches.into_iter().map(into_result).collect();
        results.sort_by(|a, b| b.score.total_cmp(&a.score));
        results.truncate(top_k);
        debug!(index = collection, top_k, result_count = results.len(), "pinecone query completed");
        Ok(results)
    }
}
