//! Chroma vector backend over its v1 REST API.
//!
//! Provides [`ChromaBackend`] which implements [`VectorBackend`] against a
//! running Chroma server. Collections are addressed by name at this level;
//! the server-assigned collection ids are resolved once and cached.
//!
//! This module is only available when the `chroma` feature is enabled.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragcore::chroma::ChromaBackend;
//!
//! let backend = ChromaBackend::default_url()?;
//! backend.ensure_collection("documents").await?;
//! let hits = backend.query("documents", &embedding, 50).await?;
//! ```

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;
use tracing::debug;

use crate::backend::VectorBackend;
use crate::document::{MetaValue, Metadata, QueryHit, StoredChunk, VectorRecord};
use crate::error::{RagError, Result};

/// Per-request transport timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// A [`VectorBackend`] backed by a [Chroma](https://www.trychroma.com/) server.
///
/// Collections are created with cosine distance, matching the scale used by
/// the in-memory backend. Record metadata is stored as Chroma's flat
/// per-record metadata object and read back unchanged.
pub struct ChromaBackend {
    client: reqwest::Client,
    base_url: String,
    /// Collection name → server-assigned collection id.
    ids: RwLock<HashMap<String, String>>,
}

impl ChromaBackend {
    /// Create a new backend for the server at `base_url`.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let client = reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| {
            RagError::Config(format!("failed to build Chroma HTTP client: {e}"))
        })?;

        Ok(Self { client, base_url, ids: RwLock::new(HashMap::new()) })
    }

    /// Create a new backend with the default URL (`http://localhost:8000`).
    pub fn default_url() -> Result<Self> {
        Self::new("http://localhost:8000")
    }

    fn unavailable(message: String) -> RagError {
        RagError::IndexUnavailable { backend: "chroma".to_string(), message }
    }

    fn collections_url(&self) -> String {
        format!("{}/api/v1/collections", self.base_url)
    }

    fn collection_url(&self, id: &str, verb: &str) -> String {
        format!("{}/api/v1/collections/{id}/{verb}", self.base_url)
    }

    /// Resolve a collection name to its server id, creating the collection
    /// on first access.
    async fn collection_id(&self, name: &str) -> Result<String> {
        if let Some(id) = self.ids.read().await.get(name) {
            return Ok(id.clone());
        }

        let payload = CreateCollectionPayload {
            name,
            get_or_create: true,
            metadata: json!({"hnsw:space": "cosine"}),
        };
        let response = self
            .client
            .post(self.collections_url())
            .json(&payload)
            .send()
            .await
            .map_err(|e| Self::unavailable(format!("create collection failed: {e}")))?;
        let response = ensure_success(response).await?;

        let info: CollectionInfo = response
            .json()
            .await
            .map_err(|e| Self::unavailable(format!("malformed create response: {e}")))?;

        debug!(collection = name, id = %info.id, "resolved chroma collection");
        self.ids.write().await.insert(name.to_string(), info.id.clone());
        Ok(info.id)
    }

    async fn post_json<B: Serialize>(&self, url: &str, body: &B) -> Result<reqwest::Response> {
        let response = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| Self::unavailable(format!("request failed: {e}")))?;
        ensure_success(response).await
    }

    /// Fetch stored chunks via the `get` endpoint with the given payload.
    async fn fetch(&self, collection: &str, payload: &GetPayload<'_>) -> Result<Vec<StoredChunk>> {
        let id = self.collection_id(collection).await?;
        let response = self.post_json(&self.collection_url(&id, "get"), payload).await?;
        let parsed: GetResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable(format!("malformed get response: {e}")))?;
        Ok(parsed.into_chunks())
    }
}

// ── Chroma API request/response types ──────────────────────────────

#[derive(Serialize)]
struct CreateCollectionPayload<'a> {
    name: &'a str,
    get_or_create: bool,
    metadata: serde_json::Value,
}

#[derive(Deserialize)]
struct CollectionInfo {
    id: String,
    name: String,
}

#[derive(Serialize)]
struct UpsertPayload<'a> {
    ids: Vec<&'a str>,
    embeddings: Vec<&'a [f32]>,
    documents: Vec<&'a str>,
    metadatas: Vec<&'a Metadata>,
}

#[derive(Serialize)]
struct DeletePayload<'a> {
    #[serde(rename = "where")]
    filter: HashMap<&'a str, &'a MetaValue>,
}

#[derive(Serialize)]
struct GetPayload<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    ids: Option<Vec<&'a str>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    where_document: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<usize>,
    include: Vec<&'a str>,
}

#[derive(Deserialize)]
struct GetResponse {
    ids: Vec<String>,
    #[serde(default)]
    documents: Option<Vec<Option<String>>>,
    #[serde(default)]
    metadatas: Option<Vec<Option<Metadata>>>,
}

impl GetResponse {
    fn into_chunks(self) -> Vec<StoredChunk> {
        let documents = self.documents.unwrap_or_default();
        let metadatas = self.metadatas.unwrap_or_default();
        self.ids
            .into_iter()
            .enumerate()
            .map(|(position, id)| StoredChunk {
                id,
                text: documents.get(position).and_then(|d| d.clone()).unwrap_or_default(),
                metadata: metadatas.get(position).and_then(|m| m.clone()).unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Serialize)]
struct QueryPayload<'a> {
    query_embeddings: Vec<&'a [f32]>,
    n_results: usize,
    include: Vec<&'a str>,
}

/// Query results come back as parallel arrays nested per query embedding;
/// this backend always sends exactly one.
#[derive(Deserialize)]
struct QueryResponse {
    ids: Vec<Vec<String>>,
    #[serde(default)]
    documents: Option<Vec<Vec<Option<String>>>>,
    #[serde(default)]
    metadatas: Option<Vec<Vec<Option<Metadata>>>>,
    #[serde(default)]
    distances: Option<Vec<Vec<f32>>>,
}

impl QueryResponse {
    fn into_hits(self) -> Vec<QueryHit> {
        let ids = self.ids.into_iter().next().unwrap_or_default();
        let documents =
            self.documents.unwrap_or_default().into_iter().next().unwrap_or_default();
        let metadatas =
            self.metadatas.unwrap_or_default().into_iter().next().unwrap_or_default();
        let distances =
            self.distances.unwrap_or_default().into_iter().next().unwrap_or_default();

        ids.into_iter()
            .enumerate()
            .map(|(position, id)| QueryHit {
                id,
                text: documents.get(position).and_then(|d| d.clone()).unwrap_or_default(),
                score: distances.get(position).copied().unwrap_or(f32::MAX),
                metadata: metadatas.get(position).and_then(|m| m.clone()).unwrap_or_default(),
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct ChromaErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    detail: Option<String>,
}

fn error_detail(body: &str) -> String {
    serde_json::from_str::<ChromaErrorBody>(body)
        .ok()
        .and_then(|e| e.error.or(e.detail))
        .unwrap_or_else(|| body.to_string())
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(ChromaBackend::unavailable(format!("server returned {status}: {}", error_detail(&body))))
}

// ── VectorBackend implementation ───────────────────────────────────

#[async_trait]
impl VectorBackend for ChromaBackend {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        self.collection_id(name).await.map(|_| ())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        if records.is_empty() {
            return Ok(());
        }

        let id = self.collection_id(collection).await?;
        let payload = UpsertPayload {
            ids: records.iter().map(|r| r.id.as_str()).collect(),
            embeddings: records.iter().map(|r| r.embedding.as_slice()).collect(),
            documents: records.iter().map(|r| r.text.as_str()).collect(),
            metadatas: records.iter().map(|r| &r.metadata).collect(),
        };
        self.post_json(&self.collection_url(&id, "upsert"), &payload).await?;

        debug!(collection, count = records.len(), "upserted records to chroma");
        Ok(())
    }

    async fn delete_matching(&self, collection: &str, key: &str, value: &MetaValue) -> Result<()> {
        let id = self.collection_id(collection).await?;
        let payload = DeletePayload { filter: HashMap::from([(key, value)]) };
        self.post_json(&self.collection_url(&id, "delete"), &payload).await?;

        debug!(collection, key, "deleted matching records from chroma");
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<QueryHit>> {
        let id = self.collection_id(collection).await?;
        let payload = QueryPayload {
            query_embeddings: vec![embedding],
            n_results,
            include: vec!["documents", "metadatas", "distances"],
        };
        let response = self.post_json(&self.collection_url(&id, "query"), &payload).await?;
        let parsed: QueryResponse = response
            .json()
            .await
            .map_err(|e| Self::unavailable(format!("malformed query response: {e}")))?;
        Ok(parsed.into_hits())
    }

    async fn keyword_query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
    ) -> Result<Vec<StoredChunk>> {
        let payload = GetPayload {
            ids: None,
            where_document: Some(json!({"$contains": text})),
            limit: Some(n_results),
            include: vec!["documents", "metadatas"],
        };
        self.fetch(collection, &payload).await
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredChunk>> {
        let payload = GetPayload {
            ids: Some(vec![id]),
            where_document: None,
            limit: None,
            include: vec!["documents", "metadatas"],
        };
        Ok(self.fetch(collection, &payload).await?.into_iter().next())
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredChunk>> {
        let payload = GetPayload {
            ids: None,
            where_document: None,
            limit: None,
            include: vec!["documents", "metadatas"],
        };
        self.fetch(collection, &payload).await
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let id = self.collection_id(collection).await?;
        let response = self
            .client
            .get(self.collection_url(&id, "count"))
            .send()
            .await
            .map_err(|e| Self::unavailable(format!("count request failed: {e}")))?;
        let response = ensure_success(response).await?;
        response.json().await.map_err(|e| Self::unavailable(format!("malformed count: {e}")))
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let response = self
            .client
            .get(self.collections_url())
            .send()
            .await
            .map_err(|e| Self::unavailable(format!("list request failed: {e}")))?;
        let response = ensure_success(response).await?;
        let infos: Vec<CollectionInfo> = response
            .json()
            .await
            .map_err(|e| Self::unavailable(format!("malformed list response: {e}")))?;

        let mut cache = self.ids.write().await;
        for info in &infos {
            cache.insert(info.name.clone(), info.id.clone());
        }
        Ok(infos.into_iter().map(|info| info.name).collect())
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let response = self
            .client
            .delete(format!("{}/{name}", self.collections_url()))
            .send()
            .await
            .map_err(|e| Self::unavailable(format!("delete request failed: {e}")))?;

        self.ids.write().await.remove(name);

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(RagError::NotFound { what: format!("collection '{name}'") });
        }
        ensure_success(response).await?;
        debug!(collection = name, "deleted chroma collection");
        Ok(())
    }
}
