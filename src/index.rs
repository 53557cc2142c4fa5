//! The vector index: embeds chunk text and drives one backend collection.
//!
//! [`VectorIndex`] owns a named collection on an injected
//! [`VectorBackend`] and pairs it with an [`EmbeddingProvider`]. It assigns
//! record ids, stamps reserved metadata, groups query results per document,
//! and serializes mutations per `doc_id`.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::backend::VectorBackend;
use crate::document::{Chunk, DocMatches, MetaValue, Metadata, QueryHit, VectorRecord};
use crate::embedding::{EmbeddingProvider, TaskType};
use crate::error::{RagError, Result};

/// Per-document async locks.
///
/// One entry per distinct `doc_id`, kept for the life of the index. Holding
/// a document's lock makes that document's mutations run one at a time.
#[derive(Default)]
struct DocLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl DocLocks {
    async fn acquire(&self, doc_id: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            Arc::clone(map.entry(doc_id.to_string()).or_default())
        };
        lock.lock_owned().await
    }
}

/// What a batched [`VectorIndex::add`] actually wrote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddOutcome {
    /// Chunks embedded and written.
    pub indexed: usize,
    /// Chunks dropped (empty text or failed embedding) under lenient mode.
    pub skipped: usize,
}

/// An embedding-backed index over one named collection.
///
/// Construct with [`VectorIndex::new`]; the collection itself is created
/// lazily on first use. The index holds no global state and is cheap to
/// share behind an `Arc`.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use ragcore::{InMemoryBackend, VectorIndex};
///
/// let index = VectorIndex::new(Arc::new(InMemoryBackend::new()), embedder, "documents");
/// index.add(&chunks, "doc-1", &Metadata::default()).await?;
/// let groups = index.query("retention rules", 5, 10).await?;
/// ```
pub struct VectorIndex {
    backend: Arc<dyn VectorBackend>,
    embedder: Arc<dyn EmbeddingProvider>,
    collection: String,
    strict: bool,
    locks: DocLocks,
}

impl VectorIndex {
    /// Create an index over `collection`, lenient toward bad chunks.
    pub fn new(
        backend: Arc<dyn VectorBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
        collection: impl Into<String>,
    ) -> Self {
        Self { backend, embedder, collection: collection.into(), strict: false, locks: DocLocks::default() }
    }

    /// Abort batch adds on the first bad chunk instead of skipping it.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// The collection this index reads and writes.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// The backend handle.
    pub fn backend(&self) -> &Arc<dyn VectorBackend> {
        &self.backend
    }

    /// Embed and write a document's chunks as one batch.
    ///
    /// Record ids are `{doc_id}_chunk_{index}`, making re-ingestion of the
    /// same document an overwrite. Each record's metadata merges
    /// `base_metadata` with the chunk's own (chunk wins), then `doc_id` and
    /// `chunk_index` are stamped on top. Chunks with empty text or a failed
    /// embedding are skipped and counted, unless the index is
    /// [`strict`](VectorIndex::strict), in which case the first bad chunk
    /// aborts the whole batch. Surviving records reach the backend in a
    /// single write.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for an empty `doc_id` or chunk list,
    /// the underlying failure in strict mode, and whatever the backend write
    /// surfaces.
    pub async fn add(
        &self,
        chunks: &[Chunk],
        doc_id: &str,
        base_metadata: &Metadata,
    ) -> Result<AddOutcome> {
        if doc_id.trim().is_empty() {
            return Err(RagError::EmptyInput("doc_id must not be empty".to_string()));
        }
        if chunks.is_empty() {
            return Err(RagError::EmptyInput(format!("no chunks to add for document '{doc_id}'")));
        }

        let _guard = self.locks.acquire(doc_id).await;
        self.backend.ensure_collection(&self.collection).await?;

        let mut records = Vec::with_capacity(chunks.len());
        let mut skipped = 0usize;

        for (index, chunk) in chunks.iter().enumerate() {
            if chunk.text.trim().is_empty() {
                if self.strict {
                    return Err(RagError::EmptyInput(format!(
                        "chunk {index} of document '{doc_id}' is empty"
                    )));
                }
                warn!(doc_id, chunk_index = index, "skipping empty chunk");
                skipped += 1;
                continue;
            }

            let embedding =
                match self.embedder.embed(&chunk.text, TaskType::RetrievalDocument).await {
                    Ok(embedding) if !embedding.is_empty() => embedding,
                    Ok(_) => {
                        let err = RagError::Embedding {
                            provider: "embedding".to_string(),
                            message: format!("empty embedding for chunk {index}"),
                        };
                        if self.strict {
                            return Err(err);
                        }
                        warn!(doc_id, chunk_index = index, error = %err, "skipping chunk");
                        skipped += 1;
                        continue;
                    }
                    Err(e) => {
                        if self.strict {
                            error!(doc_id, chunk_index = index, error = %e, "embedding failed");
                            return Err(e);
                        }
                        warn!(doc_id, chunk_index = index, error = %e, "skipping chunk");
                        skipped += 1;
                        continue;
                    }
                };

            let mut metadata = Metadata::merged(base_metadata, &chunk.metadata);
            metadata.doc_id = Some(doc_id.to_string());
            metadata.chunk_index = Some(index);

            records.push(VectorRecord {
                id: format!("{doc_id}_chunk_{index}"),
                embedding,
                text: chunk.text.clone(),
                metadata,
            });
        }

        if !records.is_empty() {
            self.backend.upsert(&self.collection, &records).await.map_err(|e| {
                error!(doc_id, error = %e, "batch write failed");
                e
            })?;
        }

        info!(doc_id, indexed = records.len(), skipped, "added document chunks");
        Ok(AddOutcome { indexed: records.len(), skipped })
    }

    /// Embed and write one chunk under a fresh position-independent id.
    ///
    /// The id is `{doc_id}_{uuid}`, so repeated calls append rather than
    /// overwrite. Returns the assigned id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for empty text or `doc_id`, and any
    /// embedding or backend failure.
    pub async fn upsert_single(
        &self,
        text: &str,
        doc_id: &str,
        metadata: Metadata,
    ) -> Result<String> {
        if doc_id.trim().is_empty() {
            return Err(RagError::EmptyInput("doc_id must not be empty".to_string()));
        }
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput(format!(
                "no text to upsert for document '{doc_id}'"
            )));
        }

        let _guard = self.locks.acquire(doc_id).await;
        self.backend.ensure_collection(&self.collection).await?;

        let embedding = self.embedder.embed(text, TaskType::RetrievalDocument).await?;
        let mut metadata = metadata;
        metadata.doc_id = Some(doc_id.to_string());

        let id = format!("{doc_id}_{}", Uuid::new_v4().simple());
        let record =
            VectorRecord { id: id.clone(), embedding, text: text.to_string(), metadata };
        self.backend.upsert(&self.collection, &[record]).await?;

        debug!(doc_id, id = %id, "upserted single chunk");
        Ok(id)
    }

    /// Delete every chunk belonging to `doc_id`. Idempotent.
    pub async fn delete_by_doc(&self, doc_id: &str) -> Result<()> {
        let _guard = self.locks.acquire(doc_id).await;
        self.backend.ensure_collection(&self.collection).await?;
        self.backend
            .delete_matching(&self.collection, "doc_id", &MetaValue::Str(doc_id.to_string()))
            .await?;
        info!(doc_id, "deleted document chunks");
        Ok(())
    }

    /// Embed `text` as a query and return hits grouped per document.
    ///
    /// Fetches `top_k * fetch_multiplier` raw neighbors so that grouping by
    /// document still fills every group, then caps each group at `top_k`
    /// hits, ascending by distance. Groups appear in the order their
    /// document first shows up in the raw neighbor list.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for an empty query and
    /// [`RagError::Config`] for a zero `top_k`; embedding and backend
    /// failures propagate.
    pub async fn query(
        &self,
        text: &str,
        top_k: usize,
        fetch_multiplier: usize,
    ) -> Result<Vec<DocMatches>> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput("empty query text".to_string()));
        }
        if top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }

        self.backend.ensure_collection(&self.collection).await?;
        let embedding = self.embedder.embed(text, TaskType::RetrievalQuery).await?;
        let raw = self
            .backend
            .query(&self.collection, &embedding, top_k.saturating_mul(fetch_multiplier.max(1)))
            .await?;

        let groups = group_hits(raw, top_k);
        debug!(group_count = groups.len(), "grouped query completed");
        Ok(groups)
    }

    /// Re-embed one record in place, keeping its stored metadata.
    ///
    /// The write is a single-record overwrite under the existing id.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] when no record has this id; an absent
    /// record is never created implicitly.
    pub async fn update_embedding(&self, id: &str, new_text: &str) -> Result<()> {
        if new_text.trim().is_empty() {
            return Err(RagError::EmptyInput(format!("no text to re-embed for record '{id}'")));
        }

        self.backend.ensure_collection(&self.collection).await?;
        let existing = self
            .backend
            .get(&self.collection, id)
            .await?
            .ok_or_else(|| RagError::NotFound { what: format!("record '{id}'") })?;

        let embedding = self.embedder.embed(new_text, TaskType::RetrievalDocument).await?;
        let record = VectorRecord {
            id: id.to_string(),
            embedding,
            text: new_text.to_string(),
            metadata: existing.metadata,
        };
        self.backend.upsert(&self.collection, &[record]).await?;

        info!(id = %id, "updated chunk embedding");
        Ok(())
    }

    /// Number of records in this index's collection.
    pub async fn count(&self) -> Result<usize> {
        self.backend.ensure_collection(&self.collection).await?;
        self.backend.count(&self.collection).await
    }

    /// Names of every collection on the backend.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.backend.list_collections().await
    }

    /// Delete a collection by name, this index's own included.
    pub async fn delete_collection(&self, name: &str) -> Result<()> {
        self.backend.delete_collection(name).await.map_err(|e| {
            error!(collection = name, error = %e, "failed to delete collection");
            e
        })
    }
}

/// Group raw neighbors by document in first-seen order, each group sorted
/// ascending by distance and capped at `top_k`.
fn group_hits(raw: Vec<QueryHit>, top_k: usize) -> Vec<DocMatches> {
    let mut groups: Vec<DocMatches> = Vec::new();
    let mut index_of: HashMap<String, usize> = HashMap::new();

    for hit in raw {
        let doc_id = hit.metadata.doc_id_or_unknown().to_string();
        let at = *index_of.entry(doc_id.clone()).or_insert_with(|| {
            groups.push(DocMatches { doc_id, hits: Vec::new() });
            groups.len() - 1
        });
        groups[at].hits.push(hit);
    }

    for group in &mut groups {
        group
            .hits
            .sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        group.hits.truncate(top_k);
    }

    groups
}
