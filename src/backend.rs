//! Vector store backend trait.

use async_trait::async_trait;

use crate::document::{MetaValue, QueryHit, StoredChunk, VectorRecord};
use crate::error::Result;

/// A storage backend for embedded text records, organized in named
/// collections.
///
/// The surface is collection-oriented: every data operation names the
/// collection it touches, and collections come into being lazily through
/// [`ensure_collection`](VectorBackend::ensure_collection). Backends report
/// unreachability as [`RagError::IndexUnavailable`](crate::RagError::IndexUnavailable)
/// so the retriever can degrade to keyword-only search.
///
/// # Example
///
/// ```rust,ignore
/// use ragcore::{InMemoryBackend, VectorBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.ensure_collection("docs").await?;
/// backend.upsert("docs", &records).await?;
/// let hits = backend.query("docs", &query_embedding, 50).await?;
/// ```
#[async_trait]
pub trait VectorBackend: Send + Sync {
    /// Create a collection if it does not already exist. Idempotent.
    async fn ensure_collection(&self, name: &str) -> Result<()>;

    /// Write records into a collection, overwriting any with the same id.
    ///
    /// One call is one batch; implementations apply it as a single write.
    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()>;

    /// Delete every record whose metadata field `key` equals `value`.
    ///
    /// Deleting with no matches is a successful no-op.
    async fn delete_matching(&self, collection: &str, key: &str, value: &MetaValue) -> Result<()>;

    /// The `n_results` nearest records to `embedding`, ascending by distance.
    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<QueryHit>>;

    /// The backend's native lexical search over record text.
    ///
    /// Backends without one should return an error; the keyword fallback
    /// then scans [`get_all`](VectorBackend::get_all) instead.
    async fn keyword_query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
    ) -> Result<Vec<StoredChunk>>;

    /// Read back a single record by id, without its embedding.
    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredChunk>>;

    /// Read back every record in a collection, without embeddings.
    async fn get_all(&self, collection: &str) -> Result<Vec<StoredChunk>>;

    /// Number of records in a collection.
    async fn count(&self, collection: &str) -> Result<usize>;

    /// Names of all collections.
    async fn list_collections(&self) -> Result<Vec<String>>;

    /// Delete a collection and all its records.
    async fn delete_collection(&self, name: &str) -> Result<()>;
}
