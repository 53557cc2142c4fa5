//! Keyword fallback search.
//!
//! Lexical retrieval that complements vector search: exact-term recall for
//! identifiers, statute numbers, and rare names that embeddings blur. By
//! construction this path never fails; it degrades and returns what it can.

use std::sync::Arc;

use tracing::warn;

use crate::backend::VectorBackend;
use crate::document::StoredChunk;

/// Lexical search over one collection, degrading instead of failing.
///
/// Tries the backend's native keyword path first. If that errors, falls back
/// to a brute-force case-insensitive substring scan of every record. If even
/// the scan is impossible, returns no hits. Errors are logged, never
/// returned.
pub struct KeywordFallback {
    backend: Arc<dyn VectorBackend>,
    collection: String,
}

impl KeywordFallback {
    /// Create a fallback searcher over `collection`.
    pub fn new(backend: Arc<dyn VectorBackend>, collection: impl Into<String>) -> Self {
        Self { backend, collection: collection.into() }
    }

    /// Up to `limit` records whose text matches `query`.
    ///
    /// An empty or whitespace-only query matches nothing.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<StoredChunk> {
        let query = query.trim();
        if query.is_empty() || limit == 0 {
            return Vec::new();
        }

        match self.backend.keyword_query(&self.collection, query, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "native keyword query failed, scanning");
                self.scan(query, limit).await
            }
        }
    }

    /// Brute-force substring scan, the last line of defense.
    async fn scan(&self, query: &str, limit: usize) -> Vec<StoredChunk> {
        let all = match self.backend.get_all(&self.collection).await {
            Ok(all) => all,
            Err(e) => {
                warn!(collection = %self.collection, error = %e, "keyword scan failed");
                return Vec::new();
            }
        };

        let needle = query.to_lowercase();
        all.into_iter()
            .filter(|chunk| chunk.text.to_lowercase().contains(&needle))
            .take(limit)
            .collect()
    }
}
