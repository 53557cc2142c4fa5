//! In-memory vector backend using cosine distance.
//!
//! This module provides [`InMemoryBackend`], a zero-dependency backend
//! backed by a `HashMap` protected by a `tokio::sync::RwLock`. It is
//! suitable for development, testing, and small corpora.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::backend::VectorBackend;
use crate::document::{MetaValue, QueryHit, StoredChunk, VectorRecord};
use crate::error::{RagError, Result};

/// An in-memory backend scoring by cosine distance.
///
/// Collections are stored as nested `HashMap`s: collection name → record id
/// → record. All operations are async-safe via `tokio::sync::RwLock`. The
/// native keyword path ranks records by how many query terms their text
/// contains, case-insensitively.
///
/// # Example
///
/// ```rust,ignore
/// use ragcore::{InMemoryBackend, VectorBackend};
///
/// let backend = InMemoryBackend::new();
/// backend.ensure_collection("docs").await?;
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    collections: RwLock<HashMap<String, HashMap<String, VectorRecord>>>,
}

impl InMemoryBackend {
    /// Create a new empty in-memory backend.
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(collection: &str) -> RagError {
    RagError::NotFound { what: format!("collection '{collection}'") }
}

/// Cosine distance between two vectors: `1 − cos(a, b)`.
///
/// Lower is closer. Vectors of zero magnitude are treated as maximally
/// distant.
fn cosine_distance(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    1.0 - dot / (norm_a * norm_b)
}

#[async_trait]
impl VectorBackend for InMemoryBackend {
    async fn ensure_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.entry(name.to_string()).or_default();
        Ok(())
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        for record in records {
            store.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn delete_matching(
        &self,
        collection: &str,
        key: &str,
        value: &MetaValue,
    ) -> Result<()> {
        let mut collections = self.collections.write().await;
        let store = collections.get_mut(collection).ok_or_else(|| missing(collection))?;
        store.retain(|_, record| record.metadata.get(key).as_ref() != Some(value));
        Ok(())
    }

    async fn query(
        &self,
        collection: &str,
        embedding: &[f32],
        n_results: usize,
    ) -> Result<Vec<QueryHit>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let mut hits: Vec<QueryHit> = store
            .values()
            .map(|record| QueryHit {
                id: record.id.clone(),
                text: record.text.clone(),
                score: cosine_distance(&record.embedding, embedding),
                metadata: record.metadata.clone(),
            })
            .collect();

        hits.sort_by(|a, b| a.score.partial_cmp(&b.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(n_results);
        Ok(hits)
    }

    async fn keyword_query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
    ) -> Result<Vec<StoredChunk>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;

        let terms: Vec<String> =
            text.split_whitespace().map(|t| t.to_lowercase()).collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let mut scored: Vec<(usize, StoredChunk)> = store
            .values()
            .filter_map(|record| {
                let haystack = record.text.to_lowercase();
                let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
                (matched > 0).then(|| {
                    (
                        matched,
                        StoredChunk {
                            id: record.id.clone(),
                            text: record.text.clone(),
                            metadata: record.metadata.clone(),
                        },
                    )
                })
            })
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0));
        Ok(scored.into_iter().take(n_results).map(|(_, chunk)| chunk).collect())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<StoredChunk>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.get(id).map(|record| StoredChunk {
            id: record.id.clone(),
            text: record.text.clone(),
            metadata: record.metadata.clone(),
        }))
    }

    async fn get_all(&self, collection: &str) -> Result<Vec<StoredChunk>> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store
            .values()
            .map(|record| StoredChunk {
                id: record.id.clone(),
                text: record.text.clone(),
                metadata: record.metadata.clone(),
            })
            .collect())
    }

    async fn count(&self, collection: &str) -> Result<usize> {
        let collections = self.collections.read().await;
        let store = collections.get(collection).ok_or_else(|| missing(collection))?;
        Ok(store.len())
    }

    async fn list_collections(&self) -> Result<Vec<String>> {
        let collections = self.collections.read().await;
        let mut names: Vec<String> = collections.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    async fn delete_collection(&self, name: &str) -> Result<()> {
        let mut collections = self.collections.write().await;
        collections.remove(name);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Metadata;

    fn record(id: &str, embedding: Vec<f32>, text: &str, doc_id: &str) -> VectorRecord {
        VectorRecord {
            id: id.to_string(),
            embedding,
            text: text.to_string(),
            metadata: Metadata::for_doc(doc_id),
        }
    }

    async fn seeded() -> InMemoryBackend {
        let backend = InMemoryBackend::new();
        backend.ensure_collection("docs").await.unwrap();
        backend
            .upsert(
                "docs",
                &[
                    record("a", vec![1.0, 0.0], "data retention rules", "d1"),
                    record("b", vec![0.0, 1.0], "consent withdrawal process", "d2"),
                    record("c", vec![0.7, 0.7], "retention and consent overlap", "d1"),
                ],
            )
            .await
            .unwrap();
        backend
    }

    #[tokio::test]
    async fn query_orders_by_ascending_distance() {
        let backend = seeded().await;
        let hits = backend.query("docs", &[1.0, 0.0], 3).await.unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "a");
        assert!(hits[0].score < hits[1].score);
        assert!(hits[1].score <= hits[2].score);
        assert!(hits[0].score.abs() < 1e-6, "identical direction has distance 0");
    }

    #[tokio::test]
    async fn keyword_query_ranks_by_matched_terms() {
        let backend = seeded().await;
        let hits = backend.keyword_query("docs", "retention consent", 10).await.unwrap();

        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].id, "c", "record containing both terms ranks first");
    }

    #[tokio::test]
    async fn keyword_query_is_case_insensitive() {
        let backend = seeded().await;
        let hits = backend.keyword_query("docs", "RETENTION", 10).await.unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[tokio::test]
    async fn delete_matching_removes_only_matches() {
        let backend = seeded().await;
        backend.delete_matching("docs", "doc_id", &MetaValue::Str("d1".into())).await.unwrap();

        assert_eq!(backend.count("docs").await.unwrap(), 1);
        assert!(backend.get("docs", "b").await.unwrap().is_some());

        // Deleting again matches nothing and still succeeds.
        backend.delete_matching("docs", "doc_id", &MetaValue::Str("d1".into())).await.unwrap();
        assert_eq!(backend.count("docs").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn upsert_overwrites_by_id() {
        let backend = seeded().await;
        backend
            .upsert("docs", &[record("a", vec![0.0, 1.0], "rewritten text", "d1")])
            .await
            .unwrap();

        assert_eq!(backend.count("docs").await.unwrap(), 3);
        let got = backend.get("docs", "a").await.unwrap().unwrap();
        assert_eq!(got.text, "rewritten text");
    }

    #[tokio::test]
    async fn zero_vector_is_maximally_distant() {
        assert_eq!(cosine_distance(&[0.0, 0.0], &[1.0, 0.0]), 1.0);
    }

    #[tokio::test]
    async fn missing_collection_is_not_found() {
        let backend = InMemoryBackend::new();
        let err = backend.count("nope").await.unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_collections_is_sorted() {
        let backend = InMemoryBackend::new();
        backend.ensure_collection("b").await.unwrap();
        backend.ensure_collection("a").await.unwrap();
        assert_eq!(backend.list_collections().await.unwrap(), vec!["a", "b"]);
    }
}
