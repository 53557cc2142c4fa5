//! Hybrid retrieval: grouped vector search plus keyword fallback.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{info, warn};

use crate::document::Chunk;
use crate::error::{RagError, Result};
use crate::index::VectorIndex;
use crate::keyword::KeywordFallback;

/// Retrieves context chunks by combining two passes over one collection.
///
/// The vector pass returns per-document groups; their hits are flattened in
/// group order, without cross-document re-ranking, favoring recall breadth
/// over a single global ranking. The keyword pass then appends lexical
/// matches, fetched at `top_k * keyword_multiplier`. A record surfaced by
/// both passes is kept once, at its vector position.
///
/// When the vector pass fails (index unreachable, query embedding failed)
/// retrieval degrades to keyword-only results instead of erroring. Invalid
/// input still errors.
pub struct HybridRetriever {
    index: Arc<VectorIndex>,
    keyword: KeywordFallback,
    fetch_multiplier: usize,
    keyword_multiplier: usize,
}

impl HybridRetriever {
    /// Create a retriever with the default fetch multipliers (10 and 5).
    pub fn new(index: Arc<VectorIndex>, keyword: KeywordFallback) -> Self {
        Self { index, keyword, fetch_multiplier: 10, keyword_multiplier: 5 }
    }

    /// Override the raw-fetch and keyword multipliers.
    pub fn with_multipliers(mut self, fetch: usize, keyword: usize) -> Self {
        self.fetch_multiplier = fetch;
        self.keyword_multiplier = keyword;
        self
    }

    /// The index this retriever queries.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Retrieve context for `query`, at most `top_k` vector hits per document.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for an empty query and
    /// [`RagError::Config`] for a zero `top_k`. Backend and embedding
    /// failures do not error; they degrade to keyword-only results.
    pub async fn retrieve(&self, query: &str, top_k: usize) -> Result<Vec<Chunk>> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RagError::EmptyInput("empty query text".to_string()));
        }

        let vector_groups = match self.index.query(query, top_k, self.fetch_multiplier).await {
            Ok(groups) => groups,
            Err(e @ (RagError::EmptyInput(_) | RagError::Config(_))) => return Err(e),
            Err(e) => {
                warn!(error = %e, "vector search failed, continuing keyword-only");
                Vec::new()
            }
        };

        let mut seen: HashSet<String> = HashSet::new();
        let mut chunks: Vec<Chunk> = Vec::new();

        for group in vector_groups {
            for hit in group.hits {
                if seen.insert(hit.id.clone()) {
                    chunks.push(hit.into_chunk());
                }
            }
        }

        let keyword_hits =
            self.keyword.search(query, top_k.saturating_mul(self.keyword_multiplier)).await;
        for hit in keyword_hits {
            if seen.insert(hit.id.clone()) {
                chunks.push(hit.into_chunk());
            }
        }

        info!(result_count = chunks.len(), "hybrid retrieval completed");
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::VectorBackend;
    use crate::document::{Metadata, VectorRecord};
    use crate::embedding::{EmbeddingProvider, TaskType};
    use crate::memory::InMemoryBackend;
    use async_trait::async_trait;

    /// Embeds by counting occurrences of a fixed vocabulary, one axis per
    /// term plus a shared bias axis. Texts sharing vocabulary terms with the
    /// query rank closer, deterministically.
    struct TermEmbedder {
        vocab: Vec<&'static str>,
    }

    #[async_trait]
    impl EmbeddingProvider for TermEmbedder {
        async fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>> {
            let lowered = text.to_lowercase();
            let mut v: Vec<f32> = self
                .vocab
                .iter()
                .map(|term| lowered.matches(term).count() as f32)
                .collect();
            v.push(1.0);
            Ok(v)
        }

        fn dimensions(&self) -> usize {
            self.vocab.len() + 1
        }
    }

    /// Fails query-task embeddings, works for documents.
    struct QueryBrokenEmbedder {
        inner: TermEmbedder,
    }

    #[async_trait]
    impl EmbeddingProvider for QueryBrokenEmbedder {
        async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
            if task == TaskType::RetrievalQuery {
                return Err(RagError::Embedding {
                    provider: "mock".to_string(),
                    message: "query embeddings disabled".to_string(),
                });
            }
            self.inner.embed(text, task).await
        }

        fn dimensions(&self) -> usize {
            self.inner.dimensions()
        }
    }

    async fn seeded_backend() -> Arc<InMemoryBackend> {
        let backend = Arc::new(InMemoryBackend::new());
        backend.ensure_collection("docs").await.unwrap();
        let embedder = TermEmbedder { vocab: vec!["consent", "breach"] };
        let mut records = Vec::new();
        for (id, doc, text) in [
            ("d1_chunk_0", "d1", "consent must be freely given"),
            ("d1_chunk_1", "d1", "filler text about nothing relevant"),
            ("d2_chunk_0", "d2", "breach notification within a deadline"),
        ] {
            records.push(VectorRecord {
                id: id.to_string(),
                embedding: embedder.embed(text, TaskType::RetrievalDocument).await.unwrap(),
                text: text.to_string(),
                metadata: Metadata::for_doc(doc),
            });
        }
        backend.upsert("docs", &records).await.unwrap();
        backend
    }

    fn retriever(
        backend: Arc<InMemoryBackend>,
        embedder: Arc<dyn EmbeddingProvider>,
    ) -> HybridRetriever {
        let index = Arc::new(VectorIndex::new(backend.clone(), embedder, "docs"));
        let keyword = KeywordFallback::new(backend, "docs");
        HybridRetriever::new(index, keyword)
    }

    #[tokio::test]
    async fn vector_and_keyword_hits_are_deduplicated() {
        let backend = seeded_backend().await;
        let embedder = Arc::new(TermEmbedder { vocab: vec!["consent", "breach"] });
        let retriever = retriever(backend, embedder);

        let chunks = retriever.retrieve("consent", 5).await.unwrap();
        let consent_hits =
            chunks.iter().filter(|c| c.text.contains("freely given")).count();
        assert_eq!(consent_hits, 1, "record found by both passes appears once");
    }

    #[tokio::test]
    async fn degrades_to_keyword_only_when_query_embedding_fails() {
        let backend = seeded_backend().await;
        let embedder = Arc::new(QueryBrokenEmbedder {
            inner: TermEmbedder { vocab: vec!["consent", "breach"] },
        });
        let retriever = retriever(backend, embedder);

        let chunks = retriever.retrieve("breach", 5).await.unwrap();
        assert_eq!(chunks.len(), 1, "keyword pass still finds the lexical match");
        assert!(chunks[0].text.contains("breach notification"));
    }

    #[tokio::test]
    async fn empty_query_errors_instead_of_degrading() {
        let backend = seeded_backend().await;
        let embedder = Arc::new(TermEmbedder { vocab: vec!["consent", "breach"] });
        let retriever = retriever(backend, embedder);

        assert!(matches!(
            retriever.retrieve("   ", 5).await,
            Err(RagError::EmptyInput(_))
        ));
    }

    #[tokio::test]
    async fn keyword_pass_contributes_lexical_matches() {
        let backend = seeded_backend().await;
        let embedder = Arc::new(TermEmbedder { vocab: vec!["consent", "breach"] });
        let retriever = retriever(backend, embedder);

        // "deadline" maps to the bias axis only, so vector search cannot
        // single out d2; the literal substring match still surfaces it.
        let chunks = retriever.retrieve("deadline", 5).await.unwrap();
        assert!(chunks.iter().any(|c| c.text.contains("deadline")));
    }
}
