//! End-to-end tests for the engine over the in-memory backend.
//!
//! A deterministic vocabulary-keyed embedder stands in for the real
//! embedding service: each vocabulary term is an axis carrying its
//! occurrence count, plus a constant bias axis, L2-normalized. Texts
//! mentioning a query's terms land measurably closer to the query vector
//! than texts that do not.

use std::sync::Arc;

use async_trait::async_trait;

use ragcore::{
    AskOptions, ChunkStrategy, EmbeddingProvider, EngineConfig, GenerationProvider,
    InMemoryBackend, IngestOptions, IngestStatus, MetaValue, Metadata, QueryHit, RagEngine,
    RagError, StoredChunk, TaskType, VectorBackend, VectorRecord,
};

/// Deterministic embedder keyed on a fixed vocabulary.
///
/// Refuses texts containing the marker word `unembeddable`, standing in for
/// a chunk the real service cannot handle.
struct VocabEmbedder {
    vocab: Vec<&'static str>,
}

impl VocabEmbedder {
    fn new(vocab: &[&'static str]) -> Self {
        Self { vocab: vocab.to_vec() }
    }
}

#[async_trait]
impl EmbeddingProvider for VocabEmbedder {
    async fn embed(&self, text: &str, _task: TaskType) -> ragcore::Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(RagError::Embedding {
                provider: "mock".to_string(),
                message: "empty input".to_string(),
            });
        }
        if text.contains("unembeddable") {
            return Err(RagError::Embedding {
                provider: "mock".to_string(),
                message: "refused by model".to_string(),
            });
        }

        let lower = text.to_lowercase();
        let mut v: Vec<f32> =
            self.vocab.iter().map(|term| lower.matches(term).count() as f32).collect();
        v.push(1.0);
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        Ok(v.into_iter().map(|x| x / norm).collect())
    }

    fn dimensions(&self) -> usize {
        self.vocab.len() + 1
    }
}

struct CannedGenerator;

#[async_trait]
impl GenerationProvider for CannedGenerator {
    async fn generate(&self, _prompt: &str) -> ragcore::Result<String> {
        Ok("Here is the answer.".to_string())
    }
}

fn engine(vocab: &[&'static str]) -> RagEngine {
    RagEngine::builder()
        .backend(Arc::new(InMemoryBackend::new()))
        .embedder(Arc::new(VocabEmbedder::new(vocab)))
        .generator(Arc::new(CannedGenerator))
        .build()
        .unwrap()
}

/// 1200 words at window size 500 / overlap 100 make exactly three chunks,
/// and consecutive chunks share exactly the 100 overlapping words.
#[tokio::test]
async fn fixed_windows_share_exact_overlap() {
    let words: Vec<String> = (0..1200).map(|i| format!("w{i}")).collect();
    let text = words.join(" ");

    let engine = engine(&["w5"]);
    let report = engine
        .ingest(
            "D1",
            &text,
            Metadata::default(),
            IngestOptions {
                strategy: ChunkStrategy::FixedSize { chunk_size: 500, chunk_overlap: 100 },
                ..Default::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(report.status, IngestStatus::Success);
    assert_eq!(report.chunks_indexed, 3);

    let mut stored = engine.index().backend().get_all("documents").await.unwrap();
    stored.sort_by_key(|chunk| chunk.metadata.chunk_index);
    assert_eq!(stored.len(), 3);

    for chunk in &stored {
        assert!(chunk.text.split_whitespace().count() <= 500);
    }
    for pair in stored.windows(2) {
        let left: Vec<&str> = pair[0].text.split_whitespace().collect();
        let right: Vec<&str> = pair[1].text.split_whitespace().collect();
        assert_eq!(&left[left.len() - 100..], &right[..100]);
    }
}

/// A term unique to one chunk of one document comes back as exactly one
/// grouped hit for that document at `top_k = 1`.
#[tokio::test]
async fn query_returns_the_matching_chunk_grouped_by_document() {
    let engine = engine(&["breach", "notification"]);
    let text = "Section 1 general obligations apply to all processing activities. \
                Section 2 breach notification must happen within set deadlines. \
                Section 3 records of processing must be maintained.";
    engine.ingest("D1", text, Metadata::default(), IngestOptions::default()).await.unwrap();

    let groups = engine.index().query("breach notification timing", 1, 10).await.unwrap();

    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0].doc_id, "D1");
    assert_eq!(groups[0].hits.len(), 1);
    assert!(groups[0].hits[0].text.contains("breach notification"));
}

/// After deleting a document, none of its chunks match; deleting again is
/// still fine.
#[tokio::test]
async fn deleted_document_stops_matching() {
    let engine = engine(&["breach"]);
    engine
        .ingest(
            "D1",
            "Section 1 breach notification deadlines. Section 2 record keeping.",
            Metadata::default(),
            IngestOptions::default(),
        )
        .await
        .unwrap();
    engine
        .ingest(
            "D2",
            "Section 1 breach escalation paths for the response team.",
            Metadata::default(),
            IngestOptions::default(),
        )
        .await
        .unwrap();

    engine.delete_document("D1").await.unwrap();

    let groups = engine.index().query("breach", 5, 10).await.unwrap();
    assert!(groups.iter().all(|group| group.doc_id != "D1"));
    assert!(groups.iter().any(|group| group.doc_id == "D2"));

    let chunks = engine.retrieve("breach", None).await.unwrap();
    assert!(chunks.iter().all(|chunk| chunk.metadata.doc_id.as_deref() != Some("D1")));

    // Idempotent: a second delete of the same document succeeds.
    engine.delete_document("D1").await.unwrap();
}

/// No document contributes more than `top_k` hits, however well it matches.
#[tokio::test]
async fn per_doc_cap_holds_across_documents() {
    let engine = engine(&["retention"]);
    for doc in ["D1", "D2", "D3"] {
        let text = (1..=4)
            .map(|i| format!("Section {i} retention schedule item {i} for {doc}."))
            .collect::<Vec<_>>()
            .join(" ");
        engine.ingest(doc, &text, Metadata::default(), IngestOptions::default()).await.unwrap();
    }

    let groups = engine.index().query("retention", 2, 10).await.unwrap();

    assert_eq!(groups.len(), 3);
    for group in &groups {
        assert!(group.hits.len() <= 2, "doc {} exceeded the cap", group.doc_id);
        for pair in group.hits.windows(2) {
            assert!(pair[0].score <= pair[1].score);
        }
    }
}

/// A chunk the embedder refuses is skipped and counted, and the report says
/// so instead of silently under-indexing.
#[tokio::test]
async fn partial_ingest_is_reported() {
    let engine = engine(&["audit"]);
    let text = "Section 1 audit trail requirements for processors. \
                Section 2 unembeddable content the model rejects.";

    let report =
        engine.ingest("D1", text, Metadata::default(), IngestOptions::default()).await.unwrap();

    assert_eq!(report.status, IngestStatus::Partial);
    assert_eq!(report.chunks_indexed, 1);
    assert_eq!(report.chunks_skipped, 1);
    assert_eq!(engine.index().count().await.unwrap(), 1);
}

/// Strict mode turns the same bad chunk into an error and writes nothing.
#[tokio::test]
async fn strict_ingest_aborts_on_bad_chunk() {
    let engine = RagEngine::builder()
        .config(EngineConfig::builder().strict_ingest(true).build().unwrap())
        .backend(Arc::new(InMemoryBackend::new()))
        .embedder(Arc::new(VocabEmbedder::new(&["audit"])))
        .build()
        .unwrap();
    let text = "Section 1 audit trail requirements for processors. \
                Section 2 unembeddable content the model rejects.";

    let err = engine
        .ingest("D1", text, Metadata::default(), IngestOptions::default())
        .await
        .unwrap_err();

    assert!(matches!(err, RagError::Embedding { .. }));
    assert_eq!(engine.index().count().await.unwrap(), 0);
}

/// A chunk found by both the vector and the keyword pass appears once.
#[tokio::test]
async fn hybrid_results_are_deduplicated() {
    let engine = engine(&["pseudonymisation"]);
    engine
        .ingest(
            "D1",
            "Section 1 pseudonymisation techniques and key separation. \
             Section 2 unrelated office supply ordering process.",
            Metadata::default(),
            IngestOptions::default(),
        )
        .await
        .unwrap();

    let chunks = engine.retrieve("pseudonymisation", None).await.unwrap();

    let matching =
        chunks.iter().filter(|chunk| chunk.text.contains("pseudonymisation")).count();
    assert_eq!(matching, 1);
}

/// When the vector path is down, retrieval degrades to keyword results
/// instead of failing.
#[tokio::test]
async fn vector_outage_degrades_to_keyword_results() {
    let backend = Arc::new(BrokenQueryBackend { inner: InMemoryBackend::new() });
    let engine = RagEngine::builder()
        .backend(backend)
        .embedder(Arc::new(VocabEmbedder::new(&["transfer"])))
        .build()
        .unwrap();
    engine
        .ingest(
            "D1",
            "Section 1 cross-border transfer safeguards and contract clauses.",
            Metadata::default(),
            IngestOptions::default(),
        )
        .await
        .unwrap();

    let chunks = engine.retrieve("transfer", None).await.unwrap();

    assert_eq!(chunks.len(), 1);
    assert!(chunks[0].text.contains("transfer"));
}

/// Sources on a composed answer list baseline chunks before user chunks.
#[tokio::test]
async fn ask_orders_baseline_sources_first() {
    let engine = engine(&["retention"]);
    let baseline = Metadata {
        is_default: true,
        source: Some("regulation.pdf".to_string()),
        ..Metadata::default()
    };
    let user = Metadata { user_id: Some("u-17".to_string()), ..Metadata::default() };

    engine
        .ingest(
            "REG",
            "Section 1 retention must not exceed five years.",
            baseline,
            IngestOptions::default(),
        )
        .await
        .unwrap();
    engine
        .ingest(
            "USR",
            "Section 1 our retention policy keeps records for three years.",
            user,
            IngestOptions::default(),
        )
        .await
        .unwrap();

    let answer = engine.ask("what retention applies?", AskOptions::default()).await.unwrap();

    assert_eq!(answer.text, "Here is the answer.");
    assert!(answer.sources.len() >= 2);
    let first_user = answer.sources.iter().position(|m| !m.is_default).unwrap();
    assert!(answer.sources[..first_user].iter().all(|m| m.is_default));
    assert!(answer.sources[first_user..].iter().all(|m| !m.is_default));
}

/// Caller-defined metadata fields survive ingestion and come back on
/// retrieved chunks unchanged.
#[tokio::test]
async fn caller_metadata_survives_round_trip() {
    let engine = engine(&["policy"]);
    let metadata = Metadata {
        tags: vec!["privacy".to_string(), "internal".to_string()],
        ..Metadata::default()
    }
    .with_extra("department", "legal")
    .with_extra("version", 3i64);

    engine
        .ingest(
            "D1",
            "Section 1 the policy covers data handling duties.",
            metadata,
            IngestOptions::default(),
        )
        .await
        .unwrap();

    let chunks = engine.retrieve("policy", None).await.unwrap();
    let found =
        chunks.iter().find(|chunk| chunk.metadata.doc_id.as_deref() == Some("D1")).unwrap();

    assert_eq!(found.metadata.extra.get("department"), Some(&MetaValue::Str("legal".to_string())));
    assert_eq!(found.metadata.extra.get("version"), Some(&MetaValue::Int(3)));
    assert_eq!(found.metadata.tags, vec!["privacy", "internal"]);
}

/// Re-ingesting a document overwrites its positional records instead of
/// duplicating them.
#[tokio::test]
async fn reingest_overwrites_positional_records() {
    let engine = engine(&["scope"]);
    let text = "Section 1 scope of this policy. Section 2 definitions used within it.";

    engine.ingest("D1", text, Metadata::default(), IngestOptions::default()).await.unwrap();
    assert_eq!(engine.index().count().await.unwrap(), 2);

    engine.ingest("D1", text, Metadata::default(), IngestOptions::default()).await.unwrap();
    assert_eq!(engine.index().count().await.unwrap(), 2);
}

/// Delegates everything to an inner in-memory store except `query`, which
/// always reports the index as unreachable.
struct BrokenQueryBackend {
    inner: InMemoryBackend,
}

#[async_trait]
impl VectorBackend for BrokenQueryBackend {
    async fn ensure_collection(&self, name: &str) -> ragcore::Result<()> {
        self.inner.ensure_collection(name).await
    }

    async fn upsert(&self, collection: &str, records: &[VectorRecord]) -> ragcore::Result<()> {
        self.inner.upsert(collection, records).await
    }

    async fn delete_matching(
        &self,
        collection: &str,
        key: &str,
        value: &MetaValue,
    ) -> ragcore::Result<()> {
        self.inner.delete_matching(collection, key, value).await
    }

    async fn query(
        &self,
        _collection: &str,
        _embedding: &[f32],
        _n_results: usize,
    ) -> ragcore::Result<Vec<QueryHit>> {
        Err(RagError::IndexUnavailable {
            backend: "test".to_string(),
            message: "vector search is down".to_string(),
        })
    }

    async fn keyword_query(
        &self,
        collection: &str,
        text: &str,
        n_results: usize,
    ) -> ragcore::Result<Vec<StoredChunk>> {
        self.inner.keyword_query(collection, text, n_results).await
    }

    async fn get(&self, collection: &str, id: &str) -> ragcore::Result<Option<StoredChunk>> {
        self.inner.get(collection, id).await
    }

    async fn get_all(&self, collection: &str) -> ragcore::Result<Vec<StoredChunk>> {
        self.inner.get_all(collection).await
    }

    async fn count(&self, collection: &str) -> ragcore::Result<usize> {
        self.inner.count(collection).await
    }

    async fn list_collections(&self) -> ragcore::Result<Vec<String>> {
        self.inner.list_collections().await
    }

    async fn delete_collection(&self, name: &str) -> ragcore::Result<()> {
        self.inner.delete_collection(name).await
    }
}
