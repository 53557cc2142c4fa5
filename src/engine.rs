//! Engine facade over the full ingest-and-answer workflow.
//!
//! [`RagEngine`] composes a [`HybridChunker`], a [`VectorIndex`], a
//! [`HybridRetriever`], and (when a generation provider is configured) an
//! [`AnswerComposer`] and [`DocumentAuthor`]. Construct one via
//! [`RagEngine::builder()`].
//!
//! # Example
//!
//! ```rust,ignore
//! use ragcore::{RagEngine, EngineConfig, InMemoryBackend};
//!
//! let engine = RagEngine::builder()
//!     .config(EngineConfig::default())
//!     .backend(Arc::new(InMemoryBackend::new()))
//!     .embedder(Arc::new(my_embedder))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! let report = engine.ingest("policy-1", &text, Metadata::default(), IngestOptions::default()).await?;
//! let answer = engine.ask("what is our retention period?", AskOptions::default()).await?;
//! ```

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::authoring::{DocumentAuthor, GeneratedDocument};
use crate::backend::VectorBackend;
use crate::chunking::{ChunkStrategy, HybridChunker, RuleSentenceSplitter, SentenceSplit};
use crate::classifier::classify;
use crate::composer::{Answer, AnswerComposer, AnswerStyle};
use crate::config::EngineConfig;
use crate::document::{Chunk, Metadata};
use crate::embedding::EmbeddingProvider;
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;
use crate::index::VectorIndex;
use crate::keyword::KeywordFallback;
use crate::retrieval::HybridRetriever;

/// Reply returned by [`RagEngine::ask`] when retrieval finds nothing.
const NO_CONTEXT_REPLY: &str = "Sorry, no relevant documents found.";

/// Per-call ingestion options.
#[derive(Debug, Clone, Default)]
pub struct IngestOptions {
    /// Chunking strategy for this document.
    pub strategy: ChunkStrategy,
    /// Deadline for the whole call; overrides the engine-wide timeout.
    pub timeout: Option<Duration>,
}

/// Per-call options for [`RagEngine::ask`].
#[derive(Debug, Clone, Default)]
pub struct AskOptions {
    /// Results to keep per document; defaults to the engine's `top_k`.
    pub top_k: Option<usize>,
    /// Answer style directive.
    pub style: AnswerStyle,
    /// Deadline for the whole call; overrides the engine-wide timeout.
    pub timeout: Option<Duration>,
}

/// Outcome category of an ingestion call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStatus {
    /// Every chunk was indexed.
    Success,
    /// Some chunks were skipped; the rest were indexed.
    Partial,
    /// No chunk survived to be indexed.
    Failed,
}

/// What an ingestion call actually wrote.
///
/// Skips happen in lenient mode when a chunk has empty text or its embedding
/// fails; the report makes partial ingestion explicit instead of silently
/// under-indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    /// Document the chunks belong to.
    pub doc_id: String,
    /// Records written to the index.
    pub chunks_indexed: usize,
    /// Chunks dropped on the way.
    pub chunks_skipped: usize,
    /// Success, partial, or failed.
    pub status: IngestStatus,
}

/// Row in the [`RagEngine::status`] report.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CollectionStatus {
    /// Collection name.
    pub name: String,
    /// Record count, or `None` when the backend could not report one.
    pub count: Option<usize>,
}

/// The retrieval engine facade.
///
/// Coordinates ingestion (chunk → embed → index), question answering
/// (retrieve → classify → compose), authoring helpers, and collection
/// administration. All operations honor the configured
/// [`operation_timeout`](EngineConfig::operation_timeout), with per-call
/// overrides where the options carry one.
pub struct RagEngine {
    config: EngineConfig,
    chunker: HybridChunker,
    index: Arc<VectorIndex>,
    retriever: HybridRetriever,
    composer: Option<AnswerComposer>,
    author: Option<DocumentAuthor>,
}

impl std::fmt::Debug for RagEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RagEngine").field("config", &self.config).finish_non_exhaustive()
    }
}

impl RagEngine {
    /// Create a new [`RagEngineBuilder`].
    pub fn builder() -> RagEngineBuilder {
        RagEngineBuilder::default()
    }

    /// Return a reference to the engine configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Return the vector index, for callers that need direct record access.
    pub fn index(&self) -> &Arc<VectorIndex> {
        &self.index
    }

    /// Chunk `content` and index it under `doc_id`.
    ///
    /// `base_metadata` is merged into every chunk's metadata (chunk fields
    /// win on collision). Re-ingesting a `doc_id` overwrites its positional
    /// records; delete first if the document may have shrunk.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for blank content or `doc_id`,
    /// [`RagError::Timeout`] past the deadline, the first bad chunk's error
    /// in strict mode, and backend write failures.
    pub async fn ingest(
        &self,
        doc_id: &str,
        content: &str,
        base_metadata: Metadata,
        options: IngestOptions,
    ) -> Result<IngestReport> {
        let inner = async {
            let chunks = self.chunker.chunk(content, &options.strategy)?;
            let outcome = self.index.add(&chunks, doc_id, &base_metadata).await?;

            let status = if outcome.indexed == 0 {
                IngestStatus::Failed
            } else if outcome.skipped > 0 {
                IngestStatus::Partial
            } else {
                IngestStatus::Success
            };
            info!(doc_id, indexed = outcome.indexed, skipped = outcome.skipped, "ingest finished");

            Ok(IngestReport {
                doc_id: doc_id.to_string(),
                chunks_indexed: outcome.indexed,
                chunks_skipped: outcome.skipped,
                status,
            })
        };
        self.bounded("ingest", options.timeout, inner).await
    }

    /// Remove every indexed chunk of `doc_id`. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Timeout`] past the deadline and backend failures.
    pub async fn delete_document(&self, doc_id: &str) -> Result<()> {
        self.bounded("delete_document", None, self.index.delete_by_doc(doc_id)).await
    }

    /// Re-embed and overwrite one existing record's text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::NotFound`] when the record does not exist.
    pub async fn update_chunk(&self, chunk_id: &str, new_text: &str) -> Result<()> {
        self.bounded("update_chunk", None, self.index.update_embedding(chunk_id, new_text)).await
    }

    /// Answer `question` from indexed context.
    ///
    /// Runs hybrid retrieval, partitions the hits into baseline and user
    /// sets, and composes an answer in the requested style. When retrieval
    /// finds nothing the reply is a fixed no-context message with empty
    /// sources, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when no generation provider is
    /// configured, [`RagError::EmptyInput`] for a blank question,
    /// [`RagError::Timeout`] past the deadline, and generation failures.
    pub async fn ask(&self, question: &str, options: AskOptions) -> Result<Answer> {
        let top_k = options.top_k.unwrap_or(self.config.top_k);
        let inner = async {
            let question = question.trim();
            if question.is_empty() {
                return Err(RagError::EmptyInput("empty question".to_string()));
            }
            let composer = self.composer.as_ref().ok_or_else(|| {
                RagError::Config("no generation provider configured".to_string())
            })?;

            let chunks = self.retriever.retrieve(question, top_k).await?;
            if chunks.is_empty() {
                info!("no relevant context, returning canned reply");
                return Ok(Answer { text: NO_CONTEXT_REPLY.to_string(), sources: Vec::new() });
            }

            let classified = classify(chunks);
            composer.compose(question, &classified, options.style).await
        };
        self.bounded("ask", options.timeout, inner).await
    }

    /// Retrieve context chunks without generating an answer.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for a blank question and
    /// [`RagError::Timeout`] past the deadline. Vector-path failures degrade
    /// to keyword-only results rather than erroring.
    pub async fn retrieve(&self, question: &str, top_k: Option<usize>) -> Result<Vec<Chunk>> {
        let top_k = top_k.unwrap_or(self.config.top_k);
        self.bounded("retrieve", None, self.retriever.retrieve(question, top_k)).await
    }

    /// Draft a document from a free-text prompt.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when no generation provider is
    /// configured; see [`DocumentAuthor::draft_document`] for the rest.
    pub async fn draft_document(&self, prompt: &str) -> Result<GeneratedDocument> {
        let author = self.author()?;
        self.bounded("draft_document", None, author.draft_document(prompt)).await
    }

    /// Suggest tags for `content`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when no generation provider is
    /// configured; see [`DocumentAuthor::suggest_tags`] for the rest.
    pub async fn suggest_tags(&self, content: &str) -> Result<Vec<String>> {
        let author = self.author()?;
        self.bounded("suggest_tags", None, author.suggest_tags(content)).await
    }

    /// Summarize `content`.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] when no generation provider is
    /// configured; see [`DocumentAuthor::summarize`] for the rest.
    pub async fn summarize(&self, content: &str) -> Result<String> {
        let author = self.author()?;
        self.bounded("summarize", None, author.summarize(content)).await
    }

    /// Report every collection with its record count.
    ///
    /// A collection whose count cannot be read is reported with
    /// `count: None` rather than failing the whole status call.
    ///
    /// # Errors
    ///
    /// Returns backend failures from listing the collections themselves.
    pub async fn status(&self) -> Result<Vec<CollectionStatus>> {
        let names = self.index.list_collections().await?;
        let mut statuses = Vec::with_capacity(names.len());
        for name in names {
            let count = match self.index.backend().count(&name).await {
                Ok(count) => Some(count),
                Err(e) => {
                    warn!(collection = %name, error = %e, "count unavailable");
                    None
                }
            };
            statuses.push(CollectionStatus { name, count });
        }
        Ok(statuses)
    }

    /// Delete every collection on the backend. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns the first backend failure; collections already removed stay
    /// removed.
    pub async fn reset(&self) -> Result<usize> {
        let names = self.index.list_collections().await?;
        for name in &names {
            self.index.delete_collection(name).await?;
        }
        info!(collections = names.len(), "reset vector data");
        Ok(names.len())
    }

    /// Names of every collection on the backend.
    pub async fn list_collections(&self) -> Result<Vec<String>> {
        self.index.list_collections().await
    }

    fn author(&self) -> Result<&DocumentAuthor> {
        self.author
            .as_ref()
            .ok_or_else(|| RagError::Config("no generation provider configured".to_string()))
    }

    /// Run `fut` under the per-call deadline, falling back to the engine-wide
    /// one; no deadline means no bound.
    async fn bounded<T, F>(&self, operation: &str, deadline: Option<Duration>, fut: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        match deadline.or(self.config.operation_timeout) {
            Some(limit) => match tokio::time::timeout(limit, fut).await {
                Ok(result) => result,
                Err(_) => {
                    warn!(operation, timeout_ms = limit.as_millis() as u64, "operation timed out");
                    Err(RagError::Timeout { operation: operation.to_string() })
                }
            },
            None => fut.await,
        }
    }
}

/// Builder for constructing a [`RagEngine`].
///
/// `backend` and `embedder` are required; `generator` enables
/// [`ask`](RagEngine::ask) and the authoring helpers; `sentence_splitter`
/// defaults to [`RuleSentenceSplitter`].
#[derive(Default)]
pub struct RagEngineBuilder {
    config: Option<EngineConfig>,
    backend: Option<Arc<dyn VectorBackend>>,
    embedder: Option<Arc<dyn EmbeddingProvider>>,
    generator: Option<Arc<dyn GenerationProvider>>,
    splitter: Option<Arc<dyn SentenceSplit>>,
}

impl RagEngineBuilder {
    /// Set the engine configuration. Defaults to [`EngineConfig::default()`].
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set the vector store backend.
    pub fn backend(mut self, backend: Arc<dyn VectorBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set the embedding provider.
    pub fn embedder(mut self, embedder: Arc<dyn EmbeddingProvider>) -> Self {
        self.embedder = Some(embedder);
        self
    }

    /// Set the generation provider for answering and authoring.
    pub fn generator(mut self, generator: Arc<dyn GenerationProvider>) -> Self {
        self.generator = Some(generator);
        self
    }

    /// Replace the rule-based sentence splitter.
    pub fn sentence_splitter(mut self, splitter: Arc<dyn SentenceSplit>) -> Self {
        self.splitter = Some(splitter);
        self
    }

    /// Build the [`RagEngine`], validating that required components are set.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if `backend` or `embedder` is missing.
    pub fn build(self) -> Result<RagEngine> {
        let config = self.config.unwrap_or_default();
        let backend =
            self.backend.ok_or_else(|| RagError::Config("backend is required".to_string()))?;
        let embedder =
            self.embedder.ok_or_else(|| RagError::Config("embedder is required".to_string()))?;

        let chunker = match self.splitter {
            Some(splitter) => HybridChunker::with_splitter(config.chunker.clone(), splitter),
            None => {
                HybridChunker::with_splitter(config.chunker.clone(), Arc::new(RuleSentenceSplitter))
            }
        };

        let index = Arc::new(
            VectorIndex::new(Arc::clone(&backend), embedder, config.collection.clone())
                .strict(config.strict_ingest),
        );
        let keyword = KeywordFallback::new(backend, config.collection.clone());
        let retriever = HybridRetriever::new(Arc::clone(&index), keyword)
            .with_multipliers(config.fetch_multiplier, config.keyword_multiplier);

        let composer = self.generator.clone().map(AnswerComposer::new);
        let author = self.generator.map(DocumentAuthor::new);

        Ok(RagEngine { config, chunker, index, retriever, composer, author })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::embedding::TaskType;
    use crate::memory::InMemoryBackend;

    /// Deterministic embedder keyed on text length.
    struct LenEmbedder;

    #[async_trait]
    impl EmbeddingProvider for LenEmbedder {
        async fn embed(&self, text: &str, _task: TaskType) -> Result<Vec<f32>> {
            if text.trim().is_empty() {
                return Err(RagError::Embedding {
                    provider: "mock".to_string(),
                    message: "empty input".to_string(),
                });
            }
            let len = text.len() as f32;
            Ok(vec![1.0, len / (len + 1.0), 1.0 / (len + 1.0)])
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    /// Sleeps long enough that any bounded operation times out first.
    struct SlowEmbedder;

    #[async_trait]
    impl EmbeddingProvider for SlowEmbedder {
        async fn embed(&self, _text: &str, _task: TaskType) -> Result<Vec<f32>> {
            tokio::time::sleep(Duration::from_secs(300)).await;
            Ok(vec![1.0, 0.0, 0.0])
        }

        fn dimensions(&self) -> usize {
            3
        }
    }

    /// Fails the test if generation is ever reached.
    struct UnreachableGenerator;

    #[async_trait]
    impl GenerationProvider for UnreachableGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            panic!("generation must not be called");
        }
    }

    struct CannedGenerator;

    #[async_trait]
    impl GenerationProvider for CannedGenerator {
        async fn generate(&self, _prompt: &str) -> Result<String> {
            Ok("Here is the answer.".to_string())
        }
    }

    fn engine_with(generator: Option<Arc<dyn GenerationProvider>>) -> RagEngine {
        let mut builder = RagEngine::builder()
            .backend(Arc::new(InMemoryBackend::new()))
            .embedder(Arc::new(LenEmbedder));
        if let Some(generator) = generator {
            builder = builder.generator(generator);
        }
        builder.build().unwrap()
    }

    #[test]
    fn build_requires_backend_and_embedder() {
        let err = RagEngine::builder().build().unwrap_err();
        assert!(matches!(err, RagError::Config(_)));

        let err = RagEngine::builder()
            .backend(Arc::new(InMemoryBackend::new()))
            .build()
            .unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn ingest_reports_success() {
        let engine = engine_with(None);
        let report = engine
            .ingest(
                "doc-1",
                "First sentence here. Second sentence follows. Third closes it.",
                Metadata::default(),
                IngestOptions::default(),
            )
            .await
            .unwrap();

        assert_eq!(report.doc_id, "doc-1");
        assert_eq!(report.status, IngestStatus::Success);
        assert!(report.chunks_indexed >= 1);
        assert_eq!(report.chunks_skipped, 0);
        assert_eq!(engine.index().count().await.unwrap(), report.chunks_indexed);
    }

    #[tokio::test]
    async fn ask_without_generator_is_config_error() {
        let engine = engine_with(None);
        let err = engine.ask("anything", AskOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::Config(_)));
    }

    #[tokio::test]
    async fn empty_question_is_rejected() {
        let engine = engine_with(Some(Arc::new(CannedGenerator)));
        let err = engine.ask("   ", AskOptions::default()).await.unwrap_err();
        assert!(matches!(err, RagError::EmptyInput(_)));
    }

    #[tokio::test]
    async fn empty_store_returns_canned_reply_without_generating() {
        let engine = engine_with(Some(Arc::new(UnreachableGenerator)));
        let answer = engine.ask("retention period?", AskOptions::default()).await.unwrap();
        assert_eq!(answer.text, "Sorry, no relevant documents found.");
        assert!(answer.sources.is_empty());
    }

    #[tokio::test]
    async fn ask_composes_from_indexed_context() {
        let engine = engine_with(Some(Arc::new(CannedGenerator)));
        engine
            .ingest(
                "doc-1",
                "Records are retained for five years. Backups rotate monthly.",
                Metadata::default(),
                IngestOptions::default(),
            )
            .await
            .unwrap();

        let answer = engine.ask("retention period?", AskOptions::default()).await.unwrap();
        assert_eq!(answer.text, "Here is the answer.");
        assert!(!answer.sources.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn engine_timeout_surfaces_as_timeout_error() {
        let engine = RagEngine::builder()
            .config(
                EngineConfig::builder()
                    .operation_timeout(Duration::from_secs(1))
                    .build()
                    .unwrap(),
            )
            .backend(Arc::new(InMemoryBackend::new()))
            .embedder(Arc::new(SlowEmbedder))
            .build()
            .unwrap();

        let err = engine
            .ingest("doc-1", "some content", Metadata::default(), IngestOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, RagError::Timeout { ref operation } if operation == "ingest"));
    }

    #[tokio::test]
    async fn per_call_timeout_overrides_engine_default() {
        let engine = engine_with(None);
        // No engine-wide timeout; the generous per-call one must not fire.
        let report = engine
            .ingest(
                "doc-1",
                "Quick content to index.",
                Metadata::default(),
                IngestOptions { timeout: Some(Duration::from_secs(30)), ..Default::default() },
            )
            .await
            .unwrap();
        assert_eq!(report.status, IngestStatus::Success);
    }

    #[tokio::test]
    async fn update_chunk_requires_existing_record() {
        let engine = engine_with(None);
        let err = engine.update_chunk("missing_chunk_0", "new text").await.unwrap_err();
        assert!(matches!(err, RagError::NotFound { .. }));
    }

    #[tokio::test]
    async fn reset_removes_all_collections() {
        let engine = engine_with(None);
        engine
            .ingest("doc-1", "Something to index here.", Metadata::default(), IngestOptions::default())
            .await
            .unwrap();

        let statuses = engine.status().await.unwrap();
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].name, "documents");
        assert_eq!(statuses[0].count, Some(1));

        let removed = engine.reset().await.unwrap();
        assert_eq!(removed, 1);
        assert!(engine.list_collections().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn authoring_without_generator_is_config_error() {
        let engine = engine_with(None);
        assert!(matches!(engine.draft_document("x").await, Err(RagError::Config(_))));
        assert!(matches!(engine.suggest_tags("x").await, Err(RagError::Config(_))));
        assert!(matches!(engine.summarize("x").await, Err(RagError::Config(_))));
    }
}
