//! # ragcore
//!
//! Hybrid document retrieval engine: three-tier chunking, vector indexing
//! with per-document result grouping, keyword fallback, baseline/user
//! classification, and answer composition.
//!
//! ## Overview
//!
//! Documents flow through [`HybridChunker`] into a [`VectorIndex`], which
//! embeds each chunk and stores it in a [`VectorBackend`]. Queries run
//! through [`HybridRetriever`], which merges grouped vector hits with a
//! [`KeywordFallback`] pass, then [`classify`] splits the results into
//! baseline and user sets for the [`AnswerComposer`]. The [`RagEngine`]
//! facade wires all of this together.
//!
//! Backends:
//!
//! - [`InMemoryBackend`] - cosine-distance store for development and tests
//! - `ChromaBackend` - Chroma server over REST (feature `chroma`)
//!
//! Providers:
//!
//! - `GeminiEmbedder` / `GeminiGenerator` - Gemini REST API (feature `gemini`)
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use std::sync::Arc;
//!
//! use ragcore::{AskOptions, IngestOptions, InMemoryBackend, Metadata, RagEngine};
//!
//! let engine = RagEngine::builder()
//!     .backend(Arc::new(InMemoryBackend::new()))
//!     .embedder(Arc::new(my_embedder))
//!     .generator(Arc::new(my_generator))
//!     .build()?;
//!
//! engine.ingest("policy-1", &text, Metadata::default(), IngestOptions::default()).await?;
//! let answer = engine.ask("How long do we retain records?", AskOptions::default()).await?;
//! println!("{}", answer.text);
//! ```
//!
//! ## Features
//!
//! - `gemini` - Gemini embedding and generation providers
//! - `chroma` - Chroma vector backend
//! - `full` - everything above

pub mod authoring;
pub mod backend;
pub mod chunking;
pub mod classifier;
#[cfg(feature = "chroma")]
pub mod chroma;
pub mod composer;
pub mod config;
pub mod document;
pub mod embedding;
pub mod engine;
pub mod error;
#[cfg(feature = "gemini")]
pub mod gemini;
pub mod generation;
pub mod index;
pub mod keyword;
pub mod memory;
pub mod retrieval;

pub use authoring::{DocumentAuthor, GeneratedDocument};
pub use backend::VectorBackend;
pub use chunking::{
    ChunkStrategy, ChunkerConfig, HybridChunker, RuleSentenceSplitter, SentenceSplit,
};
#[cfg(feature = "chroma")]
pub use chroma::ChromaBackend;
pub use classifier::{Classified, classify};
pub use composer::{Answer, AnswerComposer, AnswerStyle};
pub use config::EngineConfig;
pub use document::{Chunk, DocMatches, MetaValue, Metadata, QueryHit, StoredChunk, VectorRecord};
pub use embedding::{EmbeddingProvider, TaskType};
pub use engine::{
    AskOptions, CollectionStatus, IngestOptions, IngestReport, IngestStatus, RagEngine,
    RagEngineBuilder,
};
pub use error::{RagError, Result};
#[cfg(feature = "gemini")]
pub use gemini::{GeminiEmbedder, GeminiGenerator};
pub use generation::GenerationProvider;
pub use index::{AddOutcome, VectorIndex};
pub use keyword::KeywordFallback;
pub use memory::InMemoryBackend;
pub use retrieval::HybridRetriever;
