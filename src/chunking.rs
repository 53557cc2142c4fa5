//! Layered document chunking.
//!
//! [`HybridChunker`] cuts document text into chunks using three tiers, each
//! a fallback for the one before it:
//!
//! 1. **Section split**: `Section N` / `Chapter N` headers start chunks
//! 2. **Semantic split**: sentences accumulate up to a word budget, with
//!    trailing-word overlap between consecutive chunks
//! 3. **Fixed windows**: overlapping word windows, the last resort
//!
//! Sentence tokenization is an injected capability ([`SentenceSplit`]) so
//! callers can plug in a linguistic tokenizer; the default is rule-based.
//! "Tokens" throughout this module are whitespace-delimited words.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::document::{Chunk, Metadata};
use crate::error::{RagError, Result};

static SECTION_HEADER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\b(?:section|chapter)\s+\d+").expect("header pattern"));

/// Splits text into sentences.
///
/// Implementations must not drop words: the concatenated output contains
/// every word of the input, in order. Returned sentences are trimmed and
/// never empty.
pub trait SentenceSplit: Send + Sync {
    /// Split `text` into trimmed, non-empty sentences.
    fn sentences(&self, text: &str) -> Vec<String>;
}

/// Rule-based sentence splitter.
///
/// A sentence ends at `.`, `!` or `?` followed by whitespace (or end of
/// input), or at a blank line. Good enough for prose; inject a linguistic
/// tokenizer via [`HybridChunker::with_splitter`] when it is not.
#[derive(Debug, Clone, Copy, Default)]
pub struct RuleSentenceSplitter;

impl SentenceSplit for RuleSentenceSplitter {
    fn sentences(&self, text: &str) -> Vec<String> {
        let mut sentences = Vec::new();
        let mut current = String::new();
        let mut chars = text.chars().peekable();

        while let Some(c) = chars.next() {
            current.push(c);
            let boundary = match c {
                '.' | '!' | '?' => chars.peek().is_none_or(|next| next.is_whitespace()),
                '\n' => chars.peek() == Some(&'\n'),
                _ => false,
            };
            if boundary {
                flush(&mut current, &mut sentences);
            }
        }
        flush(&mut current, &mut sentences);

        sentences
    }
}

fn flush(current: &mut String, out: &mut Vec<String>) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        out.push(trimmed.to_string());
    }
    current.clear();
}

/// Word-budget configuration for the semantic and fixed-window tiers.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkerConfig {
    /// Maximum words per chunk.
    pub max_tokens: usize,
    /// Words repeated from the end of one chunk at the start of the next.
    pub overlap_tokens: usize,
    /// Sections longer than this many words are re-split semantically.
    pub section_split_threshold: usize,
}

impl Default for ChunkerConfig {
    fn default() -> Self {
        Self { max_tokens: 1500, overlap_tokens: 200, section_split_threshold: 600 }
    }
}

impl ChunkerConfig {
    /// Create a new builder for constructing a [`ChunkerConfig`].
    pub fn builder() -> ChunkerConfigBuilder {
        ChunkerConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`ChunkerConfig`].
#[derive(Debug, Clone, Default)]
pub struct ChunkerConfigBuilder {
    config: ChunkerConfig,
}

impl ChunkerConfigBuilder {
    /// Set the maximum words per chunk.
    pub fn max_tokens(mut self, max_tokens: usize) -> Self {
        self.config.max_tokens = max_tokens;
        self
    }

    /// Set the overlap between consecutive chunks in words.
    pub fn overlap_tokens(mut self, overlap_tokens: usize) -> Self {
        self.config.overlap_tokens = overlap_tokens;
        self
    }

    /// Set the word count above which a section is re-split semantically.
    pub fn section_split_threshold(mut self, threshold: usize) -> Self {
        self.config.section_split_threshold = threshold;
        self
    }

    /// Build the [`ChunkerConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `max_tokens == 0`
    /// - `overlap_tokens >= max_tokens` (the window must advance)
    pub fn build(self) -> Result<ChunkerConfig> {
        validate_window(self.config.max_tokens, self.config.overlap_tokens)?;
        Ok(self.config)
    }
}

fn validate_window(size: usize, overlap: usize) -> Result<()> {
    if size == 0 {
        return Err(RagError::Config("chunk size must be greater than zero".to_string()));
    }
    if overlap >= size {
        return Err(RagError::Config(format!(
            "chunk overlap ({overlap}) must be less than chunk size ({size})"
        )));
    }
    Ok(())
}

/// How a document should be cut at ingestion.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ChunkStrategy {
    /// Section split, re-splitting long sections; semantic split when no
    /// headers are found; fixed windows when sentence tokenization yields
    /// nothing.
    #[default]
    Hybrid,
    /// One chunk per `Section N` / `Chapter N` header, bodies kept whole.
    /// Falls back to the semantic tier when the text has no headers.
    BySection,
    /// Fixed word windows with overlap, ignoring structure.
    FixedSize {
        /// Words per window.
        chunk_size: usize,
        /// Words shared between consecutive windows.
        chunk_overlap: usize,
    },
}

/// The layered chunker.
///
/// # Example
///
/// ```rust,ignore
/// use ragcore::chunking::{ChunkStrategy, ChunkerConfig, HybridChunker};
///
/// let chunker = HybridChunker::new(ChunkerConfig::default());
/// let chunks = chunker.chunk(&text, &ChunkStrategy::Hybrid)?;
/// ```
pub struct HybridChunker {
    splitter: Arc<dyn SentenceSplit>,
    config: ChunkerConfig,
}

impl HybridChunker {
    /// Create a chunker with the rule-based sentence splitter.
    pub fn new(config: ChunkerConfig) -> Self {
        Self { splitter: Arc::new(RuleSentenceSplitter), config }
    }

    /// Create a chunker with an injected sentence splitter.
    pub fn with_splitter(config: ChunkerConfig, splitter: Arc<dyn SentenceSplit>) -> Self {
        Self { splitter, config }
    }

    /// The configured word budgets.
    pub fn config(&self) -> &ChunkerConfig {
        &self.config
    }

    /// Split `text` into chunks.
    ///
    /// Chunk metadata carries `section_title` for section-derived chunks and
    /// is otherwise empty; ids and positions are assigned at indexing time.
    /// Non-empty input always yields at least one chunk, and no chunk has
    /// empty text.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for empty or whitespace-only text,
    /// and [`RagError::Config`] when a [`ChunkStrategy::FixedSize`] window
    /// does not advance (`chunk_overlap >= chunk_size`).
    pub fn chunk(&self, text: &str, strategy: &ChunkStrategy) -> Result<Vec<Chunk>> {
        if text.trim().is_empty() {
            return Err(RagError::EmptyInput("no text to chunk".to_string()));
        }

        match strategy {
            ChunkStrategy::Hybrid => Ok(self.hybrid(text)),
            ChunkStrategy::BySection => Ok(self.by_section(text)),
            ChunkStrategy::FixedSize { chunk_size, chunk_overlap } => {
                validate_window(*chunk_size, *chunk_overlap)?;
                Ok(fixed_windows(text, *chunk_size, *chunk_overlap)
                    .into_iter()
                    .map(|piece| Chunk::new(piece, Metadata::default()))
                    .collect())
            }
        }
    }

    fn hybrid(&self, text: &str) -> Vec<Chunk> {
        let sections = find_sections(text);
        if !sections.is_empty() {
            let mut chunks = Vec::new();
            for (title, body) in sections {
                let metadata =
                    Metadata { section_title: Some(title), ..Metadata::default() };
                if count_words(&body) > self.config.section_split_threshold {
                    for piece in self.semantic_pieces(&body) {
                        chunks.push(Chunk::new(piece, metadata.clone()));
                    }
                } else {
                    chunks.push(Chunk::new(body, metadata));
                }
            }
            return chunks;
        }

        let semantic = self.semantic_pieces(text);
        if !semantic.is_empty() {
            return semantic
                .into_iter()
                .map(|piece| Chunk::new(piece, Metadata::default()))
                .collect();
        }

        tracing::debug!("sentence tokenization yielded nothing, using fixed windows");
        fixed_windows(text, self.config.max_tokens, self.config.overlap_tokens)
            .into_iter()
            .map(|piece| Chunk::new(piece, Metadata::default()))
            .collect()
    }

    fn by_section(&self, text: &str) -> Vec<Chunk> {
        let sections = find_sections(text);
        if sections.is_empty() {
            tracing::debug!("no section headers found, using semantic split");
            return self
                .semantic_pieces(text)
                .into_iter()
                .map(|piece| Chunk::new(piece, Metadata::default()))
                .collect();
        }

        sections
            .into_iter()
            .map(|(title, body)| {
                Chunk::new(body, Metadata { section_title: Some(title), ..Metadata::default() })
            })
            .collect()
    }

    /// Accumulate sentences up to `max_tokens` words, seeding each new chunk
    /// with the trailing `overlap_tokens` words of the previous one. A single
    /// sentence over the budget becomes its own chunk; sentences are never
    /// split.
    fn semantic_pieces(&self, text: &str) -> Vec<String> {
        let sentences = self.splitter.sentences(text);
        if sentences.is_empty() {
            return Vec::new();
        }

        let mut chunks = Vec::new();
        let mut current: Vec<String> = Vec::new();
        let mut current_len = 0usize;

        for sentence in sentences {
            let token_count = count_words(&sentence);
            if current_len + token_count > self.config.max_tokens && !current.is_empty() {
                let chunk_text = current.join(" ");
                let (overlap, overlap_len) =
                    trailing_words(&chunk_text, self.config.overlap_tokens);
                chunks.push(chunk_text);
                current.clear();
                current_len = 0;
                if !overlap.is_empty() {
                    current.push(overlap);
                    current_len = overlap_len;
                }
            }
            current.push(sentence);
            current_len += token_count;
        }

        if !current.is_empty() {
            chunks.push(current.join(" "));
        }

        chunks
    }
}

/// Find `Section N` / `Chapter N` headers and the body text up to the next
/// header. Headers with empty bodies are dropped.
fn find_sections(text: &str) -> Vec<(String, String)> {
    let matches: Vec<regex::Match<'_>> = SECTION_HEADER.find_iter(text).collect();
    let mut sections = Vec::new();

    for (i, header) in matches.iter().enumerate() {
        let body_end = matches.get(i + 1).map_or(text.len(), |next| next.start());
        let body = text[header.end()..body_end].trim();
        if body.is_empty() {
            continue;
        }
        sections.push((header.as_str().trim().to_string(), body.to_string()));
    }

    sections
}

/// Overlapping word windows. Callers validate `size > overlap`.
fn fixed_windows(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let words: Vec<&str> = text.split_whitespace().collect();
    let step = size - overlap;
    let mut out = Vec::new();
    let mut start = 0;

    while start < words.len() {
        let end = (start + size).min(words.len());
        out.push(words[start..end].join(" "));
        start += step;
    }

    out
}

/// The last `n` words of `text` joined with spaces, and how many there are.
fn trailing_words(text: &str, n: usize) -> (String, usize) {
    let words: Vec<&str> = text.split_whitespace().collect();
    let start = words.len().saturating_sub(n);
    (words[start..].join(" "), words.len() - start)
}

fn count_words(text: &str) -> usize {
    text.split_whitespace().count()
}
