//! Configuration for the retrieval engine.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunking::ChunkerConfig;
use crate::error::{RagError, Result};

/// Configuration parameters for [`RagEngine`](crate::engine::RagEngine).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EngineConfig {
    /// Name of the collection the engine reads and writes.
    pub collection: String,
    /// Number of results returned per document by a grouped query.
    pub top_k: usize,
    /// Raw nearest-neighbor fetch is `top_k * fetch_multiplier`, wide enough
    /// that grouping by document still fills every group.
    pub fetch_multiplier: usize,
    /// Keyword fallback fetches `top_k * keyword_multiplier` hits.
    pub keyword_multiplier: usize,
    /// Abort ingestion on the first bad chunk instead of skipping it.
    pub strict_ingest: bool,
    /// Default bound on a whole ingest or ask call. `None` means unbounded;
    /// per-call options can override either way.
    pub operation_timeout: Option<Duration>,
    /// Word budgets for the chunker.
    pub chunker: ChunkerConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            collection: "documents".to_string(),
            top_k: 5,
            fetch_multiplier: 10,
            keyword_multiplier: 5,
            strict_ingest: false,
            operation_timeout: None,
            chunker: ChunkerConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Create a new builder for constructing an [`EngineConfig`].
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }
}

/// Builder for constructing a validated [`EngineConfig`].
#[derive(Debug, Clone, Default)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    /// Set the collection name.
    pub fn collection(mut self, name: impl Into<String>) -> Self {
        self.config.collection = name.into();
        self
    }

    /// Set the number of results per document.
    pub fn top_k(mut self, k: usize) -> Self {
        self.config.top_k = k;
        self
    }

    /// Set the raw-fetch multiplier for grouped queries.
    pub fn fetch_multiplier(mut self, multiplier: usize) -> Self {
        self.config.fetch_multiplier = multiplier;
        self
    }

    /// Set the fetch multiplier for the keyword fallback.
    pub fn keyword_multiplier(mut self, multiplier: usize) -> Self {
        self.config.keyword_multiplier = multiplier;
        self
    }

    /// Abort ingestion on the first bad chunk instead of skipping it.
    pub fn strict_ingest(mut self, strict: bool) -> Self {
        self.config.strict_ingest = strict;
        self
    }

    /// Bound every ingest and ask call by `timeout`.
    pub fn operation_timeout(mut self, timeout: Duration) -> Self {
        self.config.operation_timeout = Some(timeout);
        self
    }

    /// Set the chunker word budgets.
    pub fn chunker(mut self, chunker: ChunkerConfig) -> Self {
        self.config.chunker = chunker;
        self
    }

    /// Build the [`EngineConfig`], validating that parameters are consistent.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::Config`] if:
    /// - `collection` is empty
    /// - `top_k == 0`
    /// - either multiplier is zero
    /// - the chunker budgets fail [`ChunkerConfig`] validation
    pub fn build(self) -> Result<EngineConfig> {
        if self.config.collection.trim().is_empty() {
            return Err(RagError::Config("collection name must not be empty".to_string()));
        }
        if self.config.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.config.fetch_multiplier == 0 {
            return Err(RagError::Config("fetch_multiplier must be greater than zero".to_string()));
        }
        if self.config.keyword_multiplier == 0 {
            return Err(RagError::Config(
                "keyword_multiplier must be greater than zero".to_string(),
            ));
        }
        // Re-run window validation in case the chunker config was built by hand.
        ChunkerConfig::builder()
            .max_tokens(self.config.chunker.max_tokens)
            .overlap_tokens(self.config.chunker.overlap_tokens)
            .build()?;
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = EngineConfig::builder().build().unwrap();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.top_k * config.fetch_multiplier, 50);
        assert_eq!(config.collection, "documents");
    }

    #[test]
    fn zero_top_k_is_rejected() {
        assert!(EngineConfig::builder().top_k(0).build().is_err());
    }

    #[test]
    fn empty_collection_is_rejected() {
        assert!(EngineConfig::builder().collection("  ").build().is_err());
    }

    #[test]
    fn hand_built_chunker_config_is_validated() {
        let bad = ChunkerConfig { max_tokens: 10, overlap_tokens: 10, section_split_threshold: 600 };
        assert!(EngineConfig::builder().chunker(bad).build().is_err());
    }

    #[test]
    fn zero_multipliers_are_rejected() {
        assert!(EngineConfig::builder().fetch_multiplier(0).build().is_err());
        assert!(EngineConfig::builder().keyword_multiplier(0).build().is_err());
    }
}
