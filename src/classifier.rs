//! Baseline/user partition of retrieved chunks.

use serde::{Deserialize, Serialize};

use crate::document::Chunk;

/// Retrieved chunks split into the two context sets the composer prompts
/// with.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Classified {
    /// Chunks whose metadata marks them `is_default`: the reference or
    /// regulatory corpus.
    pub baseline: Vec<Chunk>,
    /// Everything else: caller-uploaded content.
    pub user: Vec<Chunk>,
}

impl Classified {
    /// Total chunks across both sets.
    pub fn len(&self) -> usize {
        self.baseline.len() + self.user.len()
    }

    /// True when both sets are empty.
    pub fn is_empty(&self) -> bool {
        self.baseline.is_empty() && self.user.is_empty()
    }
}

/// Partition chunks on the `is_default` metadata flag.
///
/// Total and disjoint: every chunk lands in exactly one set, and relative
/// order within each set is preserved. A missing flag means user content.
pub fn classify(chunks: Vec<Chunk>) -> Classified {
    let (baseline, user) = chunks.into_iter().partition(|chunk| chunk.metadata.is_default);
    Classified { baseline, user }
}
