//! Embedding provider trait for generating vector embeddings from text.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;

/// What an embedding will be used for.
///
/// Asymmetric retrieval models embed corpus text and query text differently;
/// providers that do not distinguish ignore the hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskType {
    /// Text being indexed into a collection.
    #[serde(rename = "RETRIEVAL_DOCUMENT")]
    RetrievalDocument,
    /// A search query against the collection.
    #[serde(rename = "RETRIEVAL_QUERY")]
    RetrievalQuery,
}

/// A provider that generates vector embeddings from text input.
///
/// Implementations wrap specific embedding backends behind a unified async
/// interface. The default [`embed_batch`](EmbeddingProvider::embed_batch)
/// implementation calls [`embed`](EmbeddingProvider::embed) sequentially;
/// backends that support native batching should override it.
///
/// Implementations must fail with [`RagError::Embedding`](crate::RagError::Embedding)
/// on empty input rather than return a zero-length vector; the index never
/// stores a record without a real embedding.
///
/// # Example
///
/// ```rust,ignore
/// use ragcore::{EmbeddingProvider, TaskType};
///
/// let provider = MyEmbeddingProvider::new();
/// let embedding = provider.embed("hello world", TaskType::RetrievalQuery).await?;
/// assert_eq!(embedding.len(), provider.dimensions());
/// ```
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Generate an embedding vector for a single text input.
    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>>;

    /// Generate embedding vectors for a batch of text inputs.
    ///
    /// The default implementation calls [`embed`](EmbeddingProvider::embed)
    /// sequentially for each input. Override this method if the backend
    /// supports native batch embedding for better throughput.
    async fn embed_batch(&self, texts: &[&str], task: TaskType) -> Result<Vec<Vec<f32>>> {
        let mut results = Vec::with_capacity(texts.len());
        for text in texts {
            results.push(self.embed(text, task).await?);
        }
        Ok(results)
    }

    /// Return the dimensionality of embeddings produced by this provider.
    fn dimensions(&self) -> usize;
}
