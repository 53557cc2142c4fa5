//! Generation provider trait for producing text from prompts.

use async_trait::async_trait;

use crate::error::Result;

/// A provider that completes a prompt into text.
///
/// The composer and the authoring helpers drive all language-model calls
/// through this seam; nothing else in the crate talks to a generation
/// service. Implementations should bound their requests with a timeout and
/// surface failures as [`RagError::Generation`](crate::RagError::Generation).
#[async_trait]
pub trait GenerationProvider: Send + Sync {
    /// Generate a completion for `prompt`.
    async fn generate(&self, prompt: &str) -> Result<String>;
}
