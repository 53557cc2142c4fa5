//! Error types for the `ragcore` crate.

use thiserror::Error;

/// Errors that can occur in retrieval engine operations.
#[derive(Debug, Error)]
pub enum RagError {
    /// The caller supplied empty or whitespace-only input where text is required.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// An error occurred during embedding generation.
    #[error("Embedding error ({provider}): {message}")]
    Embedding {
        /// The embedding provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// The vector store backend was unreachable or rejected the request.
    #[error("Index unavailable ({backend}): {message}")]
    IndexUnavailable {
        /// The vector store backend that produced the error.
        backend: String,
        /// A description of the failure.
        message: String,
    },

    /// A referenced record, document, or collection does not exist.
    #[error("Not found: {what}")]
    NotFound {
        /// What was looked up and missed.
        what: String,
    },

    /// A generation reply could not be parsed into the expected structure.
    #[error("Malformed response: {message}")]
    MalformedResponse {
        /// A description of what failed to parse.
        message: String,
    },

    /// An error occurred in the text generation service.
    #[error("Generation error ({provider}): {message}")]
    Generation {
        /// The generation provider that produced the error.
        provider: String,
        /// A description of the failure.
        message: String,
    },

    /// A configuration validation error.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An operation exceeded its caller-provided time bound.
    #[error("Timed out: {operation}")]
    Timeout {
        /// The operation that was aborted.
        operation: String,
    },
}

/// A convenience result type for retrieval engine operations.
pub type Result<T> = std::result::Result<T, RagError>;
