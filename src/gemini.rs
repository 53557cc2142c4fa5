//! Gemini providers over the Generative Language REST API.
//!
//! [`GeminiEmbedder`] implements [`EmbeddingProvider`] against
//! `:embedContent` / `:batchEmbedContents`; [`GeminiGenerator`] implements
//! [`GenerationProvider`] against `:generateContent`.
//!
//! These modules are only available when the `gemini` feature is enabled.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

use crate::embedding::{EmbeddingProvider, TaskType};
use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

/// Base URL for the Generative Language API.
const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Header carrying the API key.
const API_KEY_HEADER: &str = "x-goog-api-key";

/// The default embedding model.
const DEFAULT_EMBED_MODEL: &str = "text-embedding-004";

/// Dimensionality of `text-embedding-004`.
const DEFAULT_DIMENSIONS: usize = 768;

/// The default generation model.
const DEFAULT_GENERATE_MODEL: &str = "gemini-2.0-flash";

/// Per-request transport timeout.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Transport-level retries on connect/timeout failures.
const MAX_RETRIES: u32 = 2;

/// Base delay between retries, scaled linearly per attempt.
const RETRY_DELAY: Duration = Duration::from_millis(500);

fn build_client(provider: &'static str) -> Result<reqwest::Client> {
    reqwest::Client::builder().timeout(REQUEST_TIMEOUT).build().map_err(|e| {
        RagError::Config(format!("failed to build {provider} HTTP client: {e}"))
    })
}

/// POST `body` to `url`, retrying connect/timeout errors with a linear
/// backoff. HTTP error statuses are returned to the caller unretried.
async fn post_with_retry<B: Serialize>(
    client: &reqwest::Client,
    url: &str,
    api_key: &str,
    body: &B,
) -> std::result::Result<reqwest::Response, reqwest::Error> {
    let mut attempt: u32 = 0;
    loop {
        match client.post(url).header(API_KEY_HEADER, api_key).json(body).send().await {
            Ok(response) => return Ok(response),
            Err(e) if attempt < MAX_RETRIES && (e.is_timeout() || e.is_connect()) => {
                attempt += 1;
                debug!(attempt, error = %e, "transient transport error, retrying");
                tokio::time::sleep(RETRY_DELAY * attempt).await;
            }
            Err(e) => return Err(e),
        }
    }
}

/// Extract the API's error message from a failed response body.
fn api_error_detail(body: &str) -> String {
    serde_json::from_str::<ApiErrorResponse>(body)
        .map(|e| e.error.message)
        .unwrap_or_else(|_| body.to_string())
}

/// An [`EmbeddingProvider`] backed by the Gemini embedding API.
///
/// # Configuration
///
/// - `model`: defaults to `text-embedding-004`.
/// - `api_key`: from the constructor or the `GEMINI_API_KEY` environment
///   variable.
///
/// # Example
///
/// ```rust,ignore
/// use ragcore::gemini::GeminiEmbedder;
///
/// let embedder = GeminiEmbedder::from_env()?;
/// let embedding = embedder.embed("hello world", TaskType::RetrievalQuery).await?;
/// ```
pub struct GeminiEmbedder {
    client: reqwest::Client,
    api_key: String,
    model: String,
    dimensions: usize,
}

impl GeminiEmbedder {
    /// Create a new embedder with the given API key and the default
    /// `text-embedding-004` model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Config("Gemini API key must not be empty".to_string()));
        }

        Ok(Self {
            client: build_client("Gemini")?,
            api_key,
            model: DEFAULT_EMBED_MODEL.to_string(),
            dimensions: DEFAULT_DIMENSIONS,
        })
    }

    /// Create a new embedder from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            RagError::Config("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    /// Set the embedding model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Set the dimensionality reported for the configured model.
    pub fn with_dimensions(mut self, dimensions: usize) -> Self {
        self.dimensions = dimensions;
        self
    }

    fn endpoint(&self, verb: &str) -> String {
        format!("{GEMINI_BASE_URL}/{}:{verb}", self.model)
    }

    fn embed_error(&self, message: String) -> RagError {
        RagError::Embedding { provider: "Gemini".to_string(), message }
    }
}

// ── Gemini API request/response types ──────────────────────────────

#[derive(Serialize)]
struct Content<'a> {
    parts: Vec<Part<'a>>,
}

#[derive(Serialize)]
struct Part<'a> {
    text: &'a str,
}

impl<'a> Content<'a> {
    fn text(text: &'a str) -> Self {
        Self { parts: vec![Part { text }] }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct EmbedRequest<'a> {
    model: &'a str,
    content: Content<'a>,
    task_type: TaskType,
}

#[derive(Serialize)]
struct BatchEmbedRequest<'a> {
    requests: Vec<EmbedRequest<'a>>,
}

#[derive(Deserialize)]
struct EmbedResponse {
    embedding: EmbeddingValues,
}

#[derive(Deserialize)]
struct BatchEmbedResponse {
    embeddings: Vec<EmbeddingValues>,
}

#[derive(Deserialize)]
struct EmbeddingValues {
    values: Vec<f32>,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: CandidateContent,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Deserialize)]
struct ApiErrorResponse {
    error: ApiErrorDetail,
}

#[derive(Deserialize)]
struct ApiErrorDetail {
    message: String,
}

// ── EmbeddingProvider implementation ───────────────────────────────

#[async_trait]
impl EmbeddingProvider for GeminiEmbedder {
    async fn embed(&self, text: &str, task: TaskType) -> Result<Vec<f32>> {
        if text.trim().is_empty() {
            return Err(self.embed_error("cannot embed empty text".to_string()));
        }

        debug!(provider = "Gemini", text_len = text.len(), ?task, "embedding single text");

        let model_name = format!("models/{}", self.model);
        let request = EmbedRequest { model: &model_name, content: Content::text(text), task_type: task };

        let response =
            post_with_retry(&self.client, &self.endpoint("embedContent"), &self.api_key, &request)
                .await
                .map_err(|e| {
                    error!(provider = "Gemini", error = %e, "embedding request failed");
                    self.embed_error(format!("request failed: {e}"))
                })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = "Gemini", %status, "embedding API error");
            return Err(self.embed_error(format!("API returned {status}: {}", api_error_detail(&body))));
        }

        let parsed: EmbedResponse = response.json().await.map_err(|e| {
            error!(provider = "Gemini", error = %e, "failed to parse embedding response");
            self.embed_error(format!("failed to parse response: {e}"))
        })?;

        if parsed.embedding.values.is_empty() {
            return Err(self.embed_error("API returned an empty embedding".to_string()));
        }
        Ok(parsed.embedding.values)
    }

    async fn embed_batch(&self, texts: &[&str], task: TaskType) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        debug!(provider = "Gemini", batch_size = texts.len(), ?task, "embedding batch");

        let model_name = format!("models/{}", self.model);
        let request = BatchEmbedRequest {
            requests: texts
                .iter()
                .map(|text| EmbedRequest {
                    model: &model_name,
                    content: Content::text(text),
                    task_type: task,
                })
                .collect(),
        };

        let response = post_with_retry(
            &self.client,
            &self.endpoint("batchEmbedContents"),
            &self.api_key,
            &request,
        )
        .await
        .map_err(|e| {
            error!(provider = "Gemini", error = %e, "batch embedding request failed");
            self.embed_error(format!("request failed: {e}"))
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = "Gemini", %status, "batch embedding API error");
            return Err(self.embed_error(format!("API returned {status}: {}", api_error_detail(&body))));
        }

        let parsed: BatchEmbedResponse = response.json().await.map_err(|e| {
            error!(provider = "Gemini", error = %e, "failed to parse batch response");
            self.embed_error(format!("failed to parse response: {e}"))
        })?;

        if parsed.embeddings.len() != texts.len() {
            return Err(self.embed_error(format!(
                "API returned {} embeddings for {} inputs",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        Ok(parsed.embeddings.into_iter().map(|e| e.values).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }
}

/// A [`GenerationProvider`] backed by the Gemini text generation API.
///
/// # Configuration
///
/// - `model`: defaults to `gemini-2.0-flash`.
/// - `api_key`: from the constructor or the `GEMINI_API_KEY` environment
///   variable.
pub struct GeminiGenerator {
    client: reqwest::Client,
    api_key: String,
    model: String,
}

impl GeminiGenerator {
    /// Create a new generator with the given API key and the default
    /// `gemini-2.0-flash` model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.is_empty() {
            return Err(RagError::Config("Gemini API key must not be empty".to_string()));
        }

        Ok(Self {
            client: build_client("Gemini")?,
            api_key,
            model: DEFAULT_GENERATE_MODEL.to_string(),
        })
    }

    /// Create a new generator from the `GEMINI_API_KEY` environment variable.
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("GEMINI_API_KEY").map_err(|_| {
            RagError::Config("GEMINI_API_KEY environment variable not set".to_string())
        })?;
        Self::new(api_key)
    }

    /// Set the generation model name.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    fn generate_error(&self, message: String) -> RagError {
        RagError::Generation { provider: "Gemini".to_string(), message }
    }
}

#[async_trait]
impl GenerationProvider for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        debug!(provider = "Gemini", prompt_len = prompt.len(), "generating");

        let url = format!("{GEMINI_BASE_URL}/{}:generateContent", self.model);
        let request = GenerateRequest { contents: vec![Content::text(prompt)] };

        let response =
            post_with_retry(&self.client, &url, &self.api_key, &request).await.map_err(|e| {
                error!(provider = "Gemini", error = %e, "generation request failed");
                self.generate_error(format!("request failed: {e}"))
            })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(provider = "Gemini", %status, "generation API error");
            return Err(
                self.generate_error(format!("API returned {status}: {}", api_error_detail(&body)))
            );
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            error!(provider = "Gemini", error = %e, "failed to parse generation response");
            self.generate_error(format!("failed to parse response: {e}"))
        })?;

        let text = parsed
            .candidates
            .into_iter()
            .next()
            .map(|candidate| {
                candidate.content.parts.into_iter().map(|part| part.text).collect::<String>()
            })
            .unwrap_or_default();

        if text.is_empty() {
            return Err(self.generate_error("API returned no candidates".to_string()));
        }
        Ok(text)
    }
}
