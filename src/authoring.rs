//! AI-assisted authoring: drafting documents, suggesting tags, summarizing.
//!
//! These helpers wrap the generation provider with prompts that demand
//! structured output, then parse defensively: models wrap JSON in Markdown
//! fences, add prose around lists, and occasionally return garbage. Drafting
//! is strict (garbage is an error); tag parsing always salvages something.

use std::sync::Arc;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{RagError, Result};
use crate::generation::GenerationProvider;

static JSON_ARRAY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?s)\[.*\]").expect("array pattern"));

/// A model-drafted document ready for review and ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratedDocument {
    /// Proposed title.
    pub title: String,
    /// Full body text.
    pub content: String,
    /// Proposed labels.
    pub tags: Vec<String>,
}

/// Drafting, tagging, and summarization over a generation provider.
pub struct DocumentAuthor {
    generator: Arc<dyn GenerationProvider>,
}

impl DocumentAuthor {
    /// Create an author over a generation provider.
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }

    /// Draft a document from a free-text prompt.
    ///
    /// The model is instructed to reply with a strict JSON object carrying
    /// `title`, `content`, and `tags`. Markdown code fences around the JSON
    /// are stripped before parsing.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::MalformedResponse`] when the reply is not valid
    /// JSON or lacks a required field, and [`RagError::EmptyInput`] for an
    /// empty prompt.
    pub async fn draft_document(&self, prompt: &str) -> Result<GeneratedDocument> {
        if prompt.trim().is_empty() {
            return Err(RagError::EmptyInput("empty drafting prompt".to_string()));
        }

        let full_prompt = format!(
            "You are a compliance assistant. Generate a compliance document in JSON format \
             with the following structure:\n\n\
             {{\n  \"title\": \"...\",\n  \"content\": \"...\",\n  \"tags\": [\"...\", \"...\", \"...\"]\n}}\n\n\
             Prompt: {prompt}"
        );

        let raw = self.generator.generate(&full_prompt).await?;
        let cleaned = strip_code_fences(&raw);
        let document: GeneratedDocument = serde_json::from_str(cleaned).map_err(|e| {
            RagError::MalformedResponse { message: format!("draft is not valid JSON: {e}") }
        })?;

        info!(title = %document.title, tag_count = document.tags.len(), "drafted document");
        Ok(document)
    }

    /// Suggest 3 to 5 tags for `content`.
    ///
    /// Extracts the first JSON array in the reply; when none parses, falls
    /// back to splitting the reply on commas. Weird model output therefore
    /// degrades to weird tags, not an error.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for empty content; provider failures
    /// propagate.
    pub async fn suggest_tags(&self, content: &str) -> Result<Vec<String>> {
        if content.trim().is_empty() {
            return Err(RagError::EmptyInput("no content to tag".to_string()));
        }

        let prompt = format!(
            "Suggest 3 to 5 relevant tags for this compliance document as a pure JSON list \
             of strings with no explanations:\n\n{content}"
        );
        let raw = self.generator.generate(&prompt).await?;
        Ok(parse_tags(&raw))
    }

    /// Summarize `content` in a few short paragraphs.
    ///
    /// Sentence breaks in the reply are expanded to blank lines so each
    /// sentence reads as its own paragraph.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::EmptyInput`] for empty content; provider failures
    /// propagate.
    pub async fn summarize(&self, content: &str) -> Result<String> {
        if content.trim().is_empty() {
            return Err(RagError::EmptyInput("no content to summarize".to_string()));
        }

        let prompt = format!(
            "Summarize the following compliance document in 3-5 lines, with each line as \
             its own paragraph:\n\n{content}"
        );
        let raw = self.generator.generate(&prompt).await?;
        Ok(raw.trim().replace(". ", ".\n\n"))
    }
}

/// Strip a surrounding Markdown code fence, with or without a `json` tag.
fn strip_code_fences(raw: &str) -> &str {
    let trimmed = raw.trim();
    let opened = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .unwrap_or(trimmed);
    opened.strip_suffix("```").unwrap_or(opened).trim()
}

/// First JSON string array in `text`, else comma-split salvage.
fn parse_tags(text: &str) -> Vec<String> {
    if let Some(found) = JSON_ARRAY.find(text) {
        if let Ok(tags) = serde_json::from_str::<Vec<String>>(found.as_str()) {
            return tags;
        }
    }
    text.split(',').map(|t| t.trim().to_string()).filter(|t| !t.is_empty()).collect()
}
