//! Answer composition: prompt assembly over classified context.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::classifier::Classified;
use crate::document::Metadata;
use crate::error::Result;
use crate::generation::GenerationProvider;

/// How the composed answer should read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerStyle {
    /// Roughly 200 words, conversational, bulleted highlights.
    #[default]
    Concise,
    /// Organized paragraphs, fuller obligation lists, practical next steps.
    Detailed,
}

/// A composed answer and the metadata of every chunk it drew on.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Answer {
    /// The generated answer text.
    pub text: String,
    /// Metadata of the baseline chunks, then the user chunks, in retrieval
    /// order.
    pub sources: Vec<Metadata>,
}

/// Builds the comparison prompt and drives the generation provider.
///
/// The prompt presents the baseline corpus and the user's documents as two
/// numbered sets and asks the model to compare them, flag gaps, and answer
/// the question under the requested style.
pub struct AnswerComposer {
    generator: Arc<dyn GenerationProvider>,
}

impl AnswerComposer {
    /// Create a composer over a generation provider.
    pub fn new(generator: Arc<dyn GenerationProvider>) -> Self {
        Self { generator }
    }

    /// Compose an answer to `question` from classified context.
    ///
    /// # Errors
    ///
    /// Propagates [`RagError::Generation`](crate::RagError::Generation) from
    /// the provider; the call is not retried here.
    pub async fn compose(
        &self,
        question: &str,
        context: &Classified,
        style: AnswerStyle,
    ) -> Result<Answer> {
        let prompt = build_prompt(question, context, style);
        let text = self.generator.generate(&prompt).await?.trim().to_string();

        let sources = context
            .baseline
            .iter()
            .chain(context.user.iter())
            .map(|chunk| chunk.metadata.clone())
            .collect::<Vec<_>>();

        info!(
            baseline_count = context.baseline.len(),
            user_count = context.user.len(),
            "composed answer"
        );
        Ok(Answer { text, sources })
    }
}

fn style_instructions(style: AnswerStyle) -> &'static str {
    match style {
        AnswerStyle::Concise => {
            "\
- Keep your answer within approximately 200 words.
- Write in clear, well-structured paragraphs separated by blank lines.
- Use bullet points (\"- \" or \"* \") to highlight key obligations, gaps, or next steps.
- Avoid rigid sections like 'Executive Summary'.
- Mention baseline-specific obligations where relevant (e.g., officer appointments, impact assessments, breach timelines).
- If the question asks for a definition, provide a brief definition (1-2 sentences) with 2-3 related bullet points.
- Write in a conversational, chatbot-friendly style."
        }
        AnswerStyle::Detailed => {
            "\
- Provide a more detailed answer with well-organized paragraphs.
- Include bullet point lists (up to 8-10 items) for all key obligations and recommendations.
- Use professional, clear formatting to improve readability.
- Add 3-4 practical next steps as bullet points.
- Leave one line after each paragraph and bullet point for clarity."
        }
    }
}

fn build_prompt(question: &str, context: &Classified, style: AnswerStyle) -> String {
    let baseline_context =
        context.baseline.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");
    let user_context = context.user.iter().map(|c| c.text.as_str()).collect::<Vec<_>>().join("\n");

    format!(
        "\
You are a helpful and knowledgeable compliance assistant AI.

You have two sets of documents:
1. Compliance Baseline (legislation and rules):
{baseline_context}

2. User's Company Documents:
{user_context}

Your task:
- Compare the user's company documents against the compliance baseline.
- Identify gaps, missing obligations, or inconsistencies.
- Summarize new or removed responsibilities.
- Answer the question: {question}

Formatting Guidelines:
{}

Answer:",
        style_instructions(style)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Chunk;
    use crate::error::RagError;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Records the prompt it was handed and answers with a canned string.
    struct RecordingGenerator {
        seen: Mutex<Option<String>>,
    }

    #[async_trait]
    impl GenerationProvider for RecordingGenerator {
        async fn generate(&self, prompt: &str) -> Result<String> {
            *self.seen.lock().unwrap() = Some(prompt.to_string());
            Ok("  The policy has two gaps.  ".to_string())
        }
    }

    fn context() -> Classified {
        Classified {
            baseline: vec![Chunk::new(
                "Controllers must notify within 72 hours.",
                Metadata { is_default: true, ..Metadata::for_doc("act") },
            )],
            user: vec![Chunk::new(
                "Our policy notifies within 5 days.",
                Metadata::for_doc("policy"),
            )],
        }
    }

    #[tokio::test]
    async fn prompt_carries_both_contexts_and_question() {
        let generator = Arc::new(RecordingGenerator { seen: Mutex::new(None) });
        let composer = AnswerComposer::new(generator.clone());

        composer
            .compose("Is our notification timeline compliant?", &context(), AnswerStyle::Concise)
            .await
            .unwrap();

        let prompt = generator.seen.lock().unwrap().clone().unwrap();
        assert!(prompt.contains("Controllers must notify within 72 hours."));
        assert!(prompt.contains("Our policy notifies within 5 days."));
        assert!(prompt.contains("Answer the question: Is our notification timeline compliant?"));
        assert!(prompt.contains("approximately 200 words"));
    }

    #[tokio::test]
    async fn detailed_style_swaps_the_guidelines() {
        let prompt = build_prompt("q", &context(), AnswerStyle::Detailed);
        assert!(prompt.contains("practical next steps"));
        assert!(!prompt.contains("approximately 200 words"));
    }

    #[tokio::test]
    async fn answer_is_trimmed_and_sources_ordered() {
        let generator = Arc::new(RecordingGenerator { seen: Mutex::new(None) });
        let composer = AnswerComposer::new(generator);

        let answer = composer.compose("q", &context(), AnswerStyle::Concise).await.unwrap();
        assert_eq!(answer.text, "The policy has two gaps.");
        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].doc_id.as_deref(), Some("act"), "baseline first");
        assert_eq!(answer.sources[1].doc_id.as_deref(), Some("policy"));
    }

    #[tokio::test]
    async fn generation_failure_propagates() {
        struct FailingGenerator;

        #[async_trait]
        impl GenerationProvider for FailingGenerator {
            async fn generate(&self, _prompt: &str) -> Result<String> {
                Err(RagError::Generation {
                    provider: "mock".to_string(),
                    message: "overloaded".to_string(),
                })
            }
        }

        let composer = AnswerComposer::new(Arc::new(FailingGenerator));
        let err = composer.compose("q", &context(), AnswerStyle::Concise).await.unwrap_err();
        assert!(matches!(err, RagError::Generation { .. }));
    }
}
