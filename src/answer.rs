//! Question answering with citations.
//!
//! The query-time surface: retrieve context for a question, assemble a
//! prompt, ask the completion model, and return the answer together with an
//! ordered citation list (chunk id + fused score). Weak or missing context
//! is not an error — the prompt instructs the model to fall back to a
//! general best-effort answer, a deliberate design choice of the answering
//! flow rather than a failure path.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::completion::CompletionProvider;
use crate::retrieval::{RetrievalResult, Retriever};
use crate::retry::{RetryPolicy, with_retry};
use crate::types::RagError;

/// One citation backing an answer.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Citation {
    pub chunk_id: i64,
    /// Fused relevance score of the cited chunk.
    pub score: f32,
}

/// Answer plus the retrieval evidence behind it, in rank order.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub citations: Vec<Citation>,
}

/// Query-time engine combining retrieval and completion.
pub struct QueryEngine {
    retriever: Retriever,
    completion: Arc<dyn CompletionProvider>,
    retry: RetryPolicy,
    max_question_chars: usize,
}

impl QueryEngine {
    pub fn new(
        retriever: Retriever,
        completion: Arc<dyn CompletionProvider>,
        retry: RetryPolicy,
        max_question_chars: usize,
    ) -> Self {
        Self {
            retriever,
            completion,
            retry,
            max_question_chars,
        }
    }

    /// Answers `question` from the ingested corpus.
    ///
    /// The question is bounded: empty or oversized input fails with
    /// [`RagError::InvalidInput`] before any model call.
    pub async fn answer(&self, question: &str) -> Result<Answer, RagError> {
        let trimmed = question.trim();
        if trimmed.is_empty() {
            return Err(RagError::InvalidInput("question must not be empty".to_string()));
        }
        let length = trimmed.chars().count();
        if length > self.max_question_chars {
            return Err(RagError::InvalidInput(format!(
                "question length {length} exceeds the {} character limit",
                self.max_question_chars
            )));
        }

        let contexts = self.retriever.retrieve(trimmed).await?;
        tracing::debug!(context_count = contexts.len(), "retrieved context for question");

        let prompt = build_prompt(trimmed, &contexts);
        let answer = with_retry(&self.retry, "completion", || {
            self.completion.complete(&prompt)
        })
        .await?;

        let citations = contexts
            .iter()
            .map(|context| Citation {
                chunk_id: context.chunk_id,
                score: context.fused_score,
            })
            .collect();

        Ok(Answer { answer, citations })
    }
}

fn build_prompt(question: &str, contexts: &[RetrievalResult]) -> String {
    let context_text = contexts
        .iter()
        .map(|context| context.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n");

    format!(
        "System: You are a retrieval-augmented assistant.\n\
         - Ground your answer in the provided context snippets when they are relevant.\n\
         - If the context is weak or missing, still provide a safe, general best-practice answer.\n\
         - Be concise, factual, and avoid speculation beyond reasonable best practices.\n\
         - Always include a short 'Suggestions' section with 2-4 actionable follow-ups.\n\n\
         Context Snippets (may be partial):\n{context_text}\n\n\
         User Question: {question}\n\n\
         Required Output Format:\n\
         1) A direct answer paragraph.\n\
         2) A 'Suggestions:' list with 2-4 bullets.\n"
    )
}
