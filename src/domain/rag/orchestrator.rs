use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use super::citation::validate_citations;
use super::response::{AnswerError, AnswerResponse, Grounding};
use crate::domain::error::{ProviderError, ProviderErrorKind, Stage};
use crate::domain::index::SearchFilter;
use crate::domain::llm::{GenerationParams, GenerationProvider};
use crate::domain::prompt::{ConversationTurn, PromptAssembler};
use crate::domain::retrieval::{RetrievalResult, Retriever};
use crate::domain::retry::RetryPolicy;

const DECLINE_MESSAGE: &str =
    "I could not find information in the available documents to answer this question.";

const UNAVAILABLE_MESSAGE: &str =
    "Sorry, I could not process your question right now. Please try again later.";

/// What to do when retrieval finds nothing relevant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmptyContextPolicy {
    /// Answer with a fixed message, without calling generation
    #[default]
    Decline,
    /// Call generation with an explicit no-context instruction
    GenerateWithCaveat,
}

impl std::str::FromStr for EmptyContextPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "decline" => Ok(Self::Decline),
            "generate_with_caveat" | "generate-with-caveat" | "caveat" => {
                Ok(Self::GenerateWithCaveat)
            }
            other => Err(format!("unknown empty context policy '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RagConfig {
    pub top_k: usize,
    pub max_context_tokens: usize,
    pub empty_context_policy: EmptyContextPolicy,
    pub generation: GenerationParams,
    /// Retry content-filter rejections like transient failures
    pub retry_content_filtered: bool,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            top_k: 5,
            max_context_tokens: 3000,
            empty_context_policy: EmptyContextPolicy::default(),
            generation: GenerationParams::default(),
            retry_content_filtered: true,
        }
    }
}

/// Answers queries end to end: retrieve, assemble, generate, validate
#[derive(Debug, Clone)]
pub struct RagOrchestrator {
    retriever: Retriever,
    assembler: PromptAssembler,
    generator: Arc<dyn GenerationProvider>,
    config: RagConfig,
    retry: RetryPolicy,
}

impl RagOrchestrator {
    pub fn new(
        retriever: Retriever,
        assembler: PromptAssembler,
        generator: Arc<dyn GenerationProvider>,
        config: RagConfig,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            retriever,
            assembler,
            generator,
            config,
            retry,
        }
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    /// Answer `query`. Failures come back as an `AnswerResponse` carrying an error.
    ///
    /// Dropping the returned future cancels any in-flight provider call.
    #[instrument(skip(self, history), fields(history_turns = history.len()))]
    pub async fn answer(&self, query: &str, history: &[ConversationTurn]) -> AnswerResponse {
        let started = Instant::now();
        let mut response = self.answer_inner(query, history).await;
        response.processing_time_ms = started.elapsed().as_millis() as u64;

        info!(
            outcome = response.outcome(),
            citations = response.citations.len(),
            passages_retrieved = response.passages_retrieved,
            processing_time_ms = response.processing_time_ms,
            "Answered query"
        );

        response
    }

    async fn answer_inner(&self, query: &str, history: &[ConversationTurn]) -> AnswerResponse {
        let retrieval = match self
            .retriever
            .retrieve(query, self.config.top_k as i64, &SearchFilter::default())
            .await
        {
            Ok(result) => result,
            Err(e) => {
                error!(error = %e, "Retrieval failed");
                return AnswerResponse::failure(UNAVAILABLE_MESSAGE, AnswerError::from_domain(&e));
            }
        };

        if retrieval.is_empty() && self.config.empty_context_policy == EmptyContextPolicy::Decline
        {
            info!("No passage above the relevance threshold, declining");
            return AnswerResponse {
                answer: DECLINE_MESSAGE.to_string(),
                citations: Vec::new(),
                grounding: Grounding::InsufficientContext,
                confidence: 0.0,
                passages_retrieved: 0,
                processing_time_ms: 0,
                error: None,
            };
        }

        self.generate(query, history, &retrieval).await
    }

    /// Runs only the generation step under the retry policy; `retrieval` is
    /// computed once by the caller and reused across attempts.
    async fn generate(
        &self,
        query: &str,
        history: &[ConversationTurn],
        retrieval: &RetrievalResult,
    ) -> AnswerResponse {
        let passages_retrieved = retrieval.len();

        let prompt = match self.assembler.assemble(
            query,
            retrieval,
            history,
            self.config.max_context_tokens,
        ) {
            Ok(prompt) => prompt,
            Err(e) => {
                error!(error = %e, "Prompt assembly failed");
                let mut response =
                    AnswerResponse::failure(UNAVAILABLE_MESSAGE, AnswerError::from_domain(&e));
                response.passages_retrieved = passages_retrieved;
                return response;
            }
        };

        let retry_filtered = self.config.retry_content_filtered;
        let retryable = |e: &ProviderError| {
            e.is_retryable() || (retry_filtered && e.kind == ProviderErrorKind::ContentFiltered)
        };

        let completion = self
            .retry
            .run_if(
                Stage::Generation,
                self.generator.provider_name(),
                retryable,
                || self.generator.complete(&prompt.messages, &self.config.generation),
            )
            .await;

        let completion = match completion {
            Ok(completion) => completion,
            Err(e) => {
                warn!(error = %e, "Generation failed after retries");
                let mut response = AnswerResponse::failure(
                    UNAVAILABLE_MESSAGE,
                    AnswerError::generation_unavailable(e.to_string()),
                );
                response.passages_retrieved = passages_retrieved;
                return response;
            }
        };

        let validated = validate_citations(&completion.text, &prompt);
        if validated.stripped > 0 {
            warn!(
                stripped = validated.stripped,
                "Removed citation markers naming passages that were not supplied"
            );
        }

        let grounding = if !prompt.has_context() {
            Grounding::InsufficientContext
        } else if validated.citations.is_empty() {
            Grounding::Unverified
        } else {
            Grounding::Grounded
        };

        let confidence = match grounding {
            Grounding::Grounded => {
                validated.citations.iter().map(|c| c.score).sum::<f32>()
                    / validated.citations.len() as f32
            }
            Grounding::Unverified => {
                0.5 * prompt
                    .included
                    .iter()
                    .map(|p| p.score)
                    .fold(0.0, f32::max)
            }
            Grounding::InsufficientContext => 0.0,
        };

        AnswerResponse {
            answer: validated.text,
            citations: validated.citations,
            grounding,
            confidence: confidence.clamp(0.0, 1.0),
            passages_retrieved,
            processing_time_ms: 0,
            error: None,
        }
    }
}
