//! Budgeted prompt assembly from retrieved passages

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::document::DocumentId;
use super::error::DomainError;
use super::index::PassageId;
use super::llm::{Message, MessageRole};
use super::retrieval::{RetrievalResult, RetrievedPassage};

const DEFAULT_INSTRUCTIONS: &str = "You are an assistant that answers questions about the user's private documents. \
Answer ONLY from the numbered context passages below. \
Cite every passage you rely on with its marker, for example [1] or [2]. \
If the context does not contain the answer, say that you do not have enough information to answer. \
Never invent facts or sources.";

const NO_CONTEXT_INSTRUCTION: &str = "No relevant context was found for this question. \
Tell the user that the documents do not contain the information needed, \
and do not answer from general knowledge.";

/// Rough token count: one token per four characters, rounded up
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(4)
}

/// A prior exchange in the conversation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: MessageRole,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// A passage that made it into the prompt, with its citation marker
#[derive(Debug, Clone, PartialEq)]
pub struct IncludedPassage {
    /// 1-based marker, rendered as `[n]`
    pub marker: usize,
    pub passage_id: PassageId,
    pub document_id: DocumentId,
    pub sequence: usize,
    pub page: Option<u32>,
    pub score: f32,
    pub text: String,
}

/// Messages ready for a generation provider
#[derive(Debug, Clone)]
pub struct Prompt {
    pub messages: Vec<Message>,
    pub included: Vec<IncludedPassage>,
    /// Passages left out because they did not fit
    pub dropped: usize,
    pub history_turns: usize,
    pub estimated_tokens: usize,
}

impl Prompt {
    pub fn has_context(&self) -> bool {
        !self.included.is_empty()
    }

    pub fn passage(&self, marker: usize) -> Option<&IncludedPassage> {
        self.included.iter().find(|p| p.marker == marker)
    }
}

#[derive(Debug, Clone)]
pub struct PromptAssembler {
    instructions: String,
    no_context_instruction: String,
    /// Fraction of the budget reserved at most for history
    history_share: f32,
}

impl Default for PromptAssembler {
    fn default() -> Self {
        Self {
            instructions: DEFAULT_INSTRUCTIONS.to_string(),
            no_context_instruction: NO_CONTEXT_INSTRUCTION.to_string(),
            history_share: 0.25,
        }
    }
}

impl PromptAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self
    }

    pub fn with_history_share(mut self, share: f32) -> Self {
        self.history_share = share.clamp(0.0, 1.0);
        self
    }

    /// Build a prompt that fits in `max_context_tokens`.
    ///
    /// Passages are considered in descending score order, ties broken by
    /// document then chunk sequence. A passage that does not fit is dropped
    /// whole; later, smaller passages may still be included.
    pub fn assemble(
        &self,
        query: &str,
        result: &RetrievalResult,
        history: &[ConversationTurn],
        max_context_tokens: usize,
    ) -> Result<Prompt, DomainError> {
        if max_context_tokens == 0 {
            return Err(DomainError::invalid_config("max_context_tokens must be greater than 0"));
        }

        let fixed = estimate_tokens(&self.instructions)
            + estimate_tokens(&self.no_context_instruction)
            + estimate_tokens(query);
        if fixed > max_context_tokens {
            return Err(DomainError::invalid_config(format!(
                "system instructions and query need ~{} tokens, over the budget of {}",
                fixed, max_context_tokens
            )));
        }
        let mut remaining = max_context_tokens - fixed;

        // History first, newest turn backwards, capped at its share
        let history_budget =
            ((max_context_tokens as f32 * self.history_share) as usize).min(remaining);
        let mut history_used = 0;
        let mut kept_history = 0;
        for turn in history.iter().rev() {
            let cost = estimate_tokens(&turn.content);
            if history_used + cost > history_budget {
                break;
            }
            history_used += cost;
            kept_history += 1;
        }
        remaining -= history_used;

        let mut ranked: Vec<&RetrievedPassage> = result.iter().collect();
        ranked.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then_with(|| a.passage.document_id.cmp(&b.passage.document_id))
                .then_with(|| a.passage.sequence.cmp(&b.passage.sequence))
        });

        let mut included = Vec::new();
        let mut context = String::new();
        let mut dropped = 0;

        for candidate in ranked {
            let block = render_passage(included.len() + 1, candidate);
            let cost = estimate_tokens(&block);
            if cost > remaining {
                debug!(
                    passage = %candidate.passage.id,
                    cost,
                    remaining,
                    "Passage does not fit the context budget, dropping"
                );
                dropped += 1;
                continue;
            }

            remaining -= cost;
            context.push_str(&block);
            included.push(IncludedPassage {
                marker: included.len() + 1,
                passage_id: candidate.passage.id.clone(),
                document_id: candidate.passage.document_id.clone(),
                sequence: candidate.passage.sequence,
                page: candidate.passage.page,
                score: candidate.score,
                text: candidate.passage.text.clone(),
            });
        }

        let system = if included.is_empty() {
            format!("{}\n\n{}", self.instructions, self.no_context_instruction)
        } else {
            format!("{}\n\nContext:\n{}", self.instructions, context.trim_end())
        };

        let mut messages = Vec::with_capacity(kept_history + 2);
        messages.push(Message::system(system));
        messages.extend(
            history[history.len() - kept_history..]
                .iter()
                .map(|t| Message::new(t.role, t.content.clone())),
        );
        messages.push(Message::user(query));

        Ok(Prompt {
            messages,
            included,
            dropped,
            history_turns: kept_history,
            estimated_tokens: max_context_tokens - remaining,
        })
    }
}

fn render_passage(marker: usize, passage: &RetrievedPassage) -> String {
    let p = &passage.passage;
    let page = p.page.map(|n| format!(", page {}", n)).unwrap_or_default();
    format!(
        "[{}] (source: {}, passage {}{})\n{}\n\n",
        marker, p.document_id, p.sequence, page, p.text
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::index::{DocumentVersion, IndexedPassage};
    use std::collections::BTreeMap;

    fn retrieved(doc: &str, sequence: usize, score: f32, text: &str) -> RetrievedPassage {
        let document_id = DocumentId::new(doc).unwrap();
        let version = DocumentVersion::from_string("v1");
        RetrievedPassage {
            passage: IndexedPassage {
                id: PassageId::new(&document_id, &version, sequence),
                document_id,
                version,
                sequence,
                text: text.to_string(),
                start: 0,
                end: text.len(),
                page: Some(1),
                vector: vec![1.0].into(),
                embedding_model: "m".to_string(),
                content_hash: String::new(),
                chunk_count: 1,
                metadata: BTreeMap::new(),
            },
            score,
            vector_score: score,
            keyword_score: 0.0,
        }
    }

    fn result(passages: Vec<RetrievedPassage>) -> RetrievalResult {
        RetrievalResult { passages }
    }

    #[test]
    fn test_estimate_tokens() {
        assert_eq!(estimate_tokens(""), 0);
        assert_eq!(estimate_tokens("abcd"), 1);
        assert_eq!(estimate_tokens("abcde"), 2);
    }

    #[test]
    fn test_orders_by_score_then_provenance() {
        let prompt = PromptAssembler::new()
            .assemble(
                "q",
                &result(vec![
                    retrieved("b.md", 0, 0.5, "beta"),
                    retrieved("a.md", 2, 0.5, "alpha two"),
                    retrieved("a.md", 1, 0.5, "alpha one"),
                    retrieved("c.md", 0, 0.9, "gamma"),
                ]),
                &[],
                4000,
            )
            .unwrap();

        let order: Vec<_> = prompt
            .included
            .iter()
            .map(|p| (p.document_id.as_str(), p.sequence))
            .collect();
        assert_eq!(order, vec![("c.md", 0), ("a.md", 1), ("a.md", 2), ("b.md", 0)]);
        assert_eq!(prompt.included[0].marker, 1);
        assert!(prompt.messages[0].content.contains("[1] (source: c.md, passage 0, page 1)\ngamma"));
    }

    #[test]
    fn test_overflowing_passage_is_dropped_not_cut() {
        let assembler = PromptAssembler::new();
        let long = "x".repeat(4000);
        let base = estimate_tokens(DEFAULT_INSTRUCTIONS)
            + estimate_tokens(NO_CONTEXT_INSTRUCTION)
            + estimate_tokens("q");

        let prompt = assembler
            .assemble(
                "q",
                &result(vec![
                    retrieved("a.md", 0, 0.9, &long),
                    retrieved("b.md", 0, 0.5, "short passage"),
                ]),
                &[],
                base + 100,
            )
            .unwrap();

        assert_eq!(prompt.dropped, 1);
        assert_eq!(prompt.included.len(), 1);
        assert_eq!(prompt.included[0].document_id.as_str(), "b.md");
        assert_eq!(prompt.included[0].marker, 1);
        assert!(!prompt.messages[0].content.contains(&long[..100]));
        assert!(prompt.estimated_tokens <= base + 100);
    }

    #[test]
    fn test_instructions_always_present() {
        let prompt = PromptAssembler::new()
            .assemble("q", &RetrievalResult::empty(), &[], 2000)
            .unwrap();

        assert!(!prompt.has_context());
        assert_eq!(prompt.messages.len(), 2);
        assert_eq!(prompt.messages[0].role, MessageRole::System);
        assert!(prompt.messages[0].content.contains("Answer ONLY from"));
        assert!(prompt.messages[0].content.contains("No relevant context was found"));
        assert_eq!(prompt.messages[1].content, "q");
    }

    #[test]
    fn test_budget_smaller_than_instructions_is_invalid_config() {
        let err = PromptAssembler::new()
            .assemble("q", &RetrievalResult::empty(), &[], 10)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidConfig { .. }));

        let err = PromptAssembler::new()
            .assemble("q", &RetrievalResult::empty(), &[], 0)
            .unwrap_err();
        assert!(matches!(err, DomainError::InvalidConfig { .. }));
    }

    #[test]
    fn test_keeps_most_recent_history_that_fits() {
        let history = vec![
            ConversationTurn::user("a".repeat(400)),
            ConversationTurn::assistant("b".repeat(400)),
            ConversationTurn::user("what about fees?"),
            ConversationTurn::assistant("Late invoices incur a fee [1]."),
        ];

        // 150 token history budget: the three newest turns fit, the oldest does not
        let prompt = PromptAssembler::new()
            .with_history_share(0.15)
            .assemble("and refunds?", &RetrievalResult::empty(), &history, 1000)
            .unwrap();

        assert_eq!(prompt.history_turns, 3);
        assert_eq!(prompt.messages.len(), 5);
        assert_eq!(prompt.messages[1].content, "b".repeat(400));
        assert_eq!(prompt.messages[3].role, MessageRole::Assistant);
        assert_eq!(prompt.messages[4].content, "and refunds?");
    }

    #[test]
    fn test_assembly_is_deterministic() {
        let passages = result(vec![
            retrieved("a.md", 0, 0.4, "one"),
            retrieved("b.md", 0, 0.4, "two"),
        ]);
        let assembler = PromptAssembler::new();
        let first = assembler.assemble("q", &passages, &[], 3000).unwrap();
        let second = assembler.assemble("q", &passages, &[], 3000).unwrap();

        assert_eq!(first.messages, second.messages);
        assert_eq!(first.included, second.included);
    }
}
