//! Offline generation provider for local development

use std::collections::HashSet;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::error::ProviderError;
use crate::domain::llm::{Completion, GenerationParams, GenerationProvider, Message, MessageRole};

const PROVIDER: &str = "extractive";
const MAX_ANSWER_CHARS: usize = 400;
const NO_CONTEXT_ANSWER: &str = "I do not have enough information to answer this question.";

static PASSAGE_HEADER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\[(\d+)\] \(source: [^\n]*\)\n").unwrap());

/// Answers by quoting the context passage that best overlaps the question.
///
/// Reads the numbered context blocks from the system message and cites the
/// one it quotes, so the citation checks downstream behave as with a model.
#[derive(Debug, Clone, Default)]
pub struct ExtractiveGenerationProvider;

impl ExtractiveGenerationProvider {
    pub fn new() -> Self {
        Self
    }
}

fn context_passages(system: &str) -> Vec<(usize, &str)> {
    let headers: Vec<_> = PASSAGE_HEADER.captures_iter(system).collect();

    headers
        .iter()
        .enumerate()
        .filter_map(|(i, caps)| {
            let whole = caps.get(0)?;
            let marker = caps.get(1)?.as_str().parse().ok()?;
            let end = headers
                .get(i + 1)
                .and_then(|next| next.get(0))
                .map(|m| m.start())
                .unwrap_or(system.len());
            Some((marker, system[whole.end()..end].trim()))
        })
        .collect()
}

fn words(text: &str) -> HashSet<String> {
    text.unicode_words().map(|w| w.to_lowercase()).collect()
}

fn excerpt(text: &str) -> String {
    let mut out = String::new();
    for sentence in text.unicode_sentences() {
        if !out.is_empty() && out.len() + sentence.len() > MAX_ANSWER_CHARS {
            break;
        }
        out.push_str(sentence);
    }
    out.chars().take(MAX_ANSWER_CHARS).collect::<String>().trim().to_string()
}

#[async_trait]
impl GenerationProvider for ExtractiveGenerationProvider {
    async fn complete(
        &self,
        messages: &[Message],
        params: &GenerationParams,
    ) -> Result<Completion, ProviderError> {
        let system = messages
            .iter()
            .find(|m| m.role == MessageRole::System)
            .map(|m| m.content.as_str())
            .unwrap_or_default();
        let question = messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(|m| words(&m.content))
            .unwrap_or_default();

        let best = context_passages(system)
            .into_iter()
            .map(|(marker, text)| {
                let overlap = words(text).intersection(&question).count();
                (overlap, marker, text)
            })
            // Highest overlap, lowest marker on ties
            .max_by(|a, b| a.0.cmp(&b.0).then_with(|| b.1.cmp(&a.1)));

        let text = match best {
            Some((_, marker, passage)) => format!("{} [{}]", excerpt(passage), marker),
            None => NO_CONTEXT_ANSWER.to_string(),
        };

        Ok(Completion::new(text, params.model.clone()))
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn system_with(passages: &[(&str, &str)]) -> Message {
        let mut content = "Answer from context.\n\nContext:\n".to_string();
        for (i, (doc, text)) in passages.iter().enumerate() {
            content.push_str(&format!("[{}] (source: {}, passage 0)\n{}\n\n", i + 1, doc, text));
        }
        Message::system(content)
    }

    #[tokio::test]
    async fn test_quotes_best_matching_passage() {
        let messages = vec![
            system_with(&[
                ("weather.txt", "It rained all week in the valley."),
                ("terms.txt", "Invoices are payable within thirty days. Late fees apply."),
            ]),
            Message::user("When are invoices payable?"),
        ];

        let completion = ExtractiveGenerationProvider::new()
            .complete(&messages, &GenerationParams::new("local"))
            .await
            .unwrap();

        assert!(completion.text.starts_with("Invoices are payable within thirty days."));
        assert!(completion.text.ends_with("[2]"));
        assert_eq!(completion.model, "local");
    }

    #[tokio::test]
    async fn test_without_context_declines() {
        let messages = vec![
            Message::system("No relevant context was found for this question."),
            Message::user("Anything?"),
        ];

        let completion = ExtractiveGenerationProvider::new()
            .complete(&messages, &GenerationParams::new("local"))
            .await
            .unwrap();

        assert_eq!(completion.text, NO_CONTEXT_ANSWER);
    }

    #[test]
    fn test_context_passages_split_on_headers() {
        let message = system_with(&[("a.txt", "first\n\nstill first"), ("b.txt", "second")]);
        let passages = context_passages(&message.content);

        assert_eq!(passages, vec![(1, "first\n\nstill first"), (2, "second")]);
    }

    #[test]
    fn test_excerpt_is_bounded() {
        let long = "word ".repeat(500);
        assert!(excerpt(&long).chars().count() <= MAX_ANSWER_CHARS);
    }
}
