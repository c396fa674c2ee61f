//! Conservative citation validation.
//!
//! Only `[n]` markers naming a passage that was actually supplied survive;
//! any other marker is removed from the answer text.

use once_cell::sync::Lazy;
use regex::Regex;

use super::Citation;
use crate::domain::prompt::Prompt;

static MARKER_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s?\[(\d+)\]").unwrap());

const SNIPPET_CHARS: usize = 200;

#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedAnswer {
    pub text: String,
    /// In order of first appearance, without duplicates
    pub citations: Vec<Citation>,
    /// Markers removed because they named no supplied passage
    pub stripped: usize,
}

pub fn validate_citations(answer: &str, prompt: &Prompt) -> ValidatedAnswer {
    let mut citations: Vec<Citation> = Vec::new();
    let mut stripped = 0;

    let text = MARKER_PATTERN.replace_all(answer, |caps: &regex::Captures<'_>| {
        let included = caps[1]
            .parse::<usize>()
            .ok()
            .and_then(|n| prompt.passage(n));

        match included {
            Some(p) => {
                if !citations.iter().any(|c| c.marker == p.marker) {
                    citations.push(Citation {
                        marker: p.marker,
                        passage_id: p.passage_id.to_string(),
                        document_id: p.document_id.to_string(),
                        chunk_sequence: p.sequence,
                        page: p.page,
                        score: p.score,
                        snippet: snippet(&p.text),
                    });
                }
                caps[0].to_string()
            }
            None => {
                stripped += 1;
                String::new()
            }
        }
    });

    ValidatedAnswer {
        text: text.trim().to_string(),
        citations,
        stripped,
    }
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim();
    match trimmed.char_indices().nth(SNIPPET_CHARS) {
        Some((idx, _)) => format!("{}...", &trimmed[..idx]),
        None => trimmed.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::document::DocumentId;
    use crate::domain::index::PassageId;
    use crate::domain::prompt::IncludedPassage;

    fn prompt_with(markers: usize) -> Prompt {
        Prompt {
            messages: Vec::new(),
            included: (1..=markers)
                .map(|n| IncludedPassage {
                    marker: n,
                    passage_id: PassageId::from_string(format!("p{}", n)),
                    document_id: DocumentId::new(format!("doc{}.pdf", n)).unwrap(),
                    sequence: n - 1,
                    page: Some(n as u32),
                    score: 0.8,
                    text: format!("passage text {}", n),
                })
                .collect(),
            dropped: 0,
            history_turns: 0,
            estimated_tokens: 0,
        }
    }

    #[test]
    fn test_keeps_supplied_markers_in_order() {
        let prompt = prompt_with(3);
        let validated = validate_citations("Fees apply [2]. Invoices are due [1] and [2].", &prompt);

        let markers: Vec<_> = validated.citations.iter().map(|c| c.marker).collect();
        assert_eq!(markers, vec![2, 1]);
        assert_eq!(validated.citations[0].document_id, "doc2.pdf");
        assert_eq!(validated.stripped, 0);
    }

    #[test]
    fn test_strips_unknown_markers() {
        let prompt = prompt_with(2);
        let validated = validate_citations("Per the policy [7], fees apply [1]. See [0].", &prompt);

        assert_eq!(validated.text, "Per the policy, fees apply [1]. See.");
        assert_eq!(validated.citations.len(), 1);
        assert_eq!(validated.stripped, 2);
    }

    #[test]
    fn test_no_markers_means_no_citations() {
        let validated = validate_citations("I do not know.", &prompt_with(2));
        assert!(validated.citations.is_empty());
        assert_eq!(validated.text, "I do not know.");
    }

    #[test]
    fn test_snippet_is_bounded() {
        let long = "y".repeat(500);
        let s = snippet(&long);
        assert_eq!(s.chars().count(), SNIPPET_CHARS + 3);
    }
}
