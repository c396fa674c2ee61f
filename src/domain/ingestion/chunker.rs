//! Overlapping, boundary-aware text chunking

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::DomainError;

/// Smallest unit a chunk boundary may fall on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum BoundaryMode {
    /// Any character boundary
    Character,
    /// Unicode word boundaries
    #[default]
    Word,
    /// Unicode sentence boundaries
    Sentence,
}

/// Configuration for chunking
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks
    pub overlap: usize,
    #[serde(default)]
    pub boundary_mode: BoundaryMode,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
            boundary_mode: BoundaryMode::default(),
        }
    }

    pub fn with_boundary_mode(mut self, mode: BoundaryMode) -> Self {
        self.boundary_mode = mode;
        self
    }

    pub fn validate(&self) -> Result<(), DomainError> {
        if self.chunk_size == 0 {
            return Err(DomainError::invalid_config("chunk_size must be greater than 0"));
        }

        if self.overlap >= self.chunk_size {
            return Err(DomainError::invalid_config(format!(
                "overlap ({}) must be less than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }

        Ok(())
    }
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self::new(1000, 200)
    }
}

/// A span of a document's extracted text.
///
/// `start` and `end` are byte offsets into the source text; `overlap` is the
/// number of characters shared with the previous chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk<'a> {
    pub sequence: usize,
    pub start: usize,
    pub end: usize,
    pub overlap: usize,
    pub text: &'a str,
}

impl Chunk<'_> {
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

#[derive(Debug, Clone, Copy)]
struct Bound {
    byte: usize,
    chars: usize,
}

/// Lazy chunk sequence over one text. Clone it to restart from the beginning.
#[derive(Debug, Clone)]
pub struct Chunks<'a> {
    text: &'a str,
    bounds: Arc<[Bound]>,
    chunk_size: usize,
    overlap: usize,
    next_start: Option<usize>,
    prev_end_chars: usize,
    sequence: usize,
}

/// Split `text` into overlapping chunks according to `config`
pub fn split<'a>(text: &'a str, config: &ChunkingConfig) -> Result<Chunks<'a>, DomainError> {
    config.validate()?;

    let bounds = unit_bounds(text, config.boundary_mode);

    Ok(Chunks {
        text,
        bounds: bounds.into(),
        chunk_size: config.chunk_size,
        overlap: config.overlap,
        next_start: if text.is_empty() { None } else { Some(0) },
        prev_end_chars: 0,
        sequence: 0,
    })
}

fn unit_bounds(text: &str, mode: BoundaryMode) -> Vec<Bound> {
    let starts: Vec<usize> = match mode {
        BoundaryMode::Character => text.char_indices().map(|(i, _)| i).collect(),
        BoundaryMode::Word => text.split_word_bound_indices().map(|(i, _)| i).collect(),
        BoundaryMode::Sentence => text.split_sentence_bound_indices().map(|(i, _)| i).collect(),
    };

    let mut bounds = Vec::with_capacity(starts.len() + 1);
    let mut chars = 0;
    let mut prev = 0;

    for byte in starts.into_iter().chain(std::iter::once(text.len())) {
        chars += text[prev..byte].chars().count();
        if bounds.last().is_none_or(|b: &Bound| b.byte != byte) {
            bounds.push(Bound { byte, chars });
        }
        prev = byte;
    }

    if bounds.first().is_none_or(|b| b.byte != 0) {
        bounds.insert(0, Bound { byte: 0, chars: 0 });
    }

    bounds
}

impl<'a> Iterator for Chunks<'a> {
    type Item = Chunk<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let s = self.next_start?;
        let last = self.bounds.len() - 1;

        if s >= last {
            self.next_start = None;
            return None;
        }

        let start = self.bounds[s];
        let limit = start.chars + self.chunk_size;

        // Furthest boundary within the size limit; a single oversized unit
        // is emitted whole rather than cut
        let e = (self.bounds.partition_point(|b| b.chars <= limit) - 1).max(s + 1);
        let end = self.bounds[e];

        let overlap = if self.sequence == 0 {
            0
        } else {
            self.prev_end_chars.saturating_sub(start.chars)
        };

        let chunk = Chunk {
            sequence: self.sequence,
            start: start.byte,
            end: end.byte,
            overlap,
            text: &self.text[start.byte..end.byte],
        };

        self.sequence += 1;
        self.prev_end_chars = end.chars;
        self.next_start = if e == last {
            None
        } else {
            let min_chars = end.chars.saturating_sub(self.overlap);
            Some(self.bounds.partition_point(|b| b.chars < min_chars).max(s + 1))
        };

        Some(chunk)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_covering(text: &str, chunks: &[Chunk<'_>]) {
        if text.is_empty() {
            assert!(chunks.is_empty());
            return;
        }

        assert_eq!(chunks.first().unwrap().start, 0);
        assert_eq!(chunks.last().unwrap().end, text.len());

        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(chunk.sequence, i);
            assert!(!chunk.text.is_empty());
            assert_eq!(&text[chunk.start..chunk.end], chunk.text);

            if i > 0 {
                let prev = &chunks[i - 1];
                assert!(chunk.start <= prev.end, "gap between chunk {} and {}", i - 1, i);
                assert!(chunk.start > prev.start, "chunks must advance");
            }
        }
    }

    fn sample_text() -> String {
        "The quick brown fox jumps over the lazy dog. Pack my box with five dozen liquor jugs! \
         How vexingly quick daft zebras jump? Sphinx of black quartz, judge my vow. "
            .repeat(12)
    }

    #[test]
    fn test_config_validation() {
        assert!(ChunkingConfig::new(100, 50).validate().is_ok());
        assert!(matches!(
            ChunkingConfig::new(0, 0).validate(),
            Err(DomainError::InvalidConfig { .. })
        ));
        assert!(matches!(
            ChunkingConfig::new(100, 100).validate(),
            Err(DomainError::InvalidConfig { .. })
        ));
        assert!(matches!(
            split("text", &ChunkingConfig::new(10, 20)),
            Err(DomainError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_empty_text_yields_nothing() {
        let chunks: Vec<_> = split("", &ChunkingConfig::default()).unwrap().collect();
        assert!(chunks.is_empty());
    }

    #[test]
    fn test_covers_text_for_all_modes_and_sizes() {
        let text = sample_text();

        for mode in [BoundaryMode::Character, BoundaryMode::Word, BoundaryMode::Sentence] {
            for (size, overlap) in [(1, 0), (7, 3), (40, 10), (120, 0), (500, 50), (5000, 100)] {
                let config = ChunkingConfig::new(size, overlap).with_boundary_mode(mode);
                let chunks: Vec<_> = split(&text, &config).unwrap().collect();
                assert_covering(&text, &chunks);
            }
        }
    }

    #[test]
    fn test_character_mode_respects_size_and_overlap() {
        let text = "a".repeat(2000);
        let config = ChunkingConfig::new(500, 50).with_boundary_mode(BoundaryMode::Character);
        let chunks: Vec<_> = split(&text, &config).unwrap().collect();

        assert_eq!(chunks.len(), 5);
        assert_eq!(chunks[0].overlap, 0);
        for chunk in &chunks[1..] {
            assert_eq!(chunk.overlap, 50);
        }
        for chunk in &chunks {
            assert!(chunk.char_len() <= 500);
        }
    }

    #[test]
    fn test_sentence_mode_never_splits_sentences() {
        let text = sample_text();
        let config = ChunkingConfig::new(100, 30).with_boundary_mode(BoundaryMode::Sentence);
        let sentence_starts: Vec<usize> = text
            .split_sentence_bound_indices()
            .map(|(i, _)| i)
            .chain(std::iter::once(text.len()))
            .collect();

        for chunk in split(&text, &config).unwrap() {
            assert!(sentence_starts.contains(&chunk.start));
            assert!(sentence_starts.contains(&chunk.end));
        }
    }

    #[test]
    fn test_oversized_unit_is_kept_whole() {
        let text = "supercalifragilisticexpialidocious is long";
        let config = ChunkingConfig::new(10, 2).with_boundary_mode(BoundaryMode::Word);
        let chunks: Vec<_> = split(text, &config).unwrap().collect();

        assert_eq!(chunks[0].text, "supercalifragilisticexpialidocious");
        assert_covering(text, &chunks);
    }

    #[test]
    fn test_multibyte_text() {
        let text = "Привет мир. 你好世界。 Hello world! ".repeat(10);
        let config = ChunkingConfig::new(15, 5).with_boundary_mode(BoundaryMode::Character);
        let chunks: Vec<_> = split(&text, &config).unwrap().collect();

        assert_covering(&text, &chunks);
        for chunk in &chunks {
            assert!(chunk.char_len() <= 15);
        }
    }

    #[test]
    fn test_restart_by_clone_is_deterministic() {
        let text = sample_text();
        let chunks = split(&text, &ChunkingConfig::new(80, 20)).unwrap();
        let first: Vec<_> = chunks.clone().collect();
        let second: Vec<_> = chunks.collect();
        assert_eq!(first, second);

        let again: Vec<_> = split(&text, &ChunkingConfig::new(80, 20)).unwrap().collect();
        assert_eq!(first, again);
    }
}
