//! Offline embedding provider for local development

use async_trait::async_trait;
use unicode_segmentation::UnicodeSegmentation;

use crate::domain::embedding::{EmbeddingProvider, EmbeddingVector};
use crate::domain::error::ProviderError;

const PROVIDER: &str = "local";
pub const LOCAL_EMBEDDING_MODEL: &str = "local-hashing";

/// Feature-hashed bag of words, L2-normalised.
///
/// Texts sharing vocabulary land close together under cosine similarity,
/// which is enough to exercise retrieval without a network.
#[derive(Debug, Clone)]
pub struct HashingEmbeddingProvider {
    dimensions: usize,
}

impl HashingEmbeddingProvider {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    fn vectorize(&self, text: &str) -> EmbeddingVector {
        let mut vector = vec![0.0f32; self.dimensions];

        for word in text.unicode_words() {
            let word = word.to_lowercase();
            let hash = fnv1a(word.as_bytes());
            let slot = (hash % self.dimensions as u64) as usize;
            // Sign bit spreads collisions instead of stacking them
            if hash >> 63 == 0 {
                vector[slot] += 1.0;
            } else {
                vector[slot] -= 1.0;
            }
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }

        EmbeddingVector::new(vector)
    }
}

impl Default for HashingEmbeddingProvider {
    fn default() -> Self {
        Self::new(256)
    }
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(0xcbf2_9ce4_8422_2325u64, |acc, b| {
        (acc ^ *b as u64).wrapping_mul(0x0100_0000_01b3)
    })
}

#[async_trait]
impl EmbeddingProvider for HashingEmbeddingProvider {
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
        Ok(texts.iter().map(|t| self.vectorize(t)).collect())
    }

    fn provider_name(&self) -> &'static str {
        PROVIDER
    }

    fn model(&self) -> &str {
        LOCAL_EMBEDDING_MODEL
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn max_batch_size(&self) -> usize {
        64
    }
}
