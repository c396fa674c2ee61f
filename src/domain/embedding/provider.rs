//! Embedding provider trait definition

use async_trait::async_trait;
use std::fmt::Debug;

use super::EmbeddingVector;
use crate::domain::error::ProviderError;

/// Trait for embedding providers (Azure OpenAI, etc.)
#[async_trait]
pub trait EmbeddingProvider: Send + Sync + Debug {
    /// Embed a batch of texts, returning one vector per input in input order
    async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;

    /// Model (or deployment) identifier the vectors come from
    fn model(&self) -> &str;

    /// Dimensionality of every vector this provider returns
    fn dimensions(&self) -> usize;

    /// Largest batch the provider accepts in one call
    fn max_batch_size(&self) -> usize {
        16
    }
}

#[cfg(test)]
pub mod mock {
    use super::*;
    use crate::domain::error::Stage;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    /// Deterministic bag-of-words embedder; texts sharing words get similar vectors
    #[derive(Debug)]
    pub struct MockEmbeddingProvider {
        model: String,
        dimensions: usize,
        output_dimensions: Option<usize>,
        transient_failures: AtomicUsize,
        poison: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl MockEmbeddingProvider {
        pub fn new(dimensions: usize) -> Self {
            Self {
                model: "mock-embedding".to_string(),
                dimensions,
                output_dimensions: None,
                transient_failures: AtomicUsize::new(0),
                poison: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
            }
        }

        pub fn with_model(mut self, model: impl Into<String>) -> Self {
            self.model = model.into();
            self
        }

        /// Return vectors of a different size than advertised
        pub fn with_output_dimensions(mut self, dimensions: usize) -> Self {
            self.output_dimensions = Some(dimensions);
            self
        }

        /// Fail the next `n` calls with a rate limit
        pub fn with_transient_failures(self, n: usize) -> Self {
            self.transient_failures.store(n, Ordering::SeqCst);
            self
        }

        /// Reject (permanently) any batch containing a text with this marker
        pub fn with_poison(self, marker: impl Into<String>) -> Self {
            self.poison.lock().unwrap().push(marker.into());
            self
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        pub fn vectorize(&self, text: &str, dimensions: usize) -> EmbeddingVector {
            let mut vector = vec![0.0f32; dimensions];

            for token in text
                .split(|c: char| !c.is_alphanumeric())
                .filter(|t| !t.is_empty())
            {
                let token = token.to_lowercase();
                let hash = token
                    .bytes()
                    .fold(1469598103934665603u64, |acc, b| (acc ^ b as u64).wrapping_mul(1099511628211));
                vector[(hash % dimensions as u64) as usize] += 1.0;
            }

            EmbeddingVector::new(vector)
        }
    }

    #[async_trait]
    impl EmbeddingProvider for MockEmbeddingProvider {
        async fn embed(&self, texts: &[String]) -> Result<Vec<EmbeddingVector>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);

            let remaining = self.transient_failures.load(Ordering::SeqCst);
            if remaining > 0 {
                self.transient_failures.store(remaining - 1, Ordering::SeqCst);
                return Err(ProviderError::rate_limited(Stage::Embedding, "mock", "throttled"));
            }

            let poison = self.poison.lock().unwrap().clone();
            if texts.iter().any(|t| poison.iter().any(|p| t.contains(p.as_str()))) {
                return Err(ProviderError::invalid_input(
                    Stage::Embedding,
                    "mock",
                    "input rejected",
                ));
            }

            let dims = self.output_dimensions.unwrap_or(self.dimensions);
            Ok(texts.iter().map(|t| self.vectorize(t, dims)).collect())
        }

        fn provider_name(&self) -> &'static str {
            "mock"
        }

        fn model(&self) -> &str {
            &self.model
        }

        fn dimensions(&self) -> usize {
            self.dimensions
        }

        fn max_batch_size(&self) -> usize {
            4
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[tokio::test]
        async fn test_mock_provider_batch_input() {
            let provider = MockEmbeddingProvider::new(64);
            let vectors = provider
                .embed(&["Hello".to_string(), "World".to_string()])
                .await
                .unwrap();

            assert_eq!(vectors.len(), 2);
            assert_eq!(vectors[0].dimensions(), 64);
        }

        #[tokio::test]
        async fn test_shared_words_are_similar() {
            let provider = MockEmbeddingProvider::new(256);
            let vectors = provider
                .embed(&[
                    "invoice total amount".to_string(),
                    "the invoice total".to_string(),
                    "zebra migration patterns".to_string(),
                ])
                .await
                .unwrap();

            let close = vectors[0].cosine_similarity(&vectors[1]);
            let far = vectors[0].cosine_similarity(&vectors[2]);
            assert!(close > far);
        }

        #[tokio::test]
        async fn test_transient_failures_then_success() {
            let provider = MockEmbeddingProvider::new(8).with_transient_failures(1);
            let texts = vec!["a".to_string()];

            assert!(provider.embed(&texts).await.unwrap_err().is_retryable());
            assert!(provider.embed(&texts).await.is_ok());
            assert_eq!(provider.calls(), 2);
        }
    }
}
