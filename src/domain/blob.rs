//! Source document storage contract

use async_trait::async_trait;
use bytes::Bytes;

use super::error::ProviderError;

#[cfg(test)]
use mockall::automock;

/// Read access to the container holding source documents
#[cfg_attr(test, automock)]
#[async_trait]
pub trait StorageProvider: Send + Sync {
    /// Download the raw bytes stored under `key`
    async fn fetch(&self, key: &str) -> Result<Bytes, ProviderError>;

    /// List every key starting with `prefix`, in lexicographic order
    async fn list(&self, prefix: &str) -> Result<Vec<String>, ProviderError>;

    /// Get the provider name
    fn provider_name(&self) -> &'static str;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{ProviderErrorKind, Stage};

    #[tokio::test]
    async fn test_mock_storage_provider() {
        let mut mock = MockStorageProvider::new();
        mock.expect_list()
            .returning(|_| Ok(vec!["a.txt".to_string()]));
        mock.expect_fetch()
            .withf(|key| key == "a.txt")
            .returning(|_| Ok(Bytes::from_static(b"hello")));
        mock.expect_fetch()
            .withf(|key| key != "a.txt")
            .returning(|key| Err(ProviderError::new(
                Stage::Fetch,
                "mock",
                ProviderErrorKind::NotFound,
                format!("{} not found", key),
            )));

        assert_eq!(mock.list("").await.unwrap(), vec!["a.txt"]);
        assert_eq!(mock.fetch("a.txt").await.unwrap(), Bytes::from_static(b"hello"));
        assert!(mock.fetch("missing").await.is_err());
    }
}
