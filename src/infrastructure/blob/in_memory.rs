//! In-memory blob storage, used for tests and local runs

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::RwLock;

use crate::domain::blob::StorageProvider;
use crate::domain::error::{ProviderError, ProviderErrorKind, Stage};

#[derive(Debug, Clone, Default)]
pub struct InMemoryBlobStorage {
    objects: Arc<RwLock<BTreeMap<String, Bytes>>>,
}

impl InMemoryBlobStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert; only usable before the storage is shared
    pub fn with_object(self, key: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        if let Ok(mut objects) = self.objects.try_write() {
            objects.insert(key.into(), bytes.into());
        }
        self
    }

    pub async fn put(&self, key: impl Into<String>, bytes: impl Into<Bytes>) {
        self.objects.write().await.insert(key.into(), bytes.into());
    }

    pub async fn remove(&self, key: &str) -> bool {
        self.objects.write().await.remove(key).is_some()
    }

    /// Copy every file under `root` in, keyed by its `/`-separated relative path.
    /// Returns the number of files loaded.
    pub async fn load_dir(&self, root: &Path) -> std::io::Result<usize> {
        let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];
        let mut loaded = 0;

        while let Some(dir) = pending.pop() {
            let mut entries = tokio::fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let path = entry.path();
                if entry.file_type().await?.is_dir() {
                    pending.push(path);
                    continue;
                }

                let Ok(relative) = path.strip_prefix(root) else {
                    continue;
                };
                let key = relative
                    .components()
                    .map(|c| c.as_os_str().to_string_lossy())
                    .collect::<Vec<_>>()
                    .join("/");
                let bytes = tokio::fs::read(&path).await?;
                self.put(key, bytes).await;
                loaded += 1;
            }
        }

        Ok(loaded)
    }
}

#[async_trait]
impl StorageProvider for InMemoryBlobStorage {
    async fn fetch(&self, key: &str) -> Result<Bytes, ProviderError> {
        self.objects.read().await.get(key).cloned().ok_or_else(|| {
            ProviderError::new(
                Stage::Fetch,
                "in_memory",
                ProviderErrorKind::NotFound,
                format!("Object '{}' not found", key),
            )
        })
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>, ProviderError> {
        Ok(self
            .objects
            .read()
            .await
            .range(prefix.to_string()..)
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| key.clone())
            .collect())
    }

    fn provider_name(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_load_dir_uses_relative_keys() {
        let root = std::env::temp_dir().join(format!("blob-load-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(root.join("policies")).unwrap();
        std::fs::write(root.join("readme.txt"), "top").unwrap();
        std::fs::write(root.join("policies").join("refunds.md"), "nested").unwrap();

        let storage = InMemoryBlobStorage::new();
        let loaded = storage.load_dir(&root).await.unwrap();
        std::fs::remove_dir_all(&root).unwrap();

        assert_eq!(loaded, 2);
        assert_eq!(
            storage.list("").await.unwrap(),
            vec!["policies/refunds.md".to_string(), "readme.txt".to_string()]
        );
        assert_eq!(storage.fetch("policies/refunds.md").await.unwrap(), Bytes::from("nested"));
    }

    #[tokio::test]
    async fn test_list_by_prefix() {
        let storage = InMemoryBlobStorage::new()
            .with_object("invoices/b.pdf", "b")
            .with_object("invoices/a.pdf", "a")
            .with_object("notes.txt", "n");

        assert_eq!(
            storage.list("invoices/").await.unwrap(),
            vec!["invoices/a.pdf", "invoices/b.pdf"]
        );
        assert_eq!(storage.list("").await.unwrap().len(), 3);
        assert!(storage.list("missing/").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_missing_is_not_found() {
        let storage = InMemoryBlobStorage::new();
        storage.put("a.txt", "hello").await;

        assert_eq!(storage.fetch("a.txt").await.unwrap(), Bytes::from("hello"));

        let err = storage.fetch("b.txt").await.unwrap_err();
        assert_eq!(err.kind, ProviderErrorKind::NotFound);
        assert_eq!(err.stage, Stage::Fetch);
    }
}
