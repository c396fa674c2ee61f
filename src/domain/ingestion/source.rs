use serde::{Deserialize, Serialize};

/// Which stored documents an ingestion run covers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentSource {
    /// Every key under a storage prefix
    Prefix(String),
    /// An explicit list of keys
    Keys(Vec<String>),
}

impl DocumentSource {
    pub fn prefix(prefix: impl Into<String>) -> Self {
        Self::Prefix(prefix.into())
    }

    pub fn key(key: impl Into<String>) -> Self {
        Self::Keys(vec![key.into()])
    }
}
