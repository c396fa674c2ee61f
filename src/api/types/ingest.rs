use serde::{Deserialize, Serialize};

use crate::domain::ingestion::DocumentSource;
use crate::infrastructure::services::{IngestionJob, JobStatus};

/// Body of `POST /api/ingest`: a prefix or an explicit key list
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestRequest {
    #[serde(default)]
    pub prefix: Option<String>,
    #[serde(default)]
    pub keys: Option<Vec<String>>,
}

impl IngestRequest {
    pub fn into_source(self) -> Result<DocumentSource, String> {
        match (self.prefix, self.keys) {
            (Some(_), Some(_)) => Err("specify either 'prefix' or 'keys', not both".to_string()),
            (Some(prefix), None) => Ok(DocumentSource::Prefix(prefix)),
            (None, Some(keys)) if keys.is_empty() => Err("'keys' cannot be empty".to_string()),
            (None, Some(keys)) => Ok(DocumentSource::Keys(keys)),
            (None, None) => Err("one of 'prefix' or 'keys' is required".to_string()),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestQuery {
    /// Block until the run finishes and return its report
    #[serde(default)]
    pub wait: bool,
}

/// `202 Accepted` body for an enqueued ingestion
#[derive(Debug, Clone, Serialize)]
pub struct IngestAccepted {
    pub job_id: String,
    pub status: JobStatus,
    pub status_url: String,
}

impl From<&IngestionJob> for IngestAccepted {
    fn from(job: &IngestionJob) -> Self {
        Self {
            job_id: job.id.to_string(),
            status: job.status,
            status_url: format!("/api/ingest/{}", job.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_source() {
        let request: IngestRequest = serde_json::from_str(r#"{"prefix": "invoices/"}"#).unwrap();
        assert_eq!(
            request.into_source().unwrap(),
            DocumentSource::Prefix("invoices/".to_string())
        );
    }

    #[test]
    fn test_keys_source() {
        let request: IngestRequest = serde_json::from_str(r#"{"keys": ["a.txt"]}"#).unwrap();
        assert_eq!(request.into_source().unwrap(), DocumentSource::key("a.txt"));
    }

    #[test]
    fn test_invalid_sources() {
        assert!(IngestRequest::default().into_source().is_err());

        let both = IngestRequest {
            prefix: Some("p".to_string()),
            keys: Some(vec!["k".to_string()]),
        };
        assert!(both.into_source().is_err());

        let empty = IngestRequest {
            prefix: None,
            keys: Some(Vec::new()),
        };
        assert!(empty.into_source().is_err());
    }
}
