//! Background ingestion jobs
//!
//! Jobs run on their own Tokio task, so an ingestion that has started keeps
//! going to completion even when the HTTP caller that enqueued it goes away.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{info, instrument, Instrument};

use crate::domain::error::DomainError;
use crate::domain::ingestion::{DocumentSource, IngestionReport};
use crate::infrastructure::ingestion::IngestionPipeline;

/// Ingestion job identifier: `job-{uuid}`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobId(String);

impl JobId {
    pub fn generate() -> Self {
        Self(format!("job-{}", uuid::Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for JobId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Running,
    Completed,
    /// The job's task panicked or was aborted
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: JobId,
    pub source: DocumentSource,
    pub status: JobStatus,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<IngestionReport>,
}

impl IngestionJob {
    fn new(source: DocumentSource) -> Self {
        Self {
            id: JobId::generate(),
            source,
            status: JobStatus::Running,
            created_at: Utc::now(),
            completed_at: None,
            report: None,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.status != JobStatus::Running
    }
}

type JobTable = Arc<RwLock<HashMap<JobId, IngestionJob>>>;

/// Runs ingestion jobs detached from their callers and tracks their status
#[derive(Debug, Clone)]
pub struct IngestionService {
    pipeline: Arc<IngestionPipeline>,
    jobs: JobTable,
    retention: Duration,
}

impl IngestionService {
    pub fn new(pipeline: Arc<IngestionPipeline>) -> Self {
        Self {
            pipeline,
            jobs: Arc::new(RwLock::new(HashMap::new())),
            retention: Duration::from_secs(3600),
        }
    }

    /// How long finished jobs are kept for status queries
    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn pipeline(&self) -> &Arc<IngestionPipeline> {
        &self.pipeline
    }

    /// Start a job and return immediately
    #[instrument(skip(self))]
    pub async fn enqueue(&self, source: DocumentSource) -> IngestionJob {
        let (job, _handle) = self.spawn(source).await;
        job
    }

    /// Start a job and wait for its report.
    ///
    /// Dropping the returned future does not stop the job.
    #[instrument(skip(self))]
    pub async fn run(&self, source: DocumentSource) -> Result<IngestionReport, DomainError> {
        let (job, handle) = self.spawn(source).await;

        handle.await.map_err(|e| {
            DomainError::internal(format!("Ingestion job {} did not complete: {}", job.id, e))
        })
    }

    pub async fn get(&self, id: &str) -> Option<IngestionJob> {
        self.jobs.read().await.get(&JobId(id.to_string())).cloned()
    }

    /// Jobs newest first
    pub async fn list(&self) -> Vec<IngestionJob> {
        let mut jobs: Vec<IngestionJob> = self.jobs.read().await.values().cloned().collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Drop finished jobs older than the retention period
    pub async fn cleanup_old(&self) -> usize {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.retention).unwrap_or_else(|_| chrono::Duration::hours(1));

        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, job| !job.is_finished() || job.completed_at.is_some_and(|t| t > cutoff));
        let removed = before - jobs.len();

        if removed > 0 {
            info!(removed, "Cleaned up old ingestion jobs");
        }
        removed
    }

    async fn spawn(&self, source: DocumentSource) -> (IngestionJob, JoinHandle<IngestionReport>) {
        let job = IngestionJob::new(source.clone());
        self.jobs.write().await.insert(job.id.clone(), job.clone());
        info!(job_id = %job.id, "Ingestion job started");

        let pipeline = self.pipeline.clone();
        let jobs = self.jobs.clone();
        let id = job.id.clone();
        let span = tracing::info_span!("ingestion_job", job_id = %id);

        let handle = tokio::spawn(
            async move {
                let guard = CompletionGuard {
                    jobs: jobs.clone(),
                    id: id.clone(),
                    armed: true,
                };
                let report = pipeline.ingest(source).await;
                guard.disarm();

                if let Some(job) = jobs.write().await.get_mut(&id) {
                    job.status = JobStatus::Completed;
                    job.completed_at = Some(Utc::now());
                    job.report = Some(report.clone());
                }
                info!(
                    documents = report.total_documents(),
                    failed = report.failed(),
                    "Ingestion job completed"
                );
                report
            }
            .instrument(span),
        );

        (job, handle)
    }
}

/// Marks the job failed if its task unwinds before finishing
struct CompletionGuard {
    jobs: JobTable,
    id: JobId,
    armed: bool,
}

impl CompletionGuard {
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Ok(mut jobs) = self.jobs.try_write() {
            if let Some(job) = jobs.get_mut(&self.id) {
                job.status = JobStatus::Failed;
                job.completed_at = Some(Utc::now());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::embedding::MockEmbeddingProvider;
    use crate::domain::extractor::mock::MockExtractor;
    use crate::domain::index::{IndexStore, SearchFilter};
    use crate::domain::ingestion::{ChunkingConfig, DocumentStatus};
    use crate::domain::retry::RetryPolicy;
    use crate::infrastructure::blob::InMemoryBlobStorage;
    use crate::infrastructure::index::InMemoryIndexStore;
    use crate::infrastructure::ingestion::IngestionConfig;

    fn create_test_service(store: &InMemoryIndexStore) -> IngestionService {
        let storage = InMemoryBlobStorage::new()
            .with_object("docs/a.txt", "Invoices are payable within thirty days.")
            .with_object("docs/b.txt", "Refunds are issued to the original card.");

        let pipeline = IngestionPipeline::new(
            Arc::new(storage),
            Arc::new(MockExtractor::new()),
            Arc::new(MockEmbeddingProvider::new(16)),
            Arc::new(store.clone()),
            IngestionConfig {
                chunking: ChunkingConfig::new(200, 20),
                retry: RetryPolicy::immediate(2),
                ..Default::default()
            },
        );
        IngestionService::new(Arc::new(pipeline))
    }

    async fn wait_for(service: &IngestionService, id: &JobId) -> IngestionJob {
        for _ in 0..200 {
            if let Some(job) = service.get(id.as_str()).await {
                if job.is_finished() {
                    return job;
                }
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("job {} did not finish", id);
    }

    #[tokio::test]
    async fn test_enqueue_returns_running_job() {
        let store = InMemoryIndexStore::new();
        let service = create_test_service(&store);

        let job = service.enqueue(DocumentSource::prefix("docs/")).await;
        assert!(job.id.as_str().starts_with("job-"));
        assert_eq!(job.status, JobStatus::Running);

        let finished = wait_for(&service, &job.id).await;
        assert_eq!(finished.status, JobStatus::Completed);
        assert_eq!(finished.report.unwrap().succeeded(), 2);
    }

    #[tokio::test]
    async fn test_run_waits_for_report() {
        let store = InMemoryIndexStore::new();
        let service = create_test_service(&store);

        let report = service.run(DocumentSource::key("docs/a.txt")).await.unwrap();

        assert_eq!(report.get("docs/a.txt").unwrap().status, DocumentStatus::Succeeded);
        assert_eq!(service.list().await.len(), 1);
    }

    #[tokio::test]
    async fn test_job_survives_dropped_caller() {
        let store = InMemoryIndexStore::new();
        let service = create_test_service(&store);

        // The caller gives up immediately
        let _ = tokio::time::timeout(
            Duration::ZERO,
            service.run(DocumentSource::prefix("docs/")),
        )
        .await;

        let job = service.list().await.remove(0);
        let finished = wait_for(&service, &job.id).await;

        assert_eq!(finished.status, JobStatus::Completed);
        assert!(store.count(&SearchFilter::new()).await.unwrap() >= 2);
    }

    #[tokio::test]
    async fn test_cleanup_keeps_recent_jobs() {
        let store = InMemoryIndexStore::new();
        let service = create_test_service(&store);
        service.run(DocumentSource::key("docs/a.txt")).await.unwrap();

        assert_eq!(service.cleanup_old().await, 0);

        let service = service.with_retention(Duration::ZERO);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(service.cleanup_old().await, 1);
        assert!(service.list().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_job() {
        let store = InMemoryIndexStore::new();
        assert!(create_test_service(&store).get("job-missing").await.is_none());
    }
}
