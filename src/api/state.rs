//! Application state shared across handlers

use std::sync::Arc;

use crate::config::AppConfig;
use crate::domain::index::IndexStore;
use crate::domain::rag::RagOrchestrator;
use crate::infrastructure::observability::PrometheusMetrics;
use crate::infrastructure::services::IngestionService;

/// Everything the handlers need, cheap to clone
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<RagOrchestrator>,
    pub ingestion: Arc<IngestionService>,
    /// Probed by the readiness check
    pub store: Arc<dyn IndexStore>,
    pub metrics: Option<PrometheusMetrics>,
    pub config: Arc<AppConfig>,
    /// Wired with in-memory backends instead of Azure
    pub in_memory: bool,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("store", &self.store.provider_name())
            .field("metrics_enabled", &self.metrics.is_some())
            .field("in_memory", &self.in_memory)
            .finish_non_exhaustive()
    }
}
