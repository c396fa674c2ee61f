//! Ingestion endpoints: enqueue runs, inspect jobs, remove documents

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::info;

use crate::api::state::AppState;
use crate::api::types::{ApiError, IngestAccepted, IngestQuery, IngestRequest, Json};
use crate::domain::document::DocumentId;

/// POST /api/ingest
pub async fn ingest(
    State(state): State<AppState>,
    Query(query): Query<IngestQuery>,
    Json(request): Json<IngestRequest>,
) -> Result<Response, ApiError> {
    let source = request
        .into_source()
        .map_err(|message| ApiError::bad_request(message).with_code("invalid_argument"))?;

    if query.wait {
        info!(?source, "Running ingestion synchronously");
        let report = state.ingestion.run(source).await?;
        return Ok((StatusCode::OK, Json(report)).into_response());
    }

    let job = state.ingestion.enqueue(source).await;
    info!(job_id = %job.id, "Ingestion job accepted");

    Ok((StatusCode::ACCEPTED, Json(IngestAccepted::from(&job))).into_response())
}

/// GET /api/ingest
pub async fn list_jobs(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.ingestion.list().await)
}

/// GET /api/ingest/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Response, ApiError> {
    match state.ingestion.get(&id).await {
        Some(job) => Ok(Json(job).into_response()),
        None => Err(ApiError::not_found(format!("Ingestion job '{}' not found", id))),
    }
}

#[derive(Debug, Serialize)]
pub struct DocumentDeleted {
    pub document_id: String,
    pub passages_deleted: usize,
}

/// DELETE /api/documents/{*id}
pub async fn delete_document(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<DocumentDeleted>, ApiError> {
    let document_id = DocumentId::new(id)?;
    let passages_deleted = state.ingestion.pipeline().delete_document(&document_id).await?;

    info!(document_id = %document_id, passages_deleted, "Document removed from index");

    Ok(Json(DocumentDeleted {
        document_id: document_id.to_string(),
        passages_deleted,
    }))
}
