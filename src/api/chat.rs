//! `POST /api/chat`: answer a question over the indexed documents

use std::time::Instant;

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::api::middleware::truncate_for_log;
use crate::api::state::AppState;
use crate::api::types::{answer_status, ChatRequest, Json};
use crate::domain::rag::{AnswerError, AnswerResponse};
use crate::domain::DomainError;
use crate::infrastructure::observability::record_answer;

/// Always answers with an `AnswerResponse`; the status mirrors its error code.
///
/// A client disconnect drops this future, which cancels provider calls in flight.
#[instrument(skip_all, fields(request_id = %Uuid::new_v4()))]
pub async fn chat(State(state): State<AppState>, Json(request): Json<ChatRequest>) -> Response {
    let started = Instant::now();

    info!(
        question = %truncate_for_log(&request.question, 120),
        history_turns = request.history.len(),
        "Processing chat request"
    );

    let response = match request.validation_message() {
        Some(message) => {
            let error = AnswerError::from_domain(&DomainError::invalid_argument(&message));
            AnswerResponse::failure(message, error)
        }
        None => {
            state
                .orchestrator
                .answer(&request.question, &request.history)
                .await
        }
    };

    record_answer(
        response.outcome(),
        response.passages_retrieved,
        started.elapsed(),
    );

    let status = answer_status(response.error.as_ref().map(|e| e.code));
    (status, Json(response)).into_response()
}
