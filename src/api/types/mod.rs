//! Request and response types of the HTTP surface

pub mod chat;
pub mod error;
pub mod ingest;
pub mod json;

pub use chat::{ChatRequest, MAX_QUESTION_CHARS};
pub use error::{answer_status, ApiError, ApiErrorDetail, ApiErrorResponse, ApiErrorType};
pub use ingest::{IngestAccepted, IngestQuery, IngestRequest};
pub use json::Json;
