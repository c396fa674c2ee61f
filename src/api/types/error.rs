//! JSON error bodies of the HTTP surface

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::domain::rag::AnswerErrorCode;
use crate::domain::DomainError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiErrorType {
    InvalidRequestError,
    NotFoundError,
    ServerError,
    ServiceUnavailableError,
}

impl std::fmt::Display for ApiErrorType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidRequestError => write!(f, "invalid_request_error"),
            Self::NotFoundError => write!(f, "not_found_error"),
            Self::ServerError => write!(f, "server_error"),
            Self::ServiceUnavailableError => write!(f, "service_unavailable_error"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: ApiErrorType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub param: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// API error with status code
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub response: ApiErrorResponse,
}

impl ApiError {
    pub fn new(status: StatusCode, error_type: ApiErrorType, message: impl Into<String>) -> Self {
        Self {
            status,
            response: ApiErrorResponse {
                error: ApiErrorDetail {
                    message: message.into(),
                    error_type,
                    param: None,
                    code: None,
                },
            },
        }
    }

    pub fn with_param(mut self, param: impl Into<String>) -> Self {
        self.response.error.param = Some(param.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.response.error.code = Some(code.into());
        self
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ApiErrorType::InvalidRequestError, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ApiErrorType::NotFoundError, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ApiErrorType::ServerError, message)
    }

    pub fn unavailable(message: impl Into<String>) -> Self {
        Self::new(
            StatusCode::SERVICE_UNAVAILABLE,
            ApiErrorType::ServiceUnavailableError,
            message,
        )
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.response)).into_response()
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        let message = err.to_string();
        match &err {
            DomainError::InvalidArgument { .. } => {
                Self::bad_request(message).with_code("invalid_argument")
            }
            DomainError::NotFound { .. } => Self::not_found(message),
            DomainError::Provider(e) if e.is_retryable() => {
                Self::unavailable(message).with_code(e.kind.as_str())
            }
            DomainError::Provider(e) => Self::internal(message).with_code(e.kind.as_str()),
            DomainError::Configuration { .. }
            | DomainError::MissingConfiguration { .. }
            | DomainError::InvalidConfig { .. } => {
                Self::internal(message).with_code("configuration")
            }
            DomainError::DimensionMismatch { .. } | DomainError::Internal { .. } => {
                Self::internal(message)
            }
        }
    }
}

/// HTTP status for a chat answer carrying `code`
pub fn answer_status(code: Option<AnswerErrorCode>) -> StatusCode {
    match code {
        None => StatusCode::OK,
        Some(AnswerErrorCode::InvalidArgument) => StatusCode::BAD_REQUEST,
        Some(AnswerErrorCode::RetrievalUnavailable | AnswerErrorCode::GenerationUnavailable) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        Some(AnswerErrorCode::Configuration | AnswerErrorCode::Internal) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}: {}",
            self.response.error.error_type, self.response.error.message
        )
    }
}

impl std::error::Error for ApiError {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::{ProviderError, Stage};

    #[test]
    fn test_api_error_with_param() {
        let err = ApiError::bad_request("Invalid value")
            .with_param("keys")
            .with_code("invalid_argument");

        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.response.error.param, Some("keys".to_string()));
        assert_eq!(err.response.error.code, Some("invalid_argument".to_string()));
    }

    #[test]
    fn test_domain_error_conversion() {
        let api_err: ApiError = DomainError::not_found("job-1").into();
        assert_eq!(api_err.status, StatusCode::NOT_FOUND);

        let api_err: ApiError = DomainError::from(ProviderError::rate_limited(
            Stage::Search,
            "azure_search",
            "throttled",
        ))
        .into();
        assert_eq!(api_err.status, StatusCode::SERVICE_UNAVAILABLE);

        let api_err: ApiError = DomainError::missing_configuration(vec!["A".to_string()]).into();
        assert_eq!(api_err.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(api_err.response.error.code.as_deref(), Some("configuration"));
    }

    #[test]
    fn test_answer_status() {
        assert_eq!(answer_status(None), StatusCode::OK);
        assert_eq!(
            answer_status(Some(AnswerErrorCode::InvalidArgument)),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            answer_status(Some(AnswerErrorCode::GenerationUnavailable)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            answer_status(Some(AnswerErrorCode::RetrievalUnavailable)),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            answer_status(Some(AnswerErrorCode::Internal)),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_error_serialization() {
        let err = ApiError::unavailable("search down");
        let json = serde_json::to_string(&err.response).unwrap();

        assert!(json.contains("\"type\":\"service_unavailable_error\""));
        assert!(json.contains("search down"));
    }
}
