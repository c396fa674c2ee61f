use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::domain::error::{ProviderError, ProviderErrorKind, Stage};

/// Transport-level failure, classified for the retry policy
#[derive(Debug, Clone, Error, PartialEq)]
#[error("{message}")]
pub struct HttpError {
    pub kind: ProviderErrorKind,
    pub status: Option<u16>,
    pub message: String,
}

impl HttpError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            status: None,
            message: message.into(),
        }
    }

    pub fn from_status(status: u16, body: &str) -> Self {
        Self {
            kind: classify_status(status),
            status: Some(status),
            message: format!("HTTP {}: {}", status, body),
        }
    }

    /// Attach the stage and provider that made the call
    pub fn into_provider(self, stage: Stage, provider: &str) -> ProviderError {
        ProviderError::new(stage, provider, self.kind, self.message)
    }
}

/// Map an HTTP status to a provider failure kind
pub fn classify_status(status: u16) -> ProviderErrorKind {
    match status {
        429 => ProviderErrorKind::RateLimited,
        408 | 500..=599 => ProviderErrorKind::Unavailable,
        401 | 403 => ProviderErrorKind::Authentication,
        404 => ProviderErrorKind::NotFound,
        415 => ProviderErrorKind::UnsupportedFormat,
        _ => ProviderErrorKind::InvalidInput,
    }
}

/// A successful (2xx) response
#[derive(Debug, Clone, Default)]
pub struct HttpResponse {
    pub status: u16,
    /// Header names are lowercased
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_lowercase()).map(String::as_str)
    }

    pub fn json<T: DeserializeOwned>(&self) -> Result<T, HttpError> {
        serde_json::from_slice(&self.body).map_err(|e| {
            HttpError::new(
                ProviderErrorKind::Malformed,
                format!("Failed to parse response: {}", e),
            )
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Trait for HTTP client operations (for mocking)
#[async_trait]
pub trait HttpClientTrait: Send + Sync + std::fmt::Debug {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, HttpError>;

    async fn post_bytes(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        content_type: &str,
        body: Bytes,
    ) -> Result<HttpResponse, HttpError>;

    async fn get(&self, url: &str, headers: Vec<(&str, &str)>) -> Result<HttpResponse, HttpError>;
}

/// Real HTTP client using reqwest
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: reqwest::Client,
}

impl HttpClient {
    pub fn new() -> Self {
        Self {
            client: reqwest::Client::new(),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Falling back to default HTTP client");
                reqwest::Client::new()
            });
        Self { client }
    }

    async fn execute(&self, request: reqwest::RequestBuilder) -> Result<HttpResponse, HttpError> {
        let response = request.send().await.map_err(transport_error)?;
        let status = response.status();

        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(HttpError::from_status(status.as_u16(), &error_body));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|v| (k.as_str().to_lowercase(), v.to_string()))
            })
            .collect();

        let body = response.bytes().await.map_err(transport_error)?;

        Ok(HttpResponse {
            status: status.as_u16(),
            headers,
            body,
        })
    }
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

fn transport_error(e: reqwest::Error) -> HttpError {
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else if e.is_decode() {
        ProviderErrorKind::Malformed
    } else {
        ProviderErrorKind::Unavailable
    };
    HttpError::new(kind, format!("Request failed: {}", e))
}

#[async_trait]
impl HttpClientTrait for HttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        body: &serde_json::Value,
    ) -> Result<serde_json::Value, HttpError> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        let response = self.execute(request.json(body)).await?;

        if response.body.is_empty() {
            return Ok(serde_json::Value::Null);
        }

        response.json()
    }

    async fn post_bytes(
        &self,
        url: &str,
        headers: Vec<(&str, &str)>,
        content_type: &str,
        body: Bytes,
    ) -> Result<HttpResponse, HttpError> {
        let mut request = self
            .client
            .post(url)
            .header(reqwest::header::CONTENT_TYPE, content_type);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        self.execute(request.body(body)).await
    }

    async fn get(&self, url: &str, headers: Vec<(&str, &str)>) -> Result<HttpResponse, HttpError> {
        let mut request = self.client.get(url);

        for (key, value) in headers {
            request = request.header(key, value);
        }

        self.execute(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[test]
    fn test_status_classification() {
        assert_eq!(classify_status(429), ProviderErrorKind::RateLimited);
        assert_eq!(classify_status(503), ProviderErrorKind::Unavailable);
        assert_eq!(classify_status(408), ProviderErrorKind::Unavailable);
        assert_eq!(classify_status(401), ProviderErrorKind::Authentication);
        assert_eq!(classify_status(404), ProviderErrorKind::NotFound);
        assert_eq!(classify_status(400), ProviderErrorKind::InvalidInput);
        assert!(classify_status(502).is_retryable());
        assert!(!classify_status(413).is_retryable());
    }

    #[tokio::test]
    async fn test_post_json_success() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/echo"))
            .and(header("api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"ok": true})))
            .mount(&server)
            .await;

        let client = HttpClient::new();
        let value = client
            .post_json(
                &format!("{}/echo", server.uri()),
                vec![("api-key", "secret")],
                &serde_json::json!({}),
            )
            .await
            .unwrap();

        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_error_status_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("slow down"))
            .mount(&server)
            .await;

        let err = HttpClient::new()
            .get(&format!("{}/anything", server.uri()), vec![])
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::RateLimited);
        assert_eq!(err.status, Some(429));
        assert!(err.message.contains("slow down"));

        let provider_err = err.into_provider(Stage::Embedding, "azure_openai");
        assert!(provider_err.is_retryable());
        assert_eq!(provider_err.stage, Stage::Embedding);
    }

    #[tokio::test]
    async fn test_timeout_is_classified() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(2)))
            .mount(&server)
            .await;

        let err = HttpClient::with_timeout(Duration::from_millis(50))
            .get(&server.uri(), vec![])
            .await
            .unwrap_err();

        assert_eq!(err.kind, ProviderErrorKind::Timeout);
    }

    #[tokio::test]
    async fn test_response_headers_are_lowercased() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(202).insert_header("Operation-Location", "http://x/op/1"),
            )
            .mount(&server)
            .await;

        let response = HttpClient::new()
            .post_bytes(&server.uri(), vec![], "application/pdf", Bytes::from_static(b"%PDF"))
            .await
            .unwrap();

        assert_eq!(response.status, 202);
        assert_eq!(response.header("Operation-Location"), Some("http://x/op/1"));
    }
}
