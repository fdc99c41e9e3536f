use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

/// Errors produced by the tool-prefix transport.
///
/// The transport adds exactly one failure mode of its own (reading the
/// outbound body). Everything else is the wrapped transport's error, carried
/// through untouched.
#[derive(Debug, thiserror::Error)]
pub enum TransportError<E> {
    #[error("Failed to read request body: {0}")]
    ReadBody(axum::Error),

    #[error(transparent)]
    Transport(E),
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("Failed to read request body: {0}")]
    RequestBody(axum::Error),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),
}

impl From<TransportError<reqwest::Error>> for ProxyError {
    fn from(err: TransportError<reqwest::Error>) -> Self {
        match err {
            TransportError::ReadBody(e) => ProxyError::RequestBody(e),
            TransportError::Transport(e) => ProxyError::NetworkError(e),
        }
    }
}

impl ProxyError {
    /// Convert error to Anthropic-compatible error response
    pub fn to_anthropic_response(&self) -> Response {
        let (status, error_type) = match self {
            ProxyError::RequestBody(_) => (StatusCode::BAD_REQUEST, "invalid_request_error"),
            ProxyError::NetworkError(e) if e.is_timeout() => {
                (StatusCode::GATEWAY_TIMEOUT, "api_error")
            }
            ProxyError::NetworkError(_) => (StatusCode::BAD_GATEWAY, "api_error"),
        };

        (
            status,
            Json(json!({
                "type": "error",
                "error": {
                    "type": error_type,
                    "message": self.to_string()
                }
            })),
        )
            .into_response()
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        self.to_anthropic_response()
    }
}
