use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use ollama_vm_providers::ProviderError;
use serde_json::json;
use thiserror::Error;

/// Failures a handler reports to its caller. Each variant owns one status
/// class; bodies are always JSON with a `message`.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Required server configuration is missing. Raised before any external call.
    #[error("Server configuration error: {0}")]
    Config(String),

    /// A required request field is absent. The message names the field.
    #[error("{0}")]
    MissingField(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{message}")]
    NotFound {
        message: String,
        details: Option<String>,
    },

    /// A primary provider call failed.
    #[error("{message}: {source}")]
    Provider {
        message: String,
        #[source]
        source: ProviderError,
    },
}

impl ApiError {
    pub fn provider(message: impl Into<String>, source: ProviderError) -> Self {
        ApiError::Provider {
            message: message.into(),
            source,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::Config(_) | ApiError::Provider { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::MissingField(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = match &self {
            ApiError::NotFound {
                message,
                details: Some(details),
            } => json!({ "message": message, "details": details }),
            ApiError::Provider { message, source } => {
                json!({ "message": message, "error": source.to_string() })
            }
            other => json!({ "message": other.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}
