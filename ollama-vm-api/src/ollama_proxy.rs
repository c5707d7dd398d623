//! Forwarding of inference commands to the Ollama server on a VM.
//!
//! Successful responses come back either as one JSON document or as
//! newline-delimited JSON. The two are relayed differently: NDJSON is
//! streamed chunk by chunk, everything else is read fully and sent as is.

use axum::body::{Body, Bytes};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use futures_util::StreamExt;
use serde_json::{json, Value};
use std::time::Instant;

/// `http://{ip}:{port}/api/{command}`
pub fn ollama_api_url(instance_ip: &str, port: u16, command: &str) -> String {
    format!("http://{}:{}/api/{}", instance_ip, port, command)
}

/// How a successful upstream body is handed back to the caller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RelayStrategy {
    /// Forward chunks as they arrive.
    Streamed,
    /// Read the whole body, then respond.
    Buffered,
}

impl RelayStrategy {
    pub fn for_content_type(content_type: Option<&str>) -> Self {
        let Some(ct) = content_type else {
            return RelayStrategy::Buffered;
        };
        let mime = ct.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match mime.as_str() {
            "application/x-ndjson" | "application/ndjson" | "application/jsonl"
            | "text/event-stream" => RelayStrategy::Streamed,
            _ => RelayStrategy::Buffered,
        }
    }
}

/// A 2xx answer from the inference service, ready to relay.
pub struct RelayedResponse {
    pub status: StatusCode,
    pub content_type: Option<HeaderValue>,
    pub body: RelayBody,
}

pub enum RelayBody {
    Buffered(Bytes),
    Streamed(reqwest::Response),
}

impl RelayedResponse {
    pub fn strategy(&self) -> RelayStrategy {
        match self.body {
            RelayBody::Buffered(_) => RelayStrategy::Buffered,
            RelayBody::Streamed(_) => RelayStrategy::Streamed,
        }
    }
}

impl IntoResponse for RelayedResponse {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::CONTENT_TYPE,
            self.content_type
                .unwrap_or_else(|| HeaderValue::from_static("application/json")),
        );
        match self.body {
            RelayBody::Buffered(bytes) => (self.status, headers, bytes).into_response(),
            RelayBody::Streamed(upstream) => {
                let mut chunks = 0u64;
                let stream = upstream.bytes_stream().map(move |chunk| match chunk {
                    Ok(bytes) => {
                        chunks += 1;
                        tracing::trace!(chunk = chunks, size = bytes.len(), "relaying stream chunk");
                        Ok(bytes)
                    }
                    Err(e) => {
                        tracing::warn!(after_chunks = chunks, error = %e, "upstream stream broke");
                        Err(std::io::Error::other("upstream_stream_error"))
                    }
                });
                (self.status, headers, Body::from_stream(stream)).into_response()
            }
        }
    }
}

/// Why an inference call produced nothing to relay.
#[derive(Debug)]
pub enum RelayError {
    /// The server answered outside 2xx.
    Upstream { status: u16, body: Value },
    /// The request went out but no (complete) response came back.
    NoResponse(reqwest::Error),
    /// The request could not be built or sent at all.
    Setup(String),
}

impl RelayError {
    fn from_send(e: reqwest::Error) -> Self {
        if e.is_builder() {
            RelayError::Setup(e.to_string())
        } else {
            RelayError::NoResponse(e)
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            RelayError::Upstream { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::BAD_GATEWAY)
            }
            RelayError::NoResponse(_) => StatusCode::BAD_GATEWAY,
            RelayError::Setup(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Caller-facing response, naming the command that failed.
    pub fn into_response_for(self, command: &str) -> Response {
        let status = self.status_code();
        let body = match self {
            RelayError::Upstream { status, body } => json!({
                "message": format!("Ollama API error for command '{}'", command),
                "ollamaError": body,
                "ollamaStatus": status,
            }),
            RelayError::NoResponse(_) => json!({
                "message": format!(
                    "No response from Ollama for command '{}'. Ensure the instance is running and Ollama service is accessible.",
                    command
                ),
            }),
            RelayError::Setup(error) => json!({
                "message": "Error setting up request to Ollama.",
                "error": error,
            }),
        };
        (status, Json(body)).into_response()
    }
}

/// POST `payload` to `url` and classify the outcome.
pub async fn forward(
    client: &reqwest::Client,
    url: &str,
    payload: &Value,
) -> Result<RelayedResponse, RelayError> {
    let started = Instant::now();
    let upstream = client
        .post(url)
        .header(header::CONTENT_TYPE.as_str(), "application/json")
        .body(payload.to_string())
        .send()
        .await
        .map_err(|e| {
            tracing::error!(
                url,
                elapsed_ms = started.elapsed().as_millis() as u64,
                is_timeout = e.is_timeout(),
                is_connect = e.is_connect(),
                error = %e,
                "inference request failed"
            );
            RelayError::from_send(e)
        })?;

    let status = upstream.status();
    tracing::debug!(
        url,
        status = status.as_u16(),
        elapsed_ms = started.elapsed().as_millis() as u64,
        "inference response headers received"
    );

    if !status.is_success() {
        let text = upstream.text().await.unwrap_or_default();
        let body = serde_json::from_str::<Value>(&text).unwrap_or(Value::String(text));
        tracing::error!(url, status = status.as_u16(), body = %body, "inference service returned an error");
        return Err(RelayError::Upstream {
            status: status.as_u16(),
            body,
        });
    }

    let content_type = upstream
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| HeaderValue::from_str(v).ok());
    let status = StatusCode::from_u16(status.as_u16()).unwrap_or(StatusCode::OK);

    let strategy =
        RelayStrategy::for_content_type(content_type.as_ref().and_then(|v| v.to_str().ok()));
    let body = match strategy {
        RelayStrategy::Streamed => RelayBody::Streamed(upstream),
        RelayStrategy::Buffered => {
            let bytes = upstream.bytes().await.map_err(|e| {
                tracing::error!(url, error = %e, "reading inference response failed");
                RelayError::NoResponse(e)
            })?;
            RelayBody::Buffered(bytes)
        }
    };

    Ok(RelayedResponse {
        status,
        content_type,
        body,
    })
}
