// Command relay: forward an inference command to a VM and refresh its activity marker
use axum::body::Bytes;
use axum::extract::State;
use axum::response::{IntoResponse, Response};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::sync::Arc;

use ollama_vm_common::{activity, ExecuteCommandRequest};
use ollama_vm_providers::{CloudProvider, ProviderError};

use super::{non_blank, parse_json_body};
use crate::app::AppState;
use crate::error::ApiError;
use crate::ollama_proxy;

/// Validated relay target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandTarget {
    pub instance_ip: String,
    pub instance_name: String,
    pub zone: String,
    pub command: String,
}

impl CommandTarget {
    /// Checks the required fields in order and names the first one missing.
    pub fn from_request(req: ExecuteCommandRequest) -> Result<(Self, Value), ApiError> {
        let Some(instance_ip) = non_blank(req.instance_ip) else {
            return Err(missing("Missing required field: instanceIp."));
        };
        let Some(instance_name) = non_blank(req.instance_name) else {
            return Err(missing(
                "Missing required field: instanceName (for metadata update).",
            ));
        };
        let Some(zone) = non_blank(req.zone) else {
            return Err(missing("Missing required field: zone (for metadata update)."));
        };
        let Some(command) = non_blank(req.ollama_command) else {
            return Err(missing("Missing required field: ollamaCommand"));
        };
        let payload = match req.command_payload {
            None | Some(Value::Null) => Value::Object(Default::default()),
            Some(v) => v,
        };
        Ok((
            Self {
                instance_ip,
                instance_name,
                zone,
                command,
            },
            payload,
        ))
    }
}

fn missing(message: &str) -> ApiError {
    tracing::warn!("{}", message);
    ApiError::MissingField(message.to_string())
}

/// Re-read the instance fingerprint and write a fresh `last-activity-timestamp`.
///
/// A concurrent writer can make the fingerprint stale between the two calls;
/// the provider then rejects the write and the error is returned like any other.
pub async fn record_activity(
    provider: &dyn CloudProvider,
    project: &str,
    zone: &str,
    instance_name: &str,
) -> Result<DateTime<Utc>, ProviderError> {
    let details = provider.get_instance(project, zone, instance_name).await?;
    let (metadata, stamp) = activity::touch(&details.metadata, Utc::now());
    provider
        .set_metadata(project, zone, instance_name, &metadata)
        .await?;
    Ok(stamp)
}

/// POST /executeOllamaCommand - Relay an inference command to a VM
#[utoipa::path(
    post,
    path = "/executeOllamaCommand",
    tag = "ollama-vm",
    request_body = ExecuteCommandRequest,
    responses(
        (status = 200, description = "Inference response relayed verbatim (JSON or NDJSON stream)", body = serde_json::Value),
        (status = 400, description = "Missing required field", body = serde_json::Value),
        (status = 502, description = "Inference service unreachable", body = serde_json::Value),
        (status = 500, description = "Configuration error or request setup failure", body = serde_json::Value)
    )
)]
pub async fn execute_ollama_command(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let settings = &state.settings;
    let project = settings.require_project()?;
    let req: ExecuteCommandRequest = parse_json_body(&body)?;
    let (target, payload) = CommandTarget::from_request(req)?;

    let url = ollama_proxy::ollama_api_url(&target.instance_ip, settings.ollama_port, &target.command);
    tracing::info!(
        command = %target.command,
        instance = %target.instance_name,
        zone = %target.zone,
        ip = %target.instance_ip,
        "sending command to Ollama"
    );
    tracing::debug!(payload = %payload, "command payload");

    let relayed = match ollama_proxy::forward(&state.ollama_client, &url, &payload).await {
        Ok(r) => r,
        // No activity is recorded for failed commands.
        Err(e) => return Ok(e.into_response_for(&target.command)),
    };
    tracing::info!(
        command = %target.command,
        instance = %target.instance_name,
        strategy = ?relayed.strategy(),
        "received response from Ollama"
    );

    // Best effort: the inference result goes back to the caller regardless.
    match record_activity(state.provider.as_ref(), project, &target.zone, &target.instance_name).await {
        Ok(stamp) => tracing::info!(
            instance = %target.instance_name,
            timestamp = %activity::format_timestamp(stamp),
            "updated last-activity-timestamp"
        ),
        Err(e) => tracing::error!(
            instance = %target.instance_name,
            error = %e,
            "failed to update last-activity-timestamp"
        ),
    }

    Ok(relayed.into_response())
}
