// Instance handlers: provisioning and status
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use std::sync::Arc;

use ollama_vm_common::activity::format_timestamp;
use ollama_vm_common::{
    external_ip, instance_name, startup_script, CreateInstanceRequest, CreateInstanceResponse,
    InstanceStatus, InstanceStatusParams, InstanceStatusResponse, Metadata, MetadataItem,
    EXTERNAL_IP_PENDING, LAST_ACTIVITY_TIMESTAMP_KEY, STARTUP_SCRIPT_KEY, STARTUP_TIMESTAMP_KEY,
};
use ollama_vm_providers::InstanceSpec;

use super::{non_blank, parse_json_body};
use crate::app::AppState;
use crate::error::ApiError;
use crate::settings::Settings;

/// Request for one VM: fixed machine shape and image from settings, the
/// rendered boot script, and both activity timestamps set to `created_at`.
pub fn build_instance_spec(
    settings: &Settings,
    name: String,
    startup_script: String,
    created_at: &str,
) -> InstanceSpec {
    InstanceSpec {
        name,
        machine_type: settings.machine_type.clone(),
        source_image: settings.source_image.clone(),
        disk_size_gb: settings.boot_disk_size_gb,
        network: settings.network.clone(),
        external_access: true,
        service_account_email: settings.service_account_email.clone(),
        service_account_scopes: settings.service_account_scopes.clone(),
        metadata: Metadata {
            fingerprint: None,
            items: vec![
                MetadataItem::new(STARTUP_SCRIPT_KEY, startup_script),
                MetadataItem::new(STARTUP_TIMESTAMP_KEY, created_at),
                MetadataItem::new(LAST_ACTIVITY_TIMESTAMP_KEY, created_at),
            ],
        },
    }
}

/// POST /createInstance - Provision a VM running Ollama with the requested model
#[utoipa::path(
    post,
    path = "/createInstance",
    tag = "ollama-vm",
    request_body(content = CreateInstanceRequest, description = "Both fields optional; configured defaults apply"),
    responses(
        (status = 200, description = "Instance created", body = CreateInstanceResponse),
        (status = 400, description = "Invalid model name or body", body = serde_json::Value),
        (status = 500, description = "Configuration or provider error", body = serde_json::Value)
    )
)]
pub async fn create_instance(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Json<CreateInstanceResponse>, ApiError> {
    let settings = &state.settings;
    let project = settings.require_project()?;
    let req: CreateInstanceRequest = parse_json_body(&body)?;

    let model_name =
        non_blank(req.model_name).unwrap_or_else(|| settings.default_model_name.clone());
    let zone = non_blank(req.zone).unwrap_or_else(|| settings.default_zone.clone());
    tracing::info!(model = %model_name, zone = %zone, "received request to create instance");

    let script = startup_script::render(&model_name)
        .map_err(|e| ApiError::BadRequest(format!("Invalid modelName: {e}")))?;

    let name = instance_name::generate();
    let created_at = format_timestamp(Utc::now());
    let spec = build_instance_spec(settings, name.clone(), script, &created_at);

    tracing::info!(instance = %name, project, zone = %zone, "creating instance");
    let operation = state
        .provider
        .create_instance(project, &zone, &spec)
        .await
        .map_err(|e| creation_failed(&name, e))?;
    tracing::info!(instance = %name, operation = %operation.name, "instance creation operation started");

    state
        .provider
        .wait_for_operation(project, &zone, &operation)
        .await
        .map_err(|e| creation_failed(&name, e))?;
    tracing::info!(instance = %name, "instance created");

    // The VM exists from here on; a failed lookup is reported but not rolled back.
    let details = state
        .provider
        .get_instance(project, &zone, &name)
        .await
        .map_err(|e| creation_failed(&name, e))?;

    let status = details
        .status
        .unwrap_or_else(|| InstanceStatus::Other("UNKNOWN".to_string()));
    let ip = external_ip(&details.network_interfaces).map(str::to_string);
    tracing::info!(instance = %name, status = %status, ip = ?ip, "instance details fetched");

    Ok(Json(CreateInstanceResponse {
        message: format!("Instance {} creation initiated.", name),
        instance_name: name,
        status,
        external_ip: ip.unwrap_or_else(|| EXTERNAL_IP_PENDING.to_string()),
        zone,
        model_name,
    }))
}

fn creation_failed(name: &str, e: ollama_vm_providers::ProviderError) -> ApiError {
    tracing::error!(instance = %name, error = %e, "error creating instance");
    ApiError::provider("Error creating instance", e)
}

/// GET /getInstanceStatus - Current provider status and network configuration
#[utoipa::path(
    get,
    path = "/getInstanceStatus",
    tag = "ollama-vm",
    params(InstanceStatusParams),
    responses(
        (status = 200, description = "Instance status", body = InstanceStatusResponse),
        (status = 400, description = "Missing instanceName", body = serde_json::Value),
        (status = 404, description = "Instance not found", body = serde_json::Value),
        (status = 500, description = "Configuration or provider error", body = serde_json::Value)
    )
)]
pub async fn get_instance_status(
    State(state): State<Arc<AppState>>,
    Query(params): Query<InstanceStatusParams>,
) -> Result<Json<InstanceStatusResponse>, ApiError> {
    let settings = &state.settings;
    let project = settings.require_project()?;
    let Some(name) = non_blank(params.instance_name) else {
        tracing::warn!("missing instanceName in query parameters");
        return Err(ApiError::MissingField(
            "Missing required query parameter: instanceName".to_string(),
        ));
    };
    let zone = non_blank(params.zone).unwrap_or_else(|| settings.default_zone.clone());
    tracing::info!(instance = %name, zone = %zone, project, "getting instance status");

    let details = match state.provider.get_instance(project, &zone, &name).await {
        Ok(d) => d,
        Err(e) if e.is_not_found() => {
            tracing::warn!(instance = %name, zone = %zone, "instance not found");
            return Err(ApiError::NotFound {
                message: format!("Instance {} not found in zone {}.", name, zone),
                details: Some(e.to_string()),
            });
        }
        Err(e) => {
            tracing::error!(instance = %name, error = %e, "error getting instance status");
            return Err(ApiError::provider("Error getting instance status", e));
        }
    };

    let Some(status) = details.status else {
        tracing::error!(instance = %name, "instance returned without a status");
        return Err(ApiError::NotFound {
            message: format!("Instance {} not found or status unavailable.", name),
            details: None,
        });
    };

    tracing::info!(instance = %name, status = %status, "instance status");
    Ok(Json(InstanceStatusResponse {
        instance_name: name,
        zone,
        status,
        network_interfaces: details.network_interfaces,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use ollama_vm_common::activity::parse_timestamp;

    #[test]
    fn spec_carries_script_and_equal_timestamps() {
        let settings = Settings::default();
        let spec = build_instance_spec(
            &settings,
            "ollama-vm-1".into(),
            "#!/bin/bash\n".into(),
            "2024-05-01T00:00:00.000Z",
        );
        assert_eq!(spec.machine_type, "n1-standard-2");
        assert_eq!(spec.disk_size_gb, 50);
        assert!(spec.external_access);
        let md = &spec.metadata;
        assert_eq!(md.get(STARTUP_SCRIPT_KEY), Some("#!/bin/bash\n"));
        assert_eq!(md.get(STARTUP_TIMESTAMP_KEY), md.get(LAST_ACTIVITY_TIMESTAMP_KEY));
        assert!(parse_timestamp(md.get(STARTUP_TIMESTAMP_KEY).unwrap()).is_some());
    }
}
