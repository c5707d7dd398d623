use crate::{CloudProvider, InstanceDetails, InstanceSpec, Operation, ProviderError, Result};
use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use ollama_vm_common::{InstanceStatus, Metadata, NetworkInterface};
use reqwest::{Client, Method, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

pub const METADATA_TOKEN_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance/service-accounts/default/token";

/// Upper bound for a single creation to reach DONE.
const OPERATION_DEADLINE: Duration = Duration::from_secs(600);
/// Refresh cached tokens this long before they expire.
const TOKEN_REFRESH_MARGIN_SECS: i64 = 60;

/// Where bearer tokens for the Compute API come from.
#[derive(Clone, Debug)]
pub enum TokenSource {
    /// Pre-issued token (e.g. `gcloud auth print-access-token`).
    Static(String),
    /// The default service account of the VM/container we run on.
    MetadataServer { url: String },
}

struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct MetadataTokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: i64,
}

/// Google Compute Engine, v1 REST API.
pub struct GceProvider {
    client: Client,
    api_base: Url,
    token_source: TokenSource,
    cached_token: Mutex<Option<CachedToken>>,
}

impl GceProvider {
    pub fn new(api_base: &str, token_source: TokenSource) -> anyhow::Result<Self> {
        // operations/wait holds the connection open for up to two minutes.
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(150))
            .build()
            .context("building Compute API HTTP client")?;
        let api_base = Url::parse(api_base.trim().trim_end_matches('/'))
            .with_context(|| format!("invalid Compute API base URL {api_base:?}"))?;
        if api_base.cannot_be_a_base() {
            anyhow::bail!("Compute API base URL {api_base} cannot carry a path");
        }
        Ok(Self {
            client,
            api_base,
            token_source,
            cached_token: Mutex::new(None),
        })
    }

    fn url(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|_| ProviderError::Decode("API base URL cannot carry a path".into()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn zone_url(&self, project: &str, zone: &str, rest: &[&str]) -> Result<Url> {
        let mut segments = vec!["projects", project, "zones", zone];
        segments.extend_from_slice(rest);
        self.url(&segments)
    }

    async fn access_token(&self) -> Result<String> {
        let url = match &self.token_source {
            TokenSource::Static(token) => return Ok(token.clone()),
            TokenSource::MetadataServer { url } => url,
        };

        let mut cached = self.cached_token.lock().await;
        if let Some(token) = cached.as_ref() {
            if token.expires_at - ChronoDuration::seconds(TOKEN_REFRESH_MARGIN_SECS) > Utc::now() {
                return Ok(token.value.clone());
            }
        }

        let resp = self
            .client
            .get(url)
            .header("Metadata-Flavor", "Google")
            .send()
            .await
            .map_err(|e| ProviderError::Auth(format!("metadata server unreachable: {e}")))?;
        if !resp.status().is_success() {
            return Err(ProviderError::Auth(format!(
                "metadata server returned {}",
                resp.status()
            )));
        }
        let body: MetadataTokenResponse = resp
            .json()
            .await
            .map_err(|e| ProviderError::Auth(format!("bad token response: {e}")))?;

        let value = body.access_token.clone();
        *cached = Some(CachedToken {
            value: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in.max(0)),
        });
        Ok(value)
    }

    async fn call(
        &self,
        method: Method,
        url: Url,
        body: Option<&Value>,
        resource: &str,
    ) -> Result<Value> {
        let token = self.access_token().await?;
        tracing::debug!("[GCE API] {} {}", method, url);

        let mut req = self.client.request(method.clone(), url.clone()).bearer_auth(token);
        if let Some(body) = body {
            req = req.json(body);
        }
        let resp = req.send().await?;
        let status = resp.status();

        if status.is_success() {
            return resp
                .json::<Value>()
                .await
                .map_err(|e| ProviderError::Decode(format!("{method} {url}: {e}")));
        }

        let text = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<Value>(&text)
            .ok()
            .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
            .unwrap_or(text);
        tracing::warn!("[GCE API] {} {} failed: status={} message={}", method, url, status, message);

        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::NotFound {
                resource: resource.to_string(),
                message,
            });
        }
        Err(ProviderError::Api {
            status: status.as_u16(),
            message,
        })
    }
}

fn insert_body(zone: &str, spec: &InstanceSpec) -> Value {
    let mut nic = json!({ "network": spec.network });
    if spec.external_access {
        nic["accessConfigs"] = json!([{ "name": "External NAT", "type": "ONE_TO_ONE_NAT" }]);
    }
    json!({
        "name": spec.name,
        "machineType": format!("zones/{}/machineTypes/{}", zone, spec.machine_type),
        "displayDevice": { "enableDisplay": true },
        "disks": [{
            "boot": true,
            "autoDelete": true,
            "initializeParams": {
                "sourceImage": spec.source_image,
                "diskSizeGb": spec.disk_size_gb.to_string(),
            }
        }],
        "networkInterfaces": [nic],
        "serviceAccounts": [{
            "email": spec.service_account_email,
            "scopes": spec.service_account_scopes,
        }],
        "metadata": { "items": spec.metadata.items },
    })
}

fn parse_operation(v: &Value) -> Result<Operation> {
    let name = v["name"]
        .as_str()
        .ok_or_else(|| ProviderError::Decode("operation without name".into()))?
        .to_string();
    let status = v["status"].as_str().unwrap_or("PENDING").to_string();
    Ok(Operation { name, status })
}

/// Joined messages of a finished operation's `error.errors[]`, if any.
fn operation_errors(v: &Value) -> Option<String> {
    let errors = v["error"]["errors"].as_array()?;
    if errors.is_empty() {
        return None;
    }
    Some(
        errors
            .iter()
            .map(|e| {
                let code = e["code"].as_str().unwrap_or("UNKNOWN");
                let msg = e["message"].as_str().unwrap_or("");
                format!("{code}: {msg}")
            })
            .collect::<Vec<_>>()
            .join("; "),
    )
}

fn parse_instance(v: Value) -> Result<InstanceDetails> {
    let status = v["status"].as_str().map(InstanceStatus::parse);
    let network_interfaces: Vec<NetworkInterface> = match v.get("networkInterfaces") {
        Some(n) => serde_json::from_value(n.clone())
            .map_err(|e| ProviderError::Decode(format!("networkInterfaces: {e}")))?,
        None => Vec::new(),
    };
    let metadata: Metadata = match v.get("metadata") {
        Some(m) => serde_json::from_value(m.clone())
            .map_err(|e| ProviderError::Decode(format!("metadata: {e}")))?,
        None => Metadata::default(),
    };
    Ok(InstanceDetails {
        status,
        network_interfaces,
        metadata,
    })
}

#[async_trait]
impl CloudProvider for GceProvider {
    async fn create_instance(
        &self,
        project: &str,
        zone: &str,
        spec: &InstanceSpec,
    ) -> Result<Operation> {
        let url = self.zone_url(project, zone, &["instances"])?;
        let body = insert_body(zone, spec);
        tracing::info!(
            "[GCE API] creating instance {} (type={}, image={}, zone={})",
            spec.name,
            spec.machine_type,
            spec.source_image,
            zone
        );
        let resp = self
            .call(Method::POST, url, Some(&body), &format!("zone {zone}"))
            .await?;
        if let Some(errors) = operation_errors(&resp) {
            return Err(ProviderError::OperationFailed {
                operation: resp["name"].as_str().unwrap_or("insert").to_string(),
                message: errors,
            });
        }
        parse_operation(&resp)
    }

    async fn wait_for_operation(
        &self,
        project: &str,
        zone: &str,
        operation: &Operation,
    ) -> Result<()> {
        if operation.is_done() {
            return Ok(());
        }
        let started = Instant::now();
        loop {
            let url = self.zone_url(project, zone, &["operations", operation.name.as_str(), "wait"])?;
            let resp = self
                .call(Method::POST, url, None, &format!("operation {}", operation.name))
                .await?;
            if let Some(errors) = operation_errors(&resp) {
                return Err(ProviderError::OperationFailed {
                    operation: operation.name.clone(),
                    message: errors,
                });
            }
            let current = parse_operation(&resp)?;
            if current.is_done() {
                return Ok(());
            }
            if started.elapsed() > OPERATION_DEADLINE {
                return Err(ProviderError::OperationFailed {
                    operation: operation.name.clone(),
                    message: format!("still {} after {:?}", current.status, OPERATION_DEADLINE),
                });
            }
            tracing::debug!("[GCE API] operation {} is {}", operation.name, current.status);
        }
    }

    async fn get_instance(&self, project: &str, zone: &str, name: &str) -> Result<InstanceDetails> {
        let url = self.zone_url(project, zone, &["instances", name])?;
        let resp = self
            .call(Method::GET, url, None, &format!("instance {name}"))
            .await?;
        parse_instance(resp)
    }

    async fn set_metadata(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<Operation> {
        let url = self.zone_url(project, zone, &["instances", name, "setMetadata"])?;
        let body = serde_json::to_value(metadata)
            .map_err(|e| ProviderError::Decode(format!("metadata: {e}")))?;
        let resp = self
            .call(Method::POST, url, Some(&body), &format!("instance {name}"))
            .await?;
        parse_operation(&resp)
    }
}
