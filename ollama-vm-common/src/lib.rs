use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

pub mod activity;
pub mod instance_name;
pub mod startup_script;

/// Metadata key holding the boot script run by the guest agent.
pub const STARTUP_SCRIPT_KEY: &str = "startup-script";
/// Set once at creation; the watchdog falls back to it when no activity was recorded.
pub const STARTUP_TIMESTAMP_KEY: &str = "startup-timestamp";
/// Refreshed by the command relay after every successful inference call.
pub const LAST_ACTIVITY_TIMESTAMP_KEY: &str = "last-activity-timestamp";

/// Returned in place of `externalIp` while the provider has not assigned one.
pub const EXTERNAL_IP_PENDING: &str = "IP not available yet. Check VM status.";

// --- Enums ---

/// Lifecycle status as reported by the cloud provider.
///
/// Provider-driven; we never set it ourselves. Values we don't know about are
/// carried through untouched so the status endpoint can still report them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstanceStatus {
    Provisioning,
    Staging,
    Running,
    Stopping,
    Stopped,
    Suspending,
    Suspended,
    Repairing,
    Terminated,
    Other(String),
}

impl InstanceStatus {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PROVISIONING" => Self::Provisioning,
            "STAGING" => Self::Staging,
            "RUNNING" => Self::Running,
            "STOPPING" => Self::Stopping,
            "STOPPED" => Self::Stopped,
            "SUSPENDING" => Self::Suspending,
            "SUSPENDED" => Self::Suspended,
            "REPAIRING" => Self::Repairing,
            "TERMINATED" => Self::Terminated,
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Provisioning => "PROVISIONING",
            Self::Staging => "STAGING",
            Self::Running => "RUNNING",
            Self::Stopping => "STOPPING",
            Self::Stopped => "STOPPED",
            Self::Suspending => "SUSPENDING",
            Self::Suspended => "SUSPENDED",
            Self::Repairing => "REPAIRING",
            Self::Terminated => "TERMINATED",
            Self::Other(s) => s.as_str(),
        }
    }
}

impl fmt::Display for InstanceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for InstanceStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for InstanceStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(Self::parse(&raw))
    }
}

// --- Instance metadata ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
pub struct MetadataItem {
    pub key: String,
    pub value: String,
}

impl MetadataItem {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Instance metadata record. `fingerprint` is the provider's optimistic
/// concurrency token and must come from a fresh read before every write.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Metadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fingerprint: Option<String>,
    #[serde(default)]
    pub items: Vec<MetadataItem>,
}

impl Metadata {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.items
            .iter()
            .find(|i| i.key == key)
            .map(|i| i.value.as_str())
    }

    /// Replace the value for `key`, or append it when absent.
    pub fn upsert(&mut self, key: &str, value: impl Into<String>) {
        let value = value.into();
        match self.items.iter_mut().find(|i| i.key == key) {
            Some(item) => item.value = value,
            None => self.items.push(MetadataItem::new(key, value)),
        }
    }
}

// --- Networking ---

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, rename = "natIP", skip_serializing_if = "Option::is_none")]
    pub nat_ip: Option<String>,
    /// Provider fields we don't model are passed through as-is.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkInterface {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub network: Option<String>,
    #[serde(default, rename = "networkIP", skip_serializing_if = "Option::is_none")]
    pub network_ip: Option<String>,
    #[serde(default)]
    pub access_configs: Vec<AccessConfig>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// First NAT address on the first interface, if the provider assigned one yet.
pub fn external_ip(interfaces: &[NetworkInterface]) -> Option<&str> {
    interfaces
        .first()?
        .access_configs
        .first()?
        .nat_ip
        .as_deref()
        .filter(|ip| !ip.is_empty())
}

// --- API payloads ---

#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceRequest {
    pub model_name: Option<String>,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateInstanceResponse {
    pub message: String,
    pub instance_name: String,
    #[schema(value_type = String, example = "RUNNING")]
    pub status: InstanceStatus,
    /// Either the assigned address or [`EXTERNAL_IP_PENDING`].
    pub external_ip: String,
    pub zone: String,
    pub model_name: String,
}

#[derive(Debug, Clone, Default, Deserialize, utoipa::IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct InstanceStatusParams {
    pub instance_name: Option<String>,
    pub zone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct InstanceStatusResponse {
    pub instance_name: String,
    pub zone: String,
    #[schema(value_type = String, example = "RUNNING")]
    pub status: InstanceStatus,
    #[schema(value_type = Vec<Object>)]
    pub network_interfaces: Vec<NetworkInterface>,
}

/// Body of `POST /executeOllamaCommand`. Every field is optional at the type
/// level so each missing one can be reported on its own.
#[derive(Debug, Clone, Default, Deserialize, utoipa::ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteCommandRequest {
    pub instance_ip: Option<String>,
    pub instance_name: Option<String>,
    pub zone: Option<String>,
    pub ollama_command: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub command_payload: Option<serde_json::Value>,
}
