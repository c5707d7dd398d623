use async_trait::async_trait;
use ollama_vm_common::{InstanceStatus, Metadata, NetworkInterface};

pub mod error;

pub use error::{ProviderError, Result};

/// Instance-management surface of a cloud provider.
///
/// Project and zone are passed per call: the API service only learns whether a
/// project is configured when a request arrives, and each request may target
/// a different zone.
#[async_trait]
pub trait CloudProvider: Send + Sync {
    /// Submit an instance creation. Returns the provider operation to wait on.
    async fn create_instance(&self, project: &str, zone: &str, spec: &InstanceSpec)
        -> Result<Operation>;

    /// Block until `operation` is done. An operation that finished with
    /// errors is reported as [`ProviderError::OperationFailed`].
    async fn wait_for_operation(&self, project: &str, zone: &str, operation: &Operation)
        -> Result<()>;

    async fn get_instance(&self, project: &str, zone: &str, name: &str)
        -> Result<InstanceDetails>;

    /// Replace the instance metadata. `metadata.fingerprint` must be the one
    /// just read; a stale fingerprint is rejected by the provider.
    async fn set_metadata(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<Operation>;
}

/// Everything needed to create one VM. Provider-neutral; each implementation
/// maps it onto its own request shape.
#[derive(Clone, Debug, PartialEq)]
pub struct InstanceSpec {
    pub name: String,
    /// Short machine type (`n1-standard-2`), qualified by the provider.
    pub machine_type: String,
    pub source_image: String,
    pub disk_size_gb: u32,
    pub network: String,
    /// Request an ephemeral public address on the first interface.
    pub external_access: bool,
    pub service_account_email: String,
    pub service_account_scopes: Vec<String>,
    pub metadata: Metadata,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Operation {
    pub name: String,
    /// Provider status string (`PENDING`, `RUNNING`, `DONE`).
    pub status: String,
}

impl Operation {
    pub fn is_done(&self) -> bool {
        self.status.eq_ignore_ascii_case("DONE")
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct InstanceDetails {
    /// `None` if the provider answered without a status.
    pub status: Option<InstanceStatus>,
    pub network_interfaces: Vec<NetworkInterface>,
    pub metadata: Metadata,
}

#[cfg(feature = "mock")]
pub mod mock;

#[cfg(feature = "gce")]
pub mod gce;
