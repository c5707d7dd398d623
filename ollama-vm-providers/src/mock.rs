use crate::{CloudProvider, InstanceDetails, InstanceSpec, Operation, ProviderError, Result};
use async_trait::async_trait;
use ollama_vm_common::{AccessConfig, InstanceStatus, Metadata, NetworkInterface};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Which call should fail on its next invocations.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MockFailure {
    Create,
    Wait,
    Get,
    SetMetadata,
}

/// A `setMetadata` call as received.
#[derive(Clone, Debug)]
pub struct MetadataWrite {
    pub project: String,
    pub zone: String,
    pub name: String,
    pub metadata: Metadata,
}

#[derive(Clone, Debug)]
struct MockInstance {
    spec: InstanceSpec,
    /// `None` models an instance the provider reports without a status.
    status: Option<InstanceStatus>,
    metadata: Metadata,
    external_ip: Option<String>,
}

#[derive(Default)]
struct MockState {
    instances: HashMap<(String, String), MockInstance>,
    created: Vec<(String, InstanceSpec)>,
    metadata_writes: Vec<MetadataWrite>,
    failures: HashMap<MockFailure, ProviderErrorKind>,
}

/// Injected failure flavour; `ProviderError` itself is not `Clone`.
#[derive(Clone, Copy, Debug)]
enum ProviderErrorKind {
    NotFound,
    Api(u16),
}

/// In-memory provider for tests and local development.
///
/// Creations complete immediately; instances report RUNNING with the
/// configured external address. Every call is counted so tests can assert
/// that a code path never reached the provider.
pub struct MockProvider {
    state: Mutex<MockState>,
    external_ip: Option<String>,
    fingerprint_seq: AtomicU64,
    create_calls: AtomicUsize,
    wait_calls: AtomicUsize,
    get_calls: AtomicUsize,
    set_metadata_calls: AtomicUsize,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProvider {
    pub fn new() -> Self {
        Self::with_external_ip(Some("203.0.113.10"))
    }

    /// `None` simulates a provider that has not assigned an address yet.
    pub fn with_external_ip(ip: Option<&str>) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            external_ip: ip.map(str::to_string),
            fingerprint_seq: AtomicU64::new(1),
            create_calls: AtomicUsize::new(0),
            wait_calls: AtomicUsize::new(0),
            get_calls: AtomicUsize::new(0),
            set_metadata_calls: AtomicUsize::new(0),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        // A panicking test thread must not wedge the others.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn next_fingerprint(&self) -> String {
        format!("fp-{}", self.fingerprint_seq.fetch_add(1, Ordering::Relaxed))
    }

    /// Make every subsequent `call` fail with a generic provider error.
    pub fn fail(&self, call: MockFailure, status: u16) {
        self.lock().failures.insert(call, ProviderErrorKind::Api(status));
    }

    /// Make every subsequent `call` fail with the provider's not-found error.
    pub fn fail_not_found(&self, call: MockFailure) {
        self.lock().failures.insert(call, ProviderErrorKind::NotFound);
    }

    pub fn clear_failures(&self) {
        self.lock().failures.clear();
    }

    fn injected(&self, call: MockFailure, resource: &str) -> Result<()> {
        match self.lock().failures.get(&call).copied() {
            None => Ok(()),
            Some(ProviderErrorKind::NotFound) => Err(ProviderError::NotFound {
                resource: resource.to_string(),
                message: format!("The resource '{resource}' was not found"),
            }),
            Some(ProviderErrorKind::Api(status)) => Err(ProviderError::Api {
                status,
                message: format!("injected {call:?} failure"),
            }),
        }
    }

    /// Seed an instance without going through `create_instance`.
    pub fn insert_instance(
        &self,
        zone: &str,
        name: &str,
        status: Option<InstanceStatus>,
        metadata: Metadata,
    ) {
        let spec = InstanceSpec {
            name: name.to_string(),
            machine_type: "mock".into(),
            source_image: "mock".into(),
            disk_size_gb: 0,
            network: "mock".into(),
            external_access: true,
            service_account_email: "default".into(),
            service_account_scopes: vec![],
            metadata: metadata.clone(),
        };
        let metadata = Metadata {
            fingerprint: Some(self.next_fingerprint()),
            items: metadata.items,
        };
        self.lock().instances.insert(
            (zone.to_string(), name.to_string()),
            MockInstance {
                spec,
                status,
                metadata,
                external_ip: self.external_ip.clone(),
            },
        );
    }

    /// Zone and spec of every accepted creation, in call order.
    pub fn created(&self) -> Vec<(String, InstanceSpec)> {
        self.lock().created.clone()
    }

    pub fn metadata_writes(&self) -> Vec<MetadataWrite> {
        self.lock().metadata_writes.clone()
    }

    /// Current stored metadata, as the guest watchdog would see it.
    pub fn instance_metadata(&self, zone: &str, name: &str) -> Option<Metadata> {
        self.lock()
            .instances
            .get(&(zone.to_string(), name.to_string()))
            .map(|i| i.metadata.clone())
    }

    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn wait_calls(&self) -> usize {
        self.wait_calls.load(Ordering::SeqCst)
    }

    pub fn get_calls(&self) -> usize {
        self.get_calls.load(Ordering::SeqCst)
    }

    pub fn set_metadata_calls(&self) -> usize {
        self.set_metadata_calls.load(Ordering::SeqCst)
    }

    /// Total provider calls of any kind.
    pub fn total_calls(&self) -> usize {
        self.create_calls() + self.wait_calls() + self.get_calls() + self.set_metadata_calls()
    }
}

#[async_trait]
impl CloudProvider for MockProvider {
    async fn create_instance(
        &self,
        _project: &str,
        zone: &str,
        spec: &InstanceSpec,
    ) -> Result<Operation> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.injected(MockFailure::Create, &format!("zone {zone}"))?;

        let key = (zone.to_string(), spec.name.clone());
        let fingerprint = self.next_fingerprint();
        let mut state = self.lock();
        if state.instances.contains_key(&key) {
            return Err(ProviderError::Api {
                status: 409,
                message: format!("The resource '{}' already exists", spec.name),
            });
        }
        state.created.push((zone.to_string(), spec.clone()));
        state.instances.insert(
            key,
            MockInstance {
                spec: spec.clone(),
                status: Some(InstanceStatus::Running),
                metadata: Metadata {
                    fingerprint: Some(fingerprint),
                    items: spec.metadata.items.clone(),
                },
                external_ip: self.external_ip.clone(),
            },
        );
        tracing::debug!("[Mock provider] created {} in {}", spec.name, zone);
        Ok(Operation {
            name: format!("operation-insert-{}", spec.name),
            status: "DONE".to_string(),
        })
    }

    async fn wait_for_operation(
        &self,
        _project: &str,
        _zone: &str,
        operation: &Operation,
    ) -> Result<()> {
        self.wait_calls.fetch_add(1, Ordering::SeqCst);
        self.injected(MockFailure::Wait, &format!("operation {}", operation.name))
    }

    async fn get_instance(&self, _project: &str, zone: &str, name: &str) -> Result<InstanceDetails> {
        self.get_calls.fetch_add(1, Ordering::SeqCst);
        self.injected(MockFailure::Get, &format!("instance {name}"))?;

        let state = self.lock();
        let Some(instance) = state.instances.get(&(zone.to_string(), name.to_string())) else {
            return Err(ProviderError::NotFound {
                resource: format!("instance {name}"),
                message: format!("The resource 'projects/mock/zones/{zone}/instances/{name}' was not found"),
            });
        };
        let nic = NetworkInterface {
            name: Some("nic0".into()),
            network: Some(instance.spec.network.clone()),
            network_ip: Some("10.128.0.2".into()),
            access_configs: if instance.spec.external_access {
                vec![AccessConfig {
                    name: Some("External NAT".into()),
                    kind: Some("ONE_TO_ONE_NAT".into()),
                    nat_ip: instance.external_ip.clone(),
                    ..Default::default()
                }]
            } else {
                vec![]
            },
            ..Default::default()
        };
        Ok(InstanceDetails {
            status: instance.status.clone(),
            network_interfaces: vec![nic],
            metadata: instance.metadata.clone(),
        })
    }

    async fn set_metadata(
        &self,
        project: &str,
        zone: &str,
        name: &str,
        metadata: &Metadata,
    ) -> Result<Operation> {
        self.set_metadata_calls.fetch_add(1, Ordering::SeqCst);
        self.injected(MockFailure::SetMetadata, &format!("instance {name}"))?;

        let fingerprint = self.next_fingerprint();
        let mut state = self.lock();
        state.metadata_writes.push(MetadataWrite {
            project: project.to_string(),
            zone: zone.to_string(),
            name: name.to_string(),
            metadata: metadata.clone(),
        });
        let Some(instance) = state.instances.get_mut(&(zone.to_string(), name.to_string())) else {
            return Err(ProviderError::NotFound {
                resource: format!("instance {name}"),
                message: format!("The resource 'projects/{project}/zones/{zone}/instances/{name}' was not found"),
            });
        };
        if instance.metadata.fingerprint != metadata.fingerprint {
            return Err(ProviderError::Api {
                status: 412,
                message: "Supplied fingerprint does not match current metadata fingerprint.".into(),
            });
        }
        instance.metadata = Metadata {
            fingerprint: Some(fingerprint),
            items: metadata.items.clone(),
        };
        Ok(Operation {
            name: format!("operation-setMetadata-{name}"),
            status: "PENDING".to_string(),
        })
    }
}
