use ollama_vm_providers::CloudProvider;
use std::sync::Arc;
use std::time::Duration;

use crate::settings::Settings;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub provider: Arc<dyn CloudProvider>,
    /// Client for the inference service on provisioned VMs.
    pub ollama_client: reqwest::Client,
}

impl AppState {
    pub fn new(settings: Settings, provider: Arc<dyn CloudProvider>) -> anyhow::Result<Arc<Self>> {
        let ollama_client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(30))
            .tcp_keepalive(Duration::from_secs(60))
            .timeout(settings.ollama_timeout)
            .build()?;
        Ok(Arc::new(Self {
            settings,
            provider,
            ollama_client,
        }))
    }
}
