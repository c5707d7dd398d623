use anyhow::Context;
use ollama_vm_providers::CloudProvider;
use std::fs;
use std::sync::Arc;

use crate::settings::Settings;

pub struct ProviderManager;

impl ProviderManager {
    /// Build the provider named by `PROVIDER`. Unknown names, or names whose
    /// feature was compiled out, are a startup error.
    pub fn get_provider(settings: &Settings) -> anyhow::Result<Arc<dyn CloudProvider>> {
        match settings.provider.as_str() {
            #[cfg(feature = "provider-gce")]
            "gce" => {
                use ollama_vm_providers::gce::{GceProvider, TokenSource, METADATA_TOKEN_URL};

                // Prefer an explicit token, then a token file (Docker/K8s secrets),
                // then the metadata server of the host we run on.
                let token = match (&settings.access_token, &settings.access_token_file) {
                    (Some(token), _) => TokenSource::Static(token.clone()),
                    (None, Some(path)) => {
                        let raw = fs::read_to_string(path)
                            .with_context(|| format!("reading access token file {path}"))?;
                        TokenSource::Static(raw.trim().to_string())
                    }
                    (None, None) => TokenSource::MetadataServer {
                        url: METADATA_TOKEN_URL.to_string(),
                    },
                };
                tracing::info!(
                    api_base = %settings.gce_api_base_url,
                    metadata_server = matches!(token, TokenSource::MetadataServer { .. }),
                    "using GCE provider"
                );
                let provider: Arc<dyn CloudProvider> =
                    Arc::new(GceProvider::new(&settings.gce_api_base_url, token)?);
                Ok(provider)
            }
            #[cfg(feature = "provider-mock")]
            "mock" => {
                tracing::warn!("using in-memory mock provider; no VMs will be created");
                let provider: Arc<dyn CloudProvider> =
                    Arc::new(ollama_vm_providers::mock::MockProvider::new());
                Ok(provider)
            }
            other => anyhow::bail!("unsupported PROVIDER {other:?} (expected \"gce\" or \"mock\")"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(pairs: &'static [(&'static str, &'static str)]) -> Settings {
        Settings::from_lookup(|k| {
            pairs
                .iter()
                .find(|(key, _)| *key == k)
                .map(|(_, v)| v.to_string())
        })
    }

    #[test]
    fn mock_provider_is_selectable() {
        assert!(ProviderManager::get_provider(&settings(&[("PROVIDER", "mock")])).is_ok());
    }

    #[test]
    fn static_token_gce_provider_builds() {
        let s = settings(&[("PROVIDER", "gce"), ("GOOGLE_OAUTH_ACCESS_TOKEN", "tok")]);
        assert!(ProviderManager::get_provider(&s).is_ok());
    }

    #[test]
    fn unknown_provider_is_rejected() {
        let err = ProviderManager::get_provider(&settings(&[("PROVIDER", "azure")]))
            .err()
            .unwrap();
        assert!(err.to_string().contains("azure"));
    }

    #[test]
    fn missing_token_file_is_reported() {
        let s = settings(&[
            ("PROVIDER", "gce"),
            ("GOOGLE_OAUTH_ACCESS_TOKEN_FILE", "/nonexistent/token"),
        ]);
        let err = ProviderManager::get_provider(&s).err().unwrap();
        assert!(err.to_string().contains("/nonexistent/token"));
    }
}
