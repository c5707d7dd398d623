//! Process configuration, read once at startup and shared through `AppState`.
//!
//! Built from a key lookup so tests can construct it from a literal map
//! instead of mutating the process environment.

use std::time::Duration;

use crate::error::ApiError;

pub const DEFAULT_ZONE: &str = "us-central1-a";
pub const DEFAULT_MODEL_NAME: &str = "llama2";
pub const DEFAULT_API_PORT: u16 = 8080;
pub const DEFAULT_PROVIDER: &str = "gce";
pub const DEFAULT_GCE_API_BASE_URL: &str = "https://compute.googleapis.com/compute/v1";
pub const DEFAULT_MACHINE_TYPE: &str = "n1-standard-2";
pub const DEFAULT_SOURCE_IMAGE: &str = "projects/debian-cloud/global/images/family/debian-11";
pub const DEFAULT_BOOT_DISK_SIZE_GB: u32 = 50;
pub const DEFAULT_NETWORK: &str = "global/networks/default";
pub const DEFAULT_SERVICE_ACCOUNT: &str = "default";
pub const DEFAULT_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";
/// Port the inference container publishes on every VM.
pub const DEFAULT_OLLAMA_PORT: u16 = 11434;
/// Inference calls (model pulls, long generations) can take minutes.
pub const MIN_OLLAMA_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone, Debug)]
pub struct Settings {
    /// `GCLOUD_PROJECT`. Absence is reported per request, not at startup.
    pub project_id: Option<String>,
    pub default_zone: String,
    pub default_model_name: String,
    pub api_port: u16,
    /// `gce` or `mock`.
    pub provider: String,
    pub gce_api_base_url: String,
    pub access_token: Option<String>,
    pub access_token_file: Option<String>,
    pub machine_type: String,
    pub source_image: String,
    pub boot_disk_size_gb: u32,
    pub network: String,
    pub service_account_email: String,
    pub service_account_scopes: Vec<String>,
    pub ollama_port: u16,
    pub ollama_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let string_or = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let ollama_timeout_secs = parse_or(get("OLLAMA_TIMEOUT_SECS"), "OLLAMA_TIMEOUT_SECS", 600u64);
        let ollama_timeout = Duration::from_secs(ollama_timeout_secs).max(MIN_OLLAMA_TIMEOUT);

        let service_account_scopes = get("SERVICE_ACCOUNT_SCOPES")
            .map(|raw| {
                raw.split(',')
                    .map(|s| s.trim())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect::<Vec<_>>()
            })
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| vec![DEFAULT_SCOPE.to_string()]);

        Self {
            project_id: get("GCLOUD_PROJECT"),
            default_zone: string_or("DEFAULT_ZONE", DEFAULT_ZONE),
            default_model_name: string_or("DEFAULT_MODEL_NAME", DEFAULT_MODEL_NAME),
            api_port: parse_or(get("API_PORT"), "API_PORT", DEFAULT_API_PORT),
            provider: string_or("PROVIDER", DEFAULT_PROVIDER).to_lowercase(),
            gce_api_base_url: string_or("GCE_API_BASE_URL", DEFAULT_GCE_API_BASE_URL),
            access_token: get("GOOGLE_OAUTH_ACCESS_TOKEN"),
            access_token_file: get("GOOGLE_OAUTH_ACCESS_TOKEN_FILE"),
            machine_type: string_or("MACHINE_TYPE", DEFAULT_MACHINE_TYPE),
            source_image: string_or("SOURCE_IMAGE", DEFAULT_SOURCE_IMAGE),
            boot_disk_size_gb: parse_or(
                get("BOOT_DISK_SIZE_GB"),
                "BOOT_DISK_SIZE_GB",
                DEFAULT_BOOT_DISK_SIZE_GB,
            ),
            network: string_or("NETWORK", DEFAULT_NETWORK),
            service_account_email: string_or("SERVICE_ACCOUNT_EMAIL", DEFAULT_SERVICE_ACCOUNT),
            service_account_scopes,
            ollama_port: parse_or(get("OLLAMA_PORT"), "OLLAMA_PORT", DEFAULT_OLLAMA_PORT),
            ollama_timeout,
        }
    }

    /// Project id for provider calls; its absence is a configuration error.
    pub fn require_project(&self) -> Result<&str, ApiError> {
        match self.project_id.as_deref() {
            Some(p) => Ok(p),
            None => {
                tracing::error!("GCLOUD_PROJECT is not set");
                Err(ApiError::Config("GCLOUD_PROJECT not set.".to_string()))
            }
        }
    }
}

fn parse_or<T>(raw: Option<String>, key: &str, default: T) -> T
where
    T: std::str::FromStr + std::fmt::Display,
{
    match raw {
        None => default,
        Some(v) => v.parse().unwrap_or_else(|_| {
            tracing::warn!("{}={:?} is not valid, using {}", key, v, default);
            default
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_pairs(pairs: &[(&str, &str)]) -> Settings {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|k| map.get(k).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let s = Settings::default();
        assert_eq!(s.project_id, None);
        assert_eq!(s.default_zone, "us-central1-a");
        assert_eq!(s.default_model_name, "llama2");
        assert_eq!(s.provider, "gce");
        assert_eq!(s.ollama_port, 11434);
        assert_eq!(s.ollama_timeout, Duration::from_secs(600));
        assert_eq!(s.service_account_scopes, vec![DEFAULT_SCOPE.to_string()]);
        assert!(s.require_project().is_err());
    }

    #[test]
    fn values_are_trimmed_and_parsed() {
        let s = from_pairs(&[
            ("GCLOUD_PROJECT", " my-project "),
            ("DEFAULT_ZONE", "europe-west4-a"),
            ("PROVIDER", "MOCK"),
            ("OLLAMA_PORT", "8081"),
            ("BOOT_DISK_SIZE_GB", "100"),
            ("SERVICE_ACCOUNT_SCOPES", "a, b,,"),
        ]);
        assert_eq!(s.require_project().unwrap(), "my-project");
        assert_eq!(s.default_zone, "europe-west4-a");
        assert_eq!(s.provider, "mock");
        assert_eq!(s.ollama_port, 8081);
        assert_eq!(s.boot_disk_size_gb, 100);
        assert_eq!(s.service_account_scopes, vec!["a", "b"]);
    }

    #[test]
    fn bad_numbers_fall_back_and_timeout_has_a_floor() {
        let s = from_pairs(&[
            ("GCLOUD_PROJECT", ""),
            ("API_PORT", "eighty"),
            ("OLLAMA_TIMEOUT_SECS", "5"),
        ]);
        assert_eq!(s.project_id, None);
        assert_eq!(s.api_port, DEFAULT_API_PORT);
        assert_eq!(s.ollama_timeout, MIN_OLLAMA_TIMEOUT);

        let long = from_pairs(&[("OLLAMA_TIMEOUT_SECS", "1800")]);
        assert_eq!(long.ollama_timeout, Duration::from_secs(1800));
    }
}
