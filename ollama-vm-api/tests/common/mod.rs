// Common test utilities and fixtures
#![allow(dead_code)]

use axum::Router;
use axum_test::TestServer;
use ollama_vm_api::app::AppState;
use ollama_vm_api::routes::create_router;
use ollama_vm_api::Settings;
use ollama_vm_common::{
    activity, InstanceStatus, Metadata, MetadataItem, LAST_ACTIVITY_TIMESTAMP_KEY,
    STARTUP_SCRIPT_KEY, STARTUP_TIMESTAMP_KEY,
};
use ollama_vm_providers::mock::MockProvider;
use std::collections::HashMap;
use std::sync::Arc;

pub const TEST_PROJECT: &str = "test-project";
pub const TEST_ZONE: &str = "us-central1-a";

/// Settings for a configured project; `overrides` are applied on top.
pub fn test_settings(overrides: &[(&str, &str)]) -> Settings {
    let mut env: HashMap<String, String> = HashMap::new();
    env.insert("GCLOUD_PROJECT".into(), TEST_PROJECT.into());
    env.insert("PROVIDER".into(), "mock".into());
    for (k, v) in overrides {
        env.insert(k.to_string(), v.to_string());
    }
    Settings::from_lookup(|k| env.get(k).cloned())
}

pub fn create_test_app(settings: Settings, provider: Arc<MockProvider>) -> Router {
    let state = AppState::new(settings, provider).unwrap();
    create_router().with_state(state)
}

/// Test server over the mock provider; the provider handle stays with the
/// test for seeding and call inspection.
pub fn create_test_server(settings: Settings, provider: Arc<MockProvider>) -> TestServer {
    TestServer::new(create_test_app(settings, provider)).unwrap()
}

/// Seed a running instance whose metadata looks like a freshly created VM.
pub fn seed_instance(provider: &MockProvider, zone: &str, name: &str, created_at: &str) {
    provider.insert_instance(
        zone,
        name,
        Some(InstanceStatus::Running),
        Metadata {
            fingerprint: None,
            items: vec![
                MetadataItem::new(STARTUP_SCRIPT_KEY, "#!/bin/bash\necho hi\n"),
                MetadataItem::new(STARTUP_TIMESTAMP_KEY, created_at),
                MetadataItem::new(LAST_ACTIVITY_TIMESTAMP_KEY, created_at),
            ],
        },
    );
}

pub fn last_activity(metadata: &Metadata) -> chrono::DateTime<chrono::Utc> {
    activity::parse_timestamp(metadata.get(LAST_ACTIVITY_TIMESTAMP_KEY).unwrap()).unwrap()
}
