// Version information module
// Reads version from a VERSION file at runtime, falling back to the crate version

use std::fs;

/// Service version from the first readable VERSION file, else the crate version.
pub fn get_service_version() -> String {
    // Runtime lookup lets deployments bump the version without a rebuild
    for path in ["VERSION", "../VERSION", "../../VERSION"] {
        if let Ok(contents) = fs::read_to_string(path) {
            let trimmed = contents.trim();
            if !trimmed.is_empty() {
                return trimmed.to_string();
            }
        }
    }
    env!("CARGO_PKG_VERSION").to_string()
}

#[derive(Debug, serde::Serialize, utoipa::ToSchema)]
pub struct VersionInfo {
    pub service: String,
    pub version: String,
    pub server_time: String,
}

pub fn get_version_info() -> VersionInfo {
    VersionInfo {
        service: env!("CARGO_PKG_NAME").to_string(),
        version: get_service_version(),
        server_time: chrono::Utc::now()
            .format("%Y-%m-%d %H:%M:%S UTC")
            .to_string(),
    }
}
