// Public routes: landing, version and API documentation
use crate::app::AppState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api_docs;
use crate::version;

pub fn create_public_routes() -> Router<Arc<AppState>> {
    Router::new()
        .merge(
            SwaggerUi::new("/swagger-ui")
                .url("/api-docs/openapi.json", api_docs::ApiDoc::openapi()),
        )
        .route("/", get(root))
        .route("/version", get(get_version))
}

/// Get version information
#[utoipa::path(
    get,
    path = "/version",
    responses((status = 200, description = "Service version", body = version::VersionInfo))
)]
pub async fn get_version() -> axum::Json<version::VersionInfo> {
    axum::Json(version::get_version_info())
}

async fn root() -> &'static str {
    "Ollama VM Orchestration API"
}
