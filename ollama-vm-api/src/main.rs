use std::net::SocketAddr;

use ollama_vm_api::app::{create_cors, AppState};
use ollama_vm_api::provider_manager::ProviderManager;
use ollama_vm_api::routes::create_router;
use ollama_vm_api::Settings;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env();
    if settings.project_id.is_none() {
        // Requests will fail with a configuration error until this is set.
        tracing::warn!("GCLOUD_PROJECT is not set");
    }
    tracing::info!(
        provider = %settings.provider,
        default_zone = %settings.default_zone,
        default_model = %settings.default_model_name,
        "starting Ollama VM API"
    );

    let provider = ProviderManager::get_provider(&settings)?;
    let port = settings.api_port;
    let state = AppState::new(settings, provider)?;

    let app = create_router()
        .layer(create_cors()) // Apply CORS to ALL routes
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Ollama VM API listening on {}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
