// VM lifecycle and inference relay routes
use crate::app::AppState;
use crate::handlers::{commands, instances};
use axum::routing::{get, post};
use axum::Router;
use std::sync::Arc;

pub fn create_instance_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/createInstance", post(instances::create_instance))
        .route("/getInstanceStatus", get(instances::get_instance_status))
        .route("/executeOllamaCommand", post(commands::execute_ollama_command))
}
