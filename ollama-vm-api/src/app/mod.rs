// Application state and shared layers
pub mod state;

pub use state::AppState;

use tower_http::cors::{Any, CorsLayer};

/// Permissive CORS so the browser control panel can call the API from any origin.
pub fn create_cors() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
}
