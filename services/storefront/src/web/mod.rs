pub mod protocol;
pub mod rest;
pub mod state;
pub mod ws_handler;

use axum::{routing::get, Router};
use std::sync::Arc;

// Re-export the handlers the binary wires into the router.
pub use rest::health_handler;
pub use state::{AppState, CartSession};
pub use ws_handler::ws_handler;

/// The gateway routes, without transport layers such as CORS.
pub fn app_router(app_state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/ws", get(ws_handler))
        .with_state(app_state)
}
