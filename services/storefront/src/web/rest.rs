//! services/storefront/src/web/rest.rs
//!
//! Plain HTTP endpoints next to the WebSocket gateway.

use axum::http::StatusCode;

/// Liveness probe.
pub async fn health_handler() -> (StatusCode, &'static str) {
    (StatusCode::OK, "ok")
}
