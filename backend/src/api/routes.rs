//! Route definitions.

use axum::{routing::get, Router};

use super::handlers;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    Router::new()
        // Health endpoints (no auth required)
        .route("/health", get(handlers::health::health_check))
        .route("/healthz", get(handlers::health::health_check))
        .nest("/api/plugins", handlers::plugins::router(state.clone()))
        .nest("/api/engines", handlers::engines::router())
        .nest("/api/factory", handlers::factory::router(state.clone()))
        .nest(
            "/api/admin/factory",
            handlers::factory::admin_router(state.clone()),
        )
        // Mounted route plugins
        .nest("/ext", handlers::plugin_proxy::router())
        .with_state(state)
}
