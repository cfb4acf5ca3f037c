//! Health check endpoints.

use axum::{extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use serde_json::{json, Value};

use crate::api::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckStatus,
    pub plugins: PluginCheck,
}

#[derive(Serialize)]
pub struct CheckStatus {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Serialize)]
pub struct PluginCheck {
    pub mounted: usize,
    pub startup_mount_done: bool,
}

/// Liveness plus a database round trip.
pub async fn health_check(State(state): State<SharedState>) -> impl IntoResponse {
    let database = match sqlx::query("SELECT 1").fetch_one(&state.db).await {
        Ok(_) => CheckStatus {
            status: "healthy".to_string(),
            message: None,
        },
        Err(e) => CheckStatus {
            status: "unhealthy".to_string(),
            message: Some(format!("Database connection failed: {}", e)),
        },
    };

    let healthy = database.status == "healthy";
    let response = HealthResponse {
        status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        checks: HealthChecks {
            database,
            plugins: PluginCheck {
                mounted: state.plugin_registry.plugin_count().await,
                startup_mount_done: state.plugin_registry.startup_mount_done(),
            },
        },
    };

    let status_code = if healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(response))
}

/// Static overlay health document.
pub async fn factory_health() -> Json<Value> {
    Json(json!({"ok": true, "service": "atlas", "overlay": "v5"}))
}
