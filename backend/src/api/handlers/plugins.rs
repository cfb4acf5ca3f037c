//! Plugin registry handlers.

use axum::{
    extract::{multipart::MultipartError, DefaultBodyLimit, Multipart, Path, State},
    http::StatusCode,
    middleware,
    routing::{delete, get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::api::middleware::admin::admin_middleware;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::plugin::{InstallOutcome, LifecycleOutcome, ReconcileReport};
use crate::services::plugin_service::MAX_PLUGIN_ARCHIVE_BYTES;

/// Multipart framing on top of the largest accepted archive.
const UPLOAD_BODY_LIMIT: usize = MAX_PLUGIN_ARCHIVE_BYTES + 1024 * 1024;

/// Create plugin routes
pub fn router(state: SharedState) -> Router<SharedState> {
    let admin = Router::new()
        .route(
            "/install",
            post(install_plugin).layer(DefaultBodyLimit::max(UPLOAD_BODY_LIMIT)),
        )
        .route("/reconcile", post(reconcile_plugins))
        .route("/:id", delete(remove_plugin))
        .route("/:id/enable", post(enable_plugin))
        .route("/:id/disable", post(disable_plugin))
        .route_layer(middleware::from_fn_with_state(state, admin_middleware));

    Router::new()
        .route("/", get(list_plugins))
        .route("/mounted", get(list_mounted))
        .route("/:id", get(get_plugin))
        .merge(admin)
}

/// List installed plugins
pub async fn list_plugins(State(state): State<SharedState>) -> Result<Json<Value>> {
    let items = state.plugin_service.list().await?;
    Ok(Json(json!({"ok": true, "items": items})))
}

/// Get plugin details
pub async fn get_plugin(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let item = state.plugin_service.get(&id).await?;
    Ok(Json(json!({"ok": true, "item": item})))
}

/// Live mount table
pub async fn list_mounted(State(state): State<SharedState>) -> Json<Value> {
    let items = state.plugin_registry.list_plugins().await;
    Json(json!({
        "ok": true,
        "startup_mount_done": state.plugin_registry.startup_mount_done(),
        "items": items,
    }))
}

fn multipart_error(e: MultipartError) -> AppError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(format!(
            "Plugin archive exceeds the {} byte limit",
            MAX_PLUGIN_ARCHIVE_BYTES
        ))
    } else {
        AppError::Validation(format!("Invalid multipart upload: {}", e))
    }
}

/// Install a plugin from the multipart field `file`
pub async fn install_plugin(
    State(state): State<SharedState>,
    mut multipart: Multipart,
) -> Result<Json<InstallOutcome>> {
    let mut archive: Option<Bytes> = None;

    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() == Some("file") {
            archive = Some(field.bytes().await.map_err(multipart_error)?);
        }
    }

    let archive =
        archive.ok_or_else(|| AppError::Validation("Missing multipart field 'file'".into()))?;

    let outcome = state.plugin_service.install_from_zip(archive).await?;
    Ok(Json(outcome))
}

/// Enable a plugin and remount it
pub async fn enable_plugin(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LifecycleOutcome>> {
    Ok(Json(state.plugin_service.enable(&id).await?))
}

/// Disable a plugin
pub async fn disable_plugin(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LifecycleOutcome>> {
    Ok(Json(state.plugin_service.disable(&id).await?))
}

/// Remove a plugin's row and files
pub async fn remove_plugin(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<LifecycleOutcome>> {
    Ok(Json(state.plugin_service.remove(&id).await?))
}

/// Reconcile the mount table with the registry
pub async fn reconcile_plugins(State(state): State<SharedState>) -> Result<Json<ReconcileReport>> {
    Ok(Json(state.plugin_service.reconcile().await?))
}
