//! Scaffold export and starter plugin endpoints.

use axum::{
    extract::{Path, State},
    middleware,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bytes::Bytes;
use serde_json::{json, Value};

use crate::api::download_response::FileDownload;
use crate::api::handlers::health::factory_health;
use crate::api::middleware::admin::admin_middleware;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::export::{ExportRequest, ExportResult, GeneratePluginRequest};
use crate::services::plugin_generator::generate_plugin_archive;
use crate::services::presets::{list_presets, DEFAULT_DEPLOY_PROFILE};

const DEFAULT_GENERATED_SLUG: &str = "generated-plugin";

/// Mounted at `/api/factory`.
pub fn router(state: SharedState) -> Router<SharedState> {
    let admin = Router::new()
        .route("/export", post(export))
        .route_layer(middleware::from_fn_with_state(state, admin_middleware));

    Router::new()
        .route("/health", get(factory_health))
        .route("/spec-schema", get(spec_schema))
        .route("/presets", get(presets))
        .route("/exports", get(list_exports))
        .route("/download/:artifact", get(download))
        .merge(admin)
}

/// Mounted at `/api/admin/factory`.
pub fn admin_router(state: SharedState) -> Router<SharedState> {
    let admin = Router::new()
        .route("/generate-plugin", post(generate_plugin))
        .route("/list", get(list_generated))
        .route_layer(middleware::from_fn_with_state(state, admin_middleware));

    Router::new().route("/status", get(status)).merge(admin)
}

/// Example platform spec accepted by `POST /api/factory/export`.
pub async fn spec_schema() -> Json<Value> {
    Json(json!({
        "schema_version": "1.0",
        "platform": {
            "brand": "Atlas",
            "name": "Atlas – <Product>",
            "slug": "atlas_product",
            "domain": "<domain>"
        },
        "modules": ["projects", "chat", "files", "ocr", "rbac"],
        "plugins": {"enabled": true, "runtime": "atlas_plugin_runtime_v1"},
        "deploy": {
            "profile": DEFAULT_DEPLOY_PROFILE,
            "db": "sqlite_volume",
            "storage": "volume",
            "ports": {"web": 5173, "api": 8000}
        },
        "providers": {
            "ocr": "external_provider",
            "llm": "external_provider",
            "storage": "local_volume"
        }
    }))
}

pub async fn presets() -> Json<Value> {
    Json(json!({"items": list_presets()}))
}

pub async fn export(
    State(state): State<SharedState>,
    Json(request): Json<ExportRequest>,
) -> Result<Json<ExportResult>> {
    Ok(Json(state.scaffold_service.export_from_payload(request).await?))
}

pub async fn list_exports(State(state): State<SharedState>) -> Result<Json<Value>> {
    let items = state.scaffold_service.list_exports().await?;
    Ok(Json(json!({"items": items})))
}

pub async fn download(
    State(state): State<SharedState>,
    Path(artifact): Path<String>,
) -> Result<impl IntoResponse> {
    let content = state.scaffold_service.download_export(&artifact).await?;
    Ok(FileDownload::new(content, artifact))
}

pub async fn status(State(state): State<SharedState>) -> Json<Value> {
    Json(json!({"ok": true, "enabled": state.config.admin_token.is_some()}))
}

/// Accepts the fields directly or wrapped as `{"spec": {...}}`.
fn parse_generate_request(payload: Value) -> Result<GeneratePluginRequest> {
    let inner = match payload {
        Value::Object(mut map) if matches!(map.get("spec"), Some(Value::Object(_))) => {
            map.remove("spec").unwrap_or_default()
        }
        other => other,
    };
    serde_json::from_value(inner)
        .map_err(|e| AppError::Validation(format!("Invalid generate-plugin request: {}", e)))
}

/// Build a starter plugin zip, archive it and return it.
pub async fn generate_plugin(
    State(state): State<SharedState>,
    Json(payload): Json<Value>,
) -> Result<impl IntoResponse> {
    let request = parse_generate_request(payload)?;
    let slug = request
        .plugin_slug
        .or(request.product_slug)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_GENERATED_SLUG.to_string());
    let title = request.title.unwrap_or_default();

    let archive = generate_plugin_archive(&slug, &title)?;
    let filename = format!("{}.zip", slug);
    let stored = state
        .artifact_service
        .store(
            "plugin_zip",
            &filename,
            Bytes::from(archive.clone()),
            json!({"slug": slug, "title": title}),
        )
        .await?;

    tracing::info!(plugin = %slug, artifact_id = %stored.id, "Generated starter plugin");

    Ok(FileDownload::new(Bytes::from(archive), filename).with_artifact_id(stored.id))
}

/// Previously generated starter plugins.
pub async fn list_generated(State(state): State<SharedState>) -> Result<Json<Value>> {
    let items = state.artifact_service.list_kind("plugin_zip", None).await?;
    Ok(Json(json!({"ok": true, "items": items})))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generate_request_flat_and_wrapped() {
        let flat = parse_generate_request(json!({"plugin_slug": "hello", "title": "Hi"})).unwrap();
        assert_eq!(flat.plugin_slug.as_deref(), Some("hello"));

        let wrapped =
            parse_generate_request(json!({"spec": {"product_slug": "pmx", "title": "PMX"}}))
                .unwrap();
        assert_eq!(wrapped.product_slug.as_deref(), Some("pmx"));
        assert_eq!(wrapped.title.as_deref(), Some("PMX"));
    }

    #[test]
    fn test_parse_generate_request_rejects_wrong_types() {
        assert!(parse_generate_request(json!({"plugin_slug": 5})).is_err());
    }
}
