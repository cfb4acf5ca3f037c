//! Spec validation, readiness scoring and artifact endpoints.

use axum::{
    extract::{Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::api::download_response::FileDownload;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::module_spec::{ReadinessResult, SpecValidation};
use crate::services::readiness_service::{score_spec, ReadinessReport};
use crate::services::spec_validator::{spec_schema, validate_spec};

pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/validate", post(validate))
        .route("/readiness", post(readiness))
        .route("/readiness/report", post(readiness_report))
        .route("/compare/csv", post(compare_csv))
        .route("/artifacts", get(list_artifacts))
        .route("/artifacts/:id", get(download_artifact))
        .route("/artifacts/:id/meta", get(artifact_meta))
        .route("/spec/schema", get(schema))
}

/// An object under `spec` is the spec; otherwise the body itself is.
fn unwrap_spec(payload: &Value) -> &Value {
    match payload.get("spec") {
        Some(spec) if spec.is_object() => spec,
        _ => payload,
    }
}

pub async fn validate(Json(payload): Json<Value>) -> Json<SpecValidation> {
    Json(validate_spec(unwrap_spec(&payload)))
}

pub async fn readiness(Json(payload): Json<Value>) -> Json<ReadinessResult> {
    Json(score_spec(unwrap_spec(&payload)))
}

pub async fn readiness_report(
    State(state): State<SharedState>,
    Json(payload): Json<Value>,
) -> Result<Json<ReadinessReport>> {
    let report = state
        .readiness_service
        .report(unwrap_spec(&payload))
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct ComparePayload {
    pub a: Value,
    pub b: Value,
}

pub async fn compare_csv(
    State(state): State<SharedState>,
    Json(payload): Json<ComparePayload>,
) -> Result<impl IntoResponse> {
    let comparison = state
        .readiness_service
        .compare(&payload.a, &payload.b)
        .await?;
    Ok(FileDownload::new(comparison.csv.into(), "compare.csv")
        .with_artifact_id(comparison.artifact.id))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub kind: Option<String>,
}

pub async fn list_artifacts(
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Value>> {
    let items = match query.kind.as_deref().filter(|k| !k.is_empty()) {
        Some(kind) => state.artifact_service.list_kind(kind, query.limit).await?,
        None => state.artifact_service.list(query.limit).await?,
    };
    Ok(Json(json!({"ok": true, "items": items})))
}

pub async fn download_artifact(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse> {
    let (artifact, content) = state.artifact_service.download(&id).await?;
    Ok(FileDownload::new(content, artifact.filename.clone()).with_artifact_id(artifact.id))
}

pub async fn artifact_meta(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<Value>> {
    let item = state.artifact_service.get(&id).await?;
    Ok(Json(json!({"ok": true, "item": item})))
}

pub async fn schema() -> Json<Value> {
    Json(json!({"ok": true, "schema": spec_schema()}))
}
