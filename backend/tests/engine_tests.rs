//! Spec validation, readiness and artifact store tests over HTTP.

mod common;

use atlas_backend::storage::filesystem::FilesystemStorage;
use axum::http::StatusCode;
use common::TestApp;
use serde_json::{json, Value};

fn widget() -> Value {
    json!({
        "name": "Widget",
        "kind": "service",
        "modules": [{"id": "m1", "type": "fastapi_router"}],
        "meta": {"owner": "x"}
    })
}

#[tokio::test]
async fn test_validate_reports_all_errors() {
    let app = TestApp::new().await;

    let resp = app.post_json("/api/engines/validate", &widget()).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json(), json!({"valid": true, "errors": []}));

    let resp = app
        .post_json("/api/engines/validate", &json!({"kind": "gadget", "modules": []}))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["valid"], false);
    assert_eq!(
        body["errors"],
        json!([
            "name must be a string (min length 2)",
            "kind must be one of: plugin|service|app|bundle",
            "modules must be a non-empty array"
        ])
    );
}

#[tokio::test]
async fn test_validate_accepts_wrapped_spec() {
    let app = TestApp::new().await;
    let resp = app
        .post_json("/api/engines/validate", &json!({"spec": widget()}))
        .await;
    assert_eq!(resp.json()["valid"], true);
}

#[tokio::test]
async fn test_readiness_scores_widget_warn() {
    let app = TestApp::new().await;
    let resp = app.post_json("/api/engines/readiness", &widget()).await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["score"], 65);
    assert_eq!(body["status"], "WARN");
    assert_eq!(body["checks"].as_array().unwrap().len(), 6);

    // Scoring is pure: nothing is archived
    let listed = app.get("/api/engines/artifacts").await.json();
    assert!(listed["items"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_readiness_report_is_stored_and_downloadable() {
    let app = TestApp::new().await;
    let resp = app
        .post_json("/api/engines/readiness/report", &widget())
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["readiness"]["score"], 65);
    let markdown = body["markdown"].as_str().unwrap().to_string();
    assert!(markdown.starts_with("# Readiness Report: Widget\n"));
    assert!(markdown.contains("- Status: **WARN**"));

    let id = body["artifact"]["id"].as_str().unwrap().to_string();
    assert_eq!(body["artifact"]["kind"], "readiness_md");

    let resp = app.get(&format!("/api/engines/artifacts/{}", id)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), markdown);
    assert_eq!(resp.header("x-atlas-artifact-id"), Some(id.as_str()));
    assert!(resp
        .header("content-disposition")
        .unwrap()
        .contains("readiness.md"));

    let meta = app
        .get(&format!("/api/engines/artifacts/{}/meta", id))
        .await
        .json();
    assert_eq!(meta["item"]["kind"], "readiness_md");
    assert_eq!(meta["item"]["meta"]["name"], "Widget");
    assert_eq!(meta["item"]["bytes"], markdown.len());
}

#[tokio::test]
async fn test_compare_csv_carries_artifact_header() {
    let app = TestApp::new().await;
    let full = json!({
        "name": "Everything",
        "kind": "app",
        "modules": [
            {"id": "api", "type": "fastapi_router"},
            {"id": "ui", "type": "react_page"},
            {"id": "db", "type": "db_migration"},
            {"id": "jobs", "type": "worker"}
        ],
        "meta": {"owner": "ops"}
    });

    let resp = app
        .post_json("/api/engines/compare/csv", &json!({"a": widget(), "b": full}))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("content-type"), Some("text/csv; charset=utf-8"));
    let id = resp
        .header("x-atlas-artifact-id")
        .expect("artifact id header")
        .to_string();

    let csv = resp.text();
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("item,a,b,delta"));
    assert_eq!(lines.next(), Some("score,65,100,-35"));
    assert_eq!(lines.next(), Some("status,WARN,PASS,"));

    let stored = app.get(&format!("/api/engines/artifacts/{}", id)).await;
    assert_eq!(stored.text(), csv);
}

#[tokio::test]
async fn test_compare_requires_both_sides() {
    let app = TestApp::new().await;
    let resp = app
        .post_json("/api/engines/compare/csv", &json!({"a": widget()}))
        .await;
    assert!(resp.status.is_client_error());
}

#[tokio::test]
async fn test_artifact_listing_filters_and_orders() {
    let app = TestApp::new().await;
    app.post_json("/api/engines/readiness/report", &widget())
        .await;
    app.post_json(
        "/api/engines/compare/csv",
        &json!({"a": widget(), "b": widget()}),
    )
    .await;

    let all = app.get("/api/engines/artifacts").await.json();
    let kinds: Vec<&str> = all["items"]
        .as_array()
        .unwrap()
        .iter()
        .map(|i| i["kind"].as_str().unwrap())
        .collect();
    assert_eq!(kinds, vec!["compare_csv", "readiness_md"]);

    let limited = app.get("/api/engines/artifacts?limit=1").await.json();
    assert_eq!(limited["items"].as_array().unwrap().len(), 1);

    let filtered = app
        .get("/api/engines/artifacts?kind=readiness_md")
        .await
        .json();
    let items = filtered["items"].as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["kind"], "readiness_md");
}

#[tokio::test]
async fn test_missing_artifact_file_is_gone() {
    let app = TestApp::new().await;
    let body = app
        .post_json("/api/engines/readiness/report", &widget())
        .await
        .json();
    let id = body["artifact"]["id"].as_str().unwrap();
    let key = body["artifact"]["path"].as_str().unwrap();

    let path = FilesystemStorage::new(app.config.artifacts_dir.clone())
        .key_to_path(key)
        .unwrap();
    std::fs::remove_file(path).unwrap();

    let resp = app.get(&format!("/api/engines/artifacts/{}", id)).await;
    assert_eq!(resp.status, StatusCode::GONE);
    assert_eq!(resp.json()["code"], "GONE");

    // Metadata survives the file
    let resp = app.get(&format!("/api/engines/artifacts/{}/meta", id)).await;
    assert_eq!(resp.status, StatusCode::OK);
}

#[tokio::test]
async fn test_unknown_artifact_is_not_found() {
    let app = TestApp::new().await;
    let resp = app.get("/api/engines/artifacts/doesnotexist").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
    let resp = app.get("/api/engines/artifacts/doesnotexist/meta").await;
    assert_eq!(resp.status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_spec_schema_document() {
    let app = TestApp::new().await;
    let resp = app.get("/api/engines/spec/schema").await;
    assert_eq!(resp.status, StatusCode::OK);
    let body = resp.json();
    assert_eq!(body["ok"], true);
    assert!(body["schema"].is_object());
}

#[tokio::test]
async fn test_store_accepts_filename_with_dot_run() {
    let app = TestApp::new().await;
    let stored = app
        .state
        .artifact_service
        .store("note", "v1..final.md", bytes::Bytes::from_static(b"x"), json!({}))
        .await
        .unwrap();
    assert!(stored.path.ends_with("__v1_final.md"));

    let resp = app.get(&format!("/api/engines/artifacts/{}", stored.id)).await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.text(), "x");
    assert!(resp
        .header("content-disposition")
        .unwrap()
        .contains("v1_final.md"));
}

#[tokio::test]
async fn test_report_reads_wrapped_spec_alongside_other_keys() {
    let app = TestApp::new().await;
    let resp = app
        .post_json(
            "/api/engines/readiness/report",
            &json!({"spec": widget(), "note": "x"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["readiness"]["score"], 65);

    let resp = app
        .post_json("/api/engines/validate", &json!({"spec": widget(), "note": "x"}))
        .await;
    assert_eq!(resp.json()["valid"], true);
}
