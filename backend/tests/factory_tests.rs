//! Scaffold export, download and starter plugin tests.

mod common;

use axum::http::StatusCode;
use common::{zip_entries, zip_entry_text, TestApp};
use serde_json::{json, Value};

const PMX: &str = "atlas_pmx_onprem_v1";

fn platform_spec(modules: Value) -> Value {
    json!({
        "platform": {"slug": "acme", "name": "Atlas - Acme", "domain": "construction"},
        "modules": modules,
        "deploy": {"profile": "onprem_dockercompose"}
    })
}

#[tokio::test]
async fn test_factory_health_and_presets() {
    let app = TestApp::new().await;

    let resp = app.get("/api/factory/health").await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.json()["ok"], true);

    let presets = app.get("/api/factory/presets").await.json();
    let items = presets["items"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    let available: Vec<&str> = items
        .iter()
        .filter(|p| p["available"] == true)
        .map(|p| p["preset_id"].as_str().unwrap())
        .collect();
    assert_eq!(available, vec![PMX]);

    let schema = app.get("/api/factory/spec-schema").await.json();
    assert!(schema["modules"].is_array());
}

#[tokio::test]
async fn test_export_requires_exactly_one_source() {
    let app = TestApp::new().await;

    for payload in [
        json!({}),
        json!({"preset_id": "", "spec": {}}),
        json!({"preset_id": PMX, "spec": platform_spec(json!(["chat"]))}),
    ] {
        let resp = app.post_json("/api/factory/export", &payload).await;
        assert_eq!(resp.status, StatusCode::BAD_REQUEST, "payload {}", payload);
        assert_eq!(
            resp.json()["message"],
            "Provide either {preset_id} OR {spec}."
        );
    }
}

#[tokio::test]
async fn test_preset_export_and_download() {
    let app = TestApp::new().await;

    let resp = app
        .post_json("/api/factory/export", &json!({"preset_id": PMX}))
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    let body = resp.json();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["mode"], "preset");
    assert_eq!(body["artifact"], format!("{}.zip", PMX));
    assert_eq!(
        body["download_url"],
        format!("/api/factory/download/{}.zip", PMX)
    );

    let resp = app
        .get(body["download_url"].as_str().unwrap())
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert_eq!(resp.header("content-type"), Some("application/zip"));
    let entries = zip_entries(&resp.body);
    assert!(entries.contains(&"backend/app/main.py".to_string()));
    assert!(entries.contains(&"ops/docker-compose.yml".to_string()));

    let listing = app.get("/api/factory/exports").await.json();
    let listed = &listing["items"][0];
    assert_eq!(listed["artifact"], format!("{}.zip", PMX));
    assert_eq!(listed["sha256"], body["sha256"]);
    assert_eq!(listed["bytes"], resp.body.len());

    // The export is also kept in the artifact store
    let stored = app
        .get("/api/engines/artifacts?kind=export_zip")
        .await
        .json();
    assert_eq!(stored["items"][0]["id"], body["artifact_id"]);
    assert_eq!(stored["items"][0]["meta"]["mode"], "preset");
}

#[tokio::test]
async fn test_reserved_and_unknown_presets_rejected() {
    let app = TestApp::new().await;

    let resp = app
        .post_json("/api/factory/export", &json!({"preset_id": "atlas_dms_onprem_v1"}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert!(resp.json()["message"].as_str().unwrap().contains(PMX));

    let resp = app
        .post_json("/api/factory/export", &json!({"preset_id": "nope"}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
    assert_eq!(resp.json()["message"], "Unknown preset 'nope'");

    assert!(app.get("/api/factory/exports").await.json()["items"]
        .as_array()
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_spec_export_assembles_templates() {
    let app = TestApp::new().await;

    let resp = app
        .post_json(
            "/api/factory/export",
            &json!({"spec": platform_spec(json!(["projects", "chat", "teleport", "chat"]))}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    let body = resp.json();
    assert_eq!(body["mode"], "spec");
    assert_eq!(body["artifact"], "acme_onprem_v1.zip");
    assert_eq!(body["skipped_modules"], json!(["teleport"]));

    let resp = app.get("/api/factory/download/acme_onprem_v1.zip").await;
    assert_eq!(resp.status, StatusCode::OK);
    let entries = zip_entries(&resp.body);
    for expected in [
        "backend/app/main.py",
        "backend/modules/projects/router.py",
        "backend/modules/chat/router.py",
        "frontend/index.html",
        "ops/docker-compose.yml",
        "README_DEPLOY.md",
        ".env.example",
    ] {
        assert!(
            entries.contains(&expected.to_string()),
            "missing {} in {:?}",
            expected,
            entries
        );
    }
    assert!(!entries.iter().any(|e| e.contains("modules/ocr")));
    assert!(!entries.iter().any(|e| e.contains("teleport")));
    assert_eq!(
        zip_entry_text(&resp.body, "README_DEPLOY.md"),
        "Run: docker compose up -d\n"
    );
}

#[tokio::test]
async fn test_spec_export_rejects_bad_profile_and_slug() {
    let app = TestApp::new().await;

    let mut spec = platform_spec(json!(["chat"]));
    spec["deploy"]["profile"] = json!("kubernetes");
    let resp = app
        .post_json("/api/factory/export", &json!({"spec": spec}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let mut spec = platform_spec(json!(["chat"]));
    spec["platform"]["slug"] = json!("../escape");
    let resp = app
        .post_json("/api/factory/export", &json!({"spec": spec}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);

    let resp = app
        .post_json("/api/factory/export", &json!({"spec": {"modules": "chat"}}))
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_download_rejects_traversal_and_missing() {
    let app = TestApp::new().await;
    app.post_json("/api/factory/export", &json!({"preset_id": PMX}))
        .await;

    for name in ["missing.zip", "..%2Fapp.db", ".hidden.zip"] {
        let resp = app.get(&format!("/api/factory/download/{}", name)).await;
        assert_eq!(resp.status, StatusCode::NOT_FOUND, "{}", name);
    }
}

#[tokio::test]
async fn test_generate_plugin_round_trips_through_install() {
    let app = TestApp::new().await;

    let resp = app
        .post_json(
            "/api/admin/factory/generate-plugin",
            &json!({"spec": {"plugin_slug": "pmx-tools", "title": "PMX Tools"}}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::OK, "{}", resp.text());
    assert_eq!(resp.header("content-type"), Some("application/zip"));
    assert!(resp
        .header("content-disposition")
        .unwrap()
        .contains("pmx-tools.zip"));
    let artifact_id = resp.header("x-atlas-artifact-id").unwrap().to_string();

    let entries = zip_entries(&resp.body);
    assert!(entries.contains(&"pmx-tools/manifest.json".to_string()));
    assert!(entries.contains(&"pmx-tools/backend/router.wasm".to_string()));

    let listed = app.get("/api/admin/factory/list").await.json();
    assert_eq!(listed["items"][0]["id"], artifact_id);

    let install = app.install(resp.body.to_vec(), None).await;
    assert_eq!(install.status, StatusCode::OK);
    let ping = app.get("/ext/pmx-tools/ping").await.json();
    assert_eq!(ping["title"], "PMX Tools");
}

#[tokio::test]
async fn test_generate_plugin_defaults_slug() {
    let app = TestApp::new().await;
    let resp = app
        .post_json("/api/admin/factory/generate-plugin", &json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::OK);
    assert!(zip_entries(&resp.body).contains(&"generated-plugin/manifest.json".to_string()));

    let resp = app
        .post_json(
            "/api/admin/factory/generate-plugin",
            &json!({"plugin_slug": "Bad Slug"}),
        )
        .await;
    assert_eq!(resp.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_factory_requires_token() {
    let app = TestApp::with_admin_token().await;

    let status = app.get("/api/admin/factory/status").await.json();
    assert_eq!(status["enabled"], true);

    let resp = app
        .post_json("/api/admin/factory/generate-plugin", &json!({}))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app
        .post_json("/api/factory/export", &json!({"preset_id": PMX}))
        .await;
    assert_eq!(resp.status, StatusCode::UNAUTHORIZED);

    let resp = app
        .post_json_as_admin("/api/factory/export", &json!({"preset_id": PMX}))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    // Downloads stay public
    let resp = app
        .get(&format!("/api/factory/download/{}.zip", PMX))
        .await;
    assert_eq!(resp.status, StatusCode::OK);

    let open = TestApp::new().await;
    assert_eq!(
        open.get("/api/admin/factory/status").await.json()["enabled"],
        false
    );
}
