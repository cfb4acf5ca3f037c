//! Common test utilities for backend integration tests
//!
//! Every [`TestApp`] owns a temporary data directory holding the SQLite
//! database, installed plugins, artifacts and exports. Requests go straight
//! into the router with `tower::ServiceExt::oneshot`.

#![allow(dead_code)]

use std::sync::Arc;

use atlas_backend::api::{routes::create_router, AppState, SharedState};
use atlas_backend::config::Config;
use atlas_backend::db;
use atlas_backend::services::plugin_registry::PluginRegistry;
use axum::body::{to_bytes, Body};
use axum::http::{header, HeaderMap, Method, Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tempfile::TempDir;
use tower::ServiceExt;

pub const TEST_ADMIN_TOKEN: &str = "test-admin-token";

const MULTIPART_BOUNDARY: &str = "atlas-test-boundary-7d3f";
const MAX_RESPONSE_BYTES: usize = 64 * 1024 * 1024;

/// A fully wired application over a throwaway data directory.
pub struct TestApp {
    pub dir: Arc<TempDir>,
    pub config: Config,
    pub state: SharedState,
}

/// Collected response parts.
pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: bytes::Bytes,
}

impl TestResponse {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap_or_else(|e| {
            panic!(
                "response body is not JSON ({}): {}",
                e,
                String::from_utf8_lossy(&self.body)
            )
        })
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

impl TestApp {
    /// App with admin routes left open.
    pub async fn new() -> Self {
        Self::build(Arc::new(tempdir()), None).await
    }

    /// App whose admin routes require [`TEST_ADMIN_TOKEN`].
    pub async fn with_admin_token() -> Self {
        Self::build(Arc::new(tempdir()), Some(TEST_ADMIN_TOKEN.to_string())).await
    }

    /// Simulate a process restart: fresh mount table over the same data.
    pub async fn restart(&self) -> Self {
        Self::build(self.dir.clone(), self.config.admin_token.clone()).await
    }

    async fn build(dir: Arc<TempDir>, admin_token: Option<String>) -> Self {
        let mut config = Config::for_data_dir(dir.path());
        config.admin_token = admin_token;

        let pool = db::create_pool(&config.database_url)
            .await
            .expect("Failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");

        let registry = Arc::new(PluginRegistry::new().expect("Failed to create plugin registry"));
        let state = Arc::new(AppState::new(config.clone(), pool, registry));
        state
            .plugin_service
            .mount_enabled_at_startup()
            .await
            .expect("Startup mount failed");

        Self { dir, config, state }
    }

    pub fn router(&self) -> Router {
        create_router(self.state.clone())
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self
            .router()
            .oneshot(request)
            .await
            .expect("Router is infallible");
        let status = response.status();
        let headers = response.headers().clone();
        let body = to_bytes(response.into_body(), MAX_RESPONSE_BYTES)
            .await
            .expect("Failed to read response body");
        TestResponse {
            status,
            headers,
            body,
        }
    }

    pub async fn get(&self, uri: &str) -> TestResponse {
        self.send(request(Method::GET, uri).body(Body::empty()).unwrap())
            .await
    }

    pub async fn post_json(&self, uri: &str, payload: &Value) -> TestResponse {
        self.send(json_request(Method::POST, uri, payload, None)).await
    }

    pub async fn post_json_as_admin(&self, uri: &str, payload: &Value) -> TestResponse {
        self.send(json_request(Method::POST, uri, payload, Some(TEST_ADMIN_TOKEN)))
            .await
    }

    /// POST with no body, optionally carrying the admin token.
    pub async fn post_empty(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = request(Method::POST, uri);
        if let Some(token) = token {
            builder = builder.header("x-atlas-admin-token", token);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    pub async fn delete(&self, uri: &str, token: Option<&str>) -> TestResponse {
        let mut builder = request(Method::DELETE, uri);
        if let Some(token) = token {
            builder = builder.header("x-atlas-admin-token", token);
        }
        self.send(builder.body(Body::empty()).unwrap()).await
    }

    /// Upload `archive` to the plugin install endpoint.
    pub async fn install(&self, archive: Vec<u8>, token: Option<&str>) -> TestResponse {
        let mut builder = request(Method::POST, "/api/plugins/install").header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", MULTIPART_BOUNDARY),
        );
        if let Some(token) = token {
            builder = builder.header("x-atlas-admin-token", token);
        }
        self.send(builder.body(Body::from(multipart_file(&archive))).unwrap())
            .await
    }
}

fn tempdir() -> TempDir {
    tempfile::tempdir().expect("Failed to create temp dir")
}

fn request(method: Method, uri: &str) -> axum::http::request::Builder {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::HOST, "localhost:8000")
}

fn json_request(method: Method, uri: &str, payload: &Value, token: Option<&str>) -> Request<Body> {
    let mut builder = request(method, uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header("x-atlas-admin-token", token);
    }
    builder.body(Body::from(payload.to_string())).unwrap()
}

/// Single-part `multipart/form-data` body with the field `file`.
pub fn multipart_file(content: &[u8]) -> Vec<u8> {
    let mut body = Vec::with_capacity(content.len() + 256);
    body.extend_from_slice(
        format!(
            "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"plugin.zip\"\r\n\
             Content-Type: application/zip\r\n\r\n",
            b = MULTIPART_BOUNDARY
        )
        .as_bytes(),
    );
    body.extend_from_slice(content);
    body.extend_from_slice(format!("\r\n--{}--\r\n", MULTIPART_BOUNDARY).as_bytes());
    body
}

/// List the entry names of a zip archive.
pub fn zip_entries(data: &[u8]) -> Vec<String> {
    let archive = zip::ZipArchive::new(std::io::Cursor::new(data)).expect("Not a zip archive");
    archive.file_names().map(str::to_string).collect()
}

/// Read one entry of a zip archive as text.
pub fn zip_entry_text(data: &[u8], name: &str) -> String {
    use std::io::Read;

    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(data)).expect("Not a zip archive");
    let mut file = archive
        .by_name(name)
        .unwrap_or_else(|_| panic!("missing zip entry {}", name));
    let mut text = String::new();
    file.read_to_string(&mut text).expect("Entry is not UTF-8");
    text
}
