//! Dispatch of `/ext/:slug/*path` to mounted route plugins.
//!
//! The request is serialized for the sandbox, the plugin's manifest route
//! table is consulted first, and the plugin's JSON response is turned back
//! into an HTTP response.

use axum::{
    body::{Body, Bytes},
    extract::{Path, RawQuery, State},
    http::{header, HeaderMap, HeaderName, HeaderValue, Method, Response, StatusCode},
    response::IntoResponse,
    routing::any,
    Router,
};

use crate::api::middleware::admin::ADMIN_TOKEN_HEADER;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::services::wasm_bindings::{WasmHttpRequest, WasmHttpResponse, WasmRouteContext};
use crate::services::wasm_runtime::WasmError;

/// Mounted at `/ext`.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/:slug", any(dispatch))
        .route("/:slug/", any(dispatch))
        .route("/:slug/*path", any(dispatch))
}

/// Extract a named parameter from the path params list.
fn extract_param<'a>(params: &'a [(String, String)], key: &str) -> &'a str {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
        .unwrap_or("")
}

/// Normalize a sub-path to always have a leading slash.
fn normalize_path(sub_path: &str) -> String {
    if sub_path.starts_with('/') {
        sub_path.to_string()
    } else {
        format!("/{}", sub_path)
    }
}

fn scheme_for_host(host: &str) -> &'static str {
    if host.contains("localhost") || host.contains("127.0.0.1") {
        "http"
    } else {
        "https"
    }
}

/// Credentials never cross into the sandbox.
fn is_withheld(name: &HeaderName) -> bool {
    *name == header::AUTHORIZATION
        || *name == header::PROXY_AUTHORIZATION
        || *name == header::COOKIE
        || *name == ADMIN_TOKEN_HEADER
}

/// Convert HTTP headers to string pairs, skipping non-UTF-8 values and
/// withheld credentials.
fn headers_to_pairs(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .filter(|(k, _)| !is_withheld(k))
        .filter_map(|(k, v)| v.to_str().ok().map(|v| (k.to_string(), v.to_string())))
        .collect()
}

fn build_request(
    headers: &HeaderMap,
    method: &Method,
    slug: &str,
    path: String,
    query: Option<String>,
    body: &[u8],
) -> WasmHttpRequest {
    let host = headers
        .get("host")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("localhost:8000");
    let context = WasmRouteContext {
        slug: slug.to_string(),
        base_url: format!("{}://{}/ext/{}", scheme_for_host(host), host, slug),
    };
    WasmHttpRequest::new(
        method.as_str(),
        path,
        query.unwrap_or_default(),
        headers_to_pairs(headers),
        body,
        context,
    )
}

async fn dispatch(
    State(state): State<SharedState>,
    method: Method,
    headers: HeaderMap,
    Path(params): Path<Vec<(String, String)>>,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Result<Response<Body>> {
    let slug = extract_param(&params, "slug");
    let path = normalize_path(extract_param(&params, "path"));

    let plugin = state
        .plugin_registry
        .get(slug)
        .await
        .ok_or_else(|| AppError::NotFound(format!("No plugin mounted at '{}'", slug)))?;

    if !plugin.manifest.allows(method.as_str(), &path) {
        return Err(AppError::NotFound(format!(
            "Plugin '{}' has no route {} {}",
            slug, method, path
        )));
    }

    let request = build_request(&headers, &method, slug, path, query, &body);
    let response = state
        .plugin_registry
        .execute(plugin, request)
        .await
        .map_err(|e| plugin_error(slug, e))?;

    wasm_response_to_http(response)
}

fn plugin_error(slug: &str, e: WasmError) -> AppError {
    tracing::error!(plugin = slug, "Plugin request failed: {}", e);
    AppError::Plugin(format!("Plugin '{}' failed: {}", slug, e))
}

/// Convert a plugin response into an HTTP response.
fn wasm_response_to_http(response: WasmHttpResponse) -> Result<Response<Body>> {
    let status = StatusCode::from_u16(response.status)
        .map_err(|_| AppError::Plugin(format!("Invalid status code {}", response.status)))?;
    let body = response.body_bytes().map_err(AppError::Plugin)?;

    let mut http = (status, body).into_response();
    let out = http.headers_mut();
    out.remove(header::CONTENT_TYPE);
    for (key, value) in &response.headers {
        match (
            HeaderName::from_bytes(key.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                out.append(name, value);
            }
            _ => tracing::debug!(header = %key, "Dropping invalid plugin response header"),
        }
    }
    Ok(http)
}
