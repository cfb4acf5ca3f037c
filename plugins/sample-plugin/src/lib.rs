//! Notes: sample route plugin for Atlas
//!
//! Build with `cargo build --release --target wasm32-unknown-unknown` and
//! package the output as `notes/backend/router.wasm` next to
//! `notes/manifest.json` in a zip archive.
//!
//! The module exports the three symbols the host looks for:
//! `memory`, `alloc(len) -> ptr` and `handle(ptr, len) -> (ptr << 32) | len`.
//! It imports nothing, so it runs in an empty sandbox.

use serde::{Deserialize, Serialize};
use serde_json::json;

/// Request document written by the host.
#[derive(Debug, Deserialize)]
pub struct Request {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
    pub context: Context,
}

#[derive(Debug, Deserialize)]
pub struct Context {
    pub slug: String,
    pub base_url: String,
}

/// Response document read back by the host.
#[derive(Debug, Serialize)]
pub struct Response {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Response {
    fn json(status: u16, value: serde_json::Value) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "application/json".into())],
            body: value.to_string(),
        }
    }

    fn text(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: vec![("content-type".into(), "text/plain; charset=utf-8".into())],
            body: body.into(),
        }
    }
}

/// Route one request. Pure, so it is testable off-target.
pub fn route(request: &Request) -> Response {
    match (request.method.as_str(), request.path.as_str()) {
        ("GET", "/ping") => Response::json(200, json!({"ok": true, "plugin": request.context.slug})),
        ("GET", "/whoami") => Response::json(
            200,
            json!({
                "base_url": request.context.base_url,
                "query": request.query,
                "user_agent": header(request, "user-agent"),
            }),
        ),
        ("POST", "/echo") => {
            let content_type = header(request, "content-type")
                .unwrap_or("text/plain; charset=utf-8")
                .to_string();
            Response {
                status: 200,
                headers: vec![("content-type".into(), content_type)],
                body: request.body.clone(),
            }
        }
        _ => Response::text(404, format!("no route {} {}", request.method, request.path)),
    }
}

fn header<'a>(request: &'a Request, name: &str) -> Option<&'a str> {
    request
        .headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.as_str())
}

fn handle_bytes(input: &[u8]) -> Vec<u8> {
    let response = match serde_json::from_slice::<Request>(input) {
        Ok(request) => route(&request),
        Err(e) => Response::text(400, format!("bad request document: {}", e)),
    };
    serde_json::to_vec(&response).unwrap_or_else(|_| br#"{"status":500}"#.to_vec())
}

fn leak(bytes: Vec<u8>) -> (i32, i32) {
    let boxed = bytes.into_boxed_slice();
    let len = boxed.len() as i32;
    let ptr = Box::leak(boxed).as_mut_ptr() as i32;
    (ptr, len)
}

/// Hand the host a buffer of `len` bytes. Each request gets a fresh instance,
/// so buffers are never freed.
#[no_mangle]
pub extern "C" fn alloc(len: i32) -> i32 {
    leak(vec![0u8; len.max(0) as usize]).0
}

/// # Safety
///
/// `ptr..ptr+len` must be a buffer returned by [`alloc`].
#[no_mangle]
pub unsafe extern "C" fn handle(ptr: i32, len: i32) -> i64 {
    let input = std::slice::from_raw_parts(ptr as *const u8, len.max(0) as usize);
    let (out_ptr, out_len) = leak(handle_bytes(input));
    ((out_ptr as u32 as i64) << 32) | (out_len as u32 as i64)
}
