//! Host/guest data exchanged with route plugins.
//!
//! A plugin is a WebAssembly core module with no imports that exports:
//!
//! - `memory`: its linear memory
//! - `alloc(len: i32) -> i32`: returns a buffer of `len` bytes for the host to fill
//! - `handle(ptr: i32, len: i32) -> i64`: reads the JSON request at `ptr..ptr+len`
//!   and returns `(resp_ptr << 32) | resp_len` pointing at a JSON response
//!
//! Bodies travel as UTF-8 text in `body`; binary payloads use `body_base64`.

use base64::Engine as _;
use serde::{Deserialize, Serialize};

/// Request handed to a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmHttpRequest {
    pub method: String,
    /// Path relative to the plugin mount, always starting with `/`
    pub path: String,
    pub query: String,
    pub headers: Vec<(String, String)>,
    /// Body as text (lossy for non UTF-8 input)
    pub body: String,
    /// Body as base64, set only when it is not valid UTF-8
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_base64: Option<String>,
    pub context: WasmRouteContext,
}

impl WasmHttpRequest {
    pub fn new(
        method: &str,
        path: String,
        query: String,
        headers: Vec<(String, String)>,
        body: &[u8],
        context: WasmRouteContext,
    ) -> Self {
        let (body, body_base64) = match std::str::from_utf8(body) {
            Ok(text) => (text.to_string(), None),
            Err(_) => (
                String::from_utf8_lossy(body).into_owned(),
                Some(base64::engine::general_purpose::STANDARD.encode(body)),
            ),
        };
        Self {
            method: method.to_string(),
            path,
            query,
            headers,
            body,
            body_base64,
            context,
        }
    }
}

/// Where the plugin is mounted, for building absolute links.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmRouteContext {
    pub slug: String,
    pub base_url: String,
}

/// Response produced by a plugin.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WasmHttpResponse {
    #[serde(default = "default_status")]
    pub status: u16,
    #[serde(default)]
    pub headers: Vec<(String, String)>,
    #[serde(default)]
    pub body: String,
    #[serde(default)]
    pub body_base64: Option<String>,
}

fn default_status() -> u16 {
    200
}

impl WasmHttpResponse {
    /// Decoded body bytes, preferring `body_base64` when present.
    pub fn body_bytes(&self) -> Result<Vec<u8>, String> {
        match self.body_base64 {
            Some(ref encoded) => base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| format!("invalid body_base64: {}", e)),
            None => Ok(self.body.as_bytes().to_vec()),
        }
    }
}

/// Split the `handle` return value into (ptr, len).
pub fn unpack_ptr_len(packed: i64) -> (u32, u32) {
    let packed = packed as u64;
    ((packed >> 32) as u32, (packed & 0xffff_ffff) as u32)
}

/// Inverse of [`unpack_ptr_len`].
pub fn pack_ptr_len(ptr: u32, len: u32) -> i64 {
    (((ptr as u64) << 32) | len as u64) as i64
}
