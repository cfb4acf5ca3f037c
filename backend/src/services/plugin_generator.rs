//! Starter plugin generator.
//!
//! Produces installable plugin archives whose entry point answers with a
//! fixed `{"ok": true, "plugin": <slug>, "title": <title>}` document. The
//! module is emitted as WAT and compiled with `wat`, so no guest toolchain
//! is needed.

use std::io::{Cursor, Write};

use serde_json::{json, Value};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use super::plugin_service::{is_valid_slug, ENTRY_POINT};
use crate::error::{AppError, Result};

const WASM_PAGE: usize = 64 * 1024;

/// One file to place in a generated archive, relative to the slug directory.
pub struct ArchiveFile {
    pub path: String,
    pub content: Vec<u8>,
}

impl ArchiveFile {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
        }
    }
}

/// Zip `files` under a single `<slug>/` top-level directory.
pub fn build_plugin_archive(slug: &str, files: &[ArchiveFile]) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for file in files {
        writer.start_file(format!("{}/{}", slug, file.path), options)?;
        writer.write_all(&file.content)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Manifest of a generated starter plugin.
pub fn starter_manifest(slug: &str, title: &str) -> Value {
    json!({
        "name": title,
        "version": "0.1.0",
        "description": format!("Starter route plugin '{}' for {}", slug, title),
        "routes": [{"method": "GET", "path": "/ping"}],
        "requirements": {"max_memory_mb": 16, "timeout_secs": 2}
    })
}

/// WAT source of a module that answers every request with the ping document.
pub fn ping_module_wat(slug: &str, title: &str) -> String {
    let body = json!({"ok": true, "plugin": slug, "title": title}).to_string();
    let response = json!({
        "status": 200,
        "headers": [["content-type", "application/json"]],
        "body": body,
    })
    .to_string();
    static_response_wat(response.as_bytes())
}

/// WAT source of a module that returns `response` (a JSON response document)
/// for every request.
pub fn static_response_wat(response: &[u8]) -> String {
    let len = response.len();
    let heap_start = (len + 15) / 16 * 16 + 1024;
    let pages = heap_start / WASM_PAGE + 1;
    let escaped: String = response.iter().map(|b| format!("\\{:02x}", b)).collect();

    format!(
        r#"(module
  (memory (export "memory") {pages})
  (global $heap (mut i32) (i32.const {heap_start}))
  (data (i32.const 0) "{escaped}")
  (func (export "alloc") (param $len i32) (result i32)
    (local $ptr i32)
    (local $end i32)
    global.get $heap
    local.set $ptr
    local.get $ptr
    local.get $len
    i32.add
    local.set $end
    (block $done
      (loop $grow
        local.get $end
        memory.size
        i32.const 16
        i32.shl
        i32.le_u
        br_if $done
        i32.const 1
        memory.grow
        i32.const -1
        i32.eq
        if
          unreachable
        end
        br $grow))
    local.get $end
    global.set $heap
    local.get $ptr)
  (func (export "handle") (param $ptr i32) (param $len i32) (result i64)
    i64.const {len}))
"#
    )
}

/// Build an installable starter plugin archive.
pub fn generate_plugin_archive(slug: &str, title: &str) -> Result<Vec<u8>> {
    if !is_valid_slug(slug) {
        return Err(AppError::Validation(format!(
            "Invalid plugin slug '{}': use lowercase letters, digits, '.', '_' or '-'",
            slug
        )));
    }
    let title = if title.trim().is_empty() { slug } else { title.trim() };

    let wat_source = ping_module_wat(slug, title);
    let wasm = wat::parse_str(&wat_source)
        .map_err(|e| AppError::Internal(format!("Failed to assemble starter plugin: {}", e)))?;
    let manifest = serde_json::to_vec_pretty(&starter_manifest(slug, title))?;
    let readme = format!(
        "# {title}\n\nStarter route plugin `{slug}`.\n\n\
         Install the zip through `POST /api/plugins/install`, then call \
         `GET /ext/{slug}/ping`.\n"
    );

    build_plugin_archive(
        slug,
        &[
            ArchiveFile::new("manifest.json", manifest),
            ArchiveFile::new(ENTRY_POINT, wasm),
            ArchiveFile::new("backend/router.wat", wat_source),
            ArchiveFile::new("README.md", readme),
        ],
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    #[test]
    fn test_ping_module_assembles() {
        let wasm = wat::parse_str(ping_module_wat("hello", "Hello \"World\"")).unwrap();
        assert_eq!(&wasm[..4], b"\0asm");
    }

    #[test]
    fn test_large_static_response_gets_enough_pages() {
        let big = vec![b'a'; 3 * WASM_PAGE];
        let wat_source = static_response_wat(&big);
        assert!(wat_source.contains("(memory (export \"memory\") 4)"));
        assert!(wat::parse_str(&wat_source).is_ok());
    }

    #[test]
    fn test_generate_plugin_archive_layout() {
        let bytes = generate_plugin_archive("hello", "Hello").unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        assert_eq!(
            names,
            vec![
                "hello/README.md",
                "hello/backend/router.wasm",
                "hello/backend/router.wat",
                "hello/manifest.json",
            ]
        );

        let mut manifest = String::new();
        archive
            .by_name("hello/manifest.json")
            .unwrap()
            .read_to_string(&mut manifest)
            .unwrap();
        let manifest: Value = serde_json::from_str(&manifest).unwrap();
        assert_eq!(manifest["routes"][0]["path"], "/ping");
    }

    #[test]
    fn test_generate_rejects_bad_slug() {
        assert!(matches!(
            generate_plugin_archive("Bad Slug", "x"),
            Err(AppError::Validation(_))
        ));
        assert!(generate_plugin_archive("../evil", "x").is_err());
    }

    #[test]
    fn test_blank_title_defaults_to_slug() {
        let wat_source = ping_module_wat("hello", "hello");
        let bytes = generate_plugin_archive("hello", "   ").unwrap();
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut wat_in_zip = String::new();
        archive
            .by_name("hello/backend/router.wat")
            .unwrap()
            .read_to_string(&mut wat_in_zip)
            .unwrap();
        assert_eq!(wat_in_zip, wat_source);
    }
}
