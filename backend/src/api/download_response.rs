//! Raw file responses for artifact, export and generated plugin downloads.

use axum::http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;

/// Carries the artifact-store id of a returned file.
pub const X_ATLAS_ARTIFACT_ID: HeaderName = HeaderName::from_static("x-atlas-artifact-id");

/// Binary download with an attachment filename.
pub struct FileDownload {
    pub data: Bytes,
    pub content_type: &'static str,
    pub filename: String,
    pub artifact_id: Option<String>,
}

impl FileDownload {
    /// Content type inferred from the filename extension.
    pub fn new(data: Bytes, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        Self {
            content_type: content_type_for(&filename),
            data,
            filename,
            artifact_id: None,
        }
    }

    pub fn with_artifact_id(mut self, id: impl Into<String>) -> Self {
        self.artifact_id = Some(id.into());
        self
    }
}

/// Content type for the extensions the backend produces.
pub fn content_type_for(filename: &str) -> &'static str {
    let ext = filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "zip" => "application/zip",
        "md" => "text/markdown; charset=utf-8",
        "csv" => "text/csv; charset=utf-8",
        "json" => "application/json",
        "txt" => "text/plain; charset=utf-8",
        _ => "application/octet-stream",
    }
}

impl IntoResponse for FileDownload {
    fn into_response(self) -> Response {
        let disposition = format!(
            "attachment; filename=\"{}\"",
            self.filename.replace(['"', '\\'], "_")
        );

        let mut response = (
            StatusCode::OK,
            [
                (CONTENT_TYPE, HeaderValue::from_static(self.content_type)),
                (CONTENT_LENGTH, HeaderValue::from(self.data.len())),
            ],
            self.data,
        )
            .into_response();

        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&disposition) {
            headers.insert(CONTENT_DISPOSITION, value);
        }
        if let Some(id) = self.artifact_id.and_then(|id| HeaderValue::from_str(&id).ok()) {
            headers.insert(X_ATLAS_ARTIFACT_ID, id);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_type_for() {
        assert_eq!(content_type_for("atlas_pmx_onprem_v1.zip"), "application/zip");
        assert_eq!(content_type_for("readiness.md"), "text/markdown; charset=utf-8");
        assert_eq!(content_type_for("COMPARE.CSV"), "text/csv; charset=utf-8");
        assert_eq!(content_type_for("noext"), "application/octet-stream");
    }

    #[tokio::test]
    async fn test_file_download_headers() {
        let resp = FileDownload::new(Bytes::from_static(b"a,b\r\n"), "compare.csv")
            .with_artifact_id("abc123")
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(resp.headers()[CONTENT_TYPE], "text/csv; charset=utf-8");
        assert_eq!(resp.headers()[CONTENT_LENGTH], "5");
        assert_eq!(
            resp.headers()[CONTENT_DISPOSITION],
            "attachment; filename=\"compare.csv\""
        );
        assert_eq!(resp.headers()["x-atlas-artifact-id"], "abc123");
        let body = axum::body::to_bytes(resp.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"a,b\r\n");
    }
}
