//! Scaffold export request and response models.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/factory/export`. Exactly one field must be set.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ExportRequest {
    pub preset_id: Option<String>,
    pub spec: Option<serde_json::Value>,
}

/// Platform spec driving the template exporter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlatformSpec {
    pub platform: PlatformInfo,
    #[serde(default)]
    pub modules: Vec<String>,
    #[serde(default)]
    pub deploy: DeployConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PlatformInfo {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub domain: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeployConfig {
    pub profile: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportMode {
    Preset,
    Spec,
}

/// Response of a successful export.
#[derive(Debug, Clone, Serialize)]
pub struct ExportResult {
    pub status: &'static str,
    /// Zip filename inside the export directory
    pub artifact: String,
    pub download_url: String,
    pub sha256: String,
    /// Id of the copy recorded in the artifact store
    pub artifact_id: String,
    pub mode: ExportMode,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub skipped_modules: Vec<String>,
}

/// Entry of `GET /api/factory/exports`.
#[derive(Debug, Clone, Serialize)]
pub struct ExportListing {
    pub artifact: String,
    pub bytes: u64,
    pub sha256: String,
    /// Modification time, seconds since the epoch
    pub mtime: i64,
}

/// Catalogue entry for the legacy preset path.
#[derive(Debug, Clone, Serialize)]
pub struct Preset {
    pub preset_id: &'static str,
    pub name: &'static str,
    pub domain: &'static str,
    pub deploy_profile: &'static str,
    /// Whether a package builder exists for this preset
    pub available: bool,
}

/// Body of `POST /api/admin/factory/generate-plugin`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct GeneratePluginRequest {
    pub plugin_slug: Option<String>,
    pub product_slug: Option<String>,
    pub title: Option<String>,
}
