//! Plugin registry models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

/// Raw `plugins_registry` row.
#[derive(Debug, Clone, FromRow)]
pub struct PluginRow {
    pub id: String,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    pub manifest_json: String,
    pub installed_at: DateTime<Utc>,
}

/// Installed plugin as exposed by the API.
///
/// `id` is the slug taken from the archive's top-level directory and is the
/// natural key of the registry.
#[derive(Debug, Clone, Serialize)]
pub struct PluginRecord {
    pub id: String,
    pub name: String,
    pub version: String,
    pub enabled: bool,
    /// Full manifest.json as uploaded
    pub manifest: serde_json::Value,
    pub installed_at: DateTime<Utc>,
}

impl From<PluginRow> for PluginRecord {
    fn from(row: PluginRow) -> Self {
        let manifest = serde_json::from_str(&row.manifest_json).unwrap_or_else(|e| {
            tracing::warn!(plugin = %row.id, "Stored manifest is not valid JSON: {}", e);
            serde_json::Value::Object(Default::default())
        });
        Self {
            id: row.id,
            name: row.name,
            version: row.version,
            enabled: row.enabled,
            manifest,
            installed_at: row.installed_at,
        }
    }
}

/// Resource limits for sandboxed plugin execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginResourceLimits {
    /// Maximum linear memory in megabytes (default: 64)
    pub memory_mb: u32,
    /// Wall-clock timeout in seconds (default: 5)
    pub timeout_secs: u32,
    /// Fuel units for computation limiting (default: 500_000_000)
    pub fuel: u64,
}

impl Default for PluginResourceLimits {
    fn default() -> Self {
        Self {
            memory_mb: 64,
            timeout_secs: 5,
            fuel: 500_000_000,
        }
    }
}

/// Result of one mount attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MountReport {
    pub slug: String,
    pub mounted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MountReport {
    pub fn mounted(slug: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            mounted: true,
            error: None,
        }
    }

    pub fn failed(slug: impl Into<String>, error: impl ToString) -> Self {
        Self {
            slug: slug.into(),
            mounted: false,
            error: Some(error.to_string()),
        }
    }
}

/// Outcome of a successful install. Mount failure does not undo the install.
#[derive(Debug, Clone, Serialize)]
pub struct InstallOutcome {
    pub status: &'static str,
    pub plugin: PluginRecord,
    pub mounted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount_error: Option<String>,
}

/// Response for lifecycle changes that only take full effect later.
#[derive(Debug, Clone, Serialize)]
pub struct LifecycleOutcome {
    pub status: &'static str,
    pub id: String,
    pub enabled: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mount: Option<MountReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<&'static str>,
}

/// Summary of a reconcile pass over the live mount table.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReconcileReport {
    pub mounted: Vec<MountReport>,
    pub unmounted: Vec<String>,
    pub unchanged: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(manifest_json: &str) -> PluginRow {
        PluginRow {
            id: "hello".into(),
            name: "Hello".into(),
            version: "0.1.0".into(),
            enabled: true,
            manifest_json: manifest_json.into(),
            installed_at: Utc::now(),
        }
    }

    #[test]
    fn test_record_from_row_parses_manifest() {
        let record = PluginRecord::from(row(r#"{"name":"Hello","routes":[]}"#));
        assert_eq!(record.manifest["name"], "Hello");
        assert!(record.enabled);
    }

    #[test]
    fn test_record_from_row_tolerates_corrupt_manifest() {
        let record = PluginRecord::from(row("{not json"));
        assert!(record.manifest.as_object().unwrap().is_empty());
    }

    #[test]
    fn test_mount_report_serialization_skips_empty_error() {
        let json = serde_json::to_value(MountReport::mounted("hello")).unwrap();
        assert_eq!(json["mounted"], true);
        assert!(json.get("error").is_none());

        let json = serde_json::to_value(MountReport::failed("hello", "boom")).unwrap();
        assert_eq!(json["mounted"], false);
        assert_eq!(json["error"], "boom");
    }
}
