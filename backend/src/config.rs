//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Clone)]
pub struct Config {
    /// Database connection URL
    pub database_url: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Directory that holds one extracted subdirectory per installed plugin
    pub plugin_root: PathBuf,

    /// Directory for engine artifacts (reports, comparisons, export copies)
    pub artifacts_dir: PathBuf,

    /// Directory that keeps exported scaffold zips for download by filename
    pub export_dir: PathBuf,

    /// Root of the scaffold template fragments (core/, modules/, deploy_profiles/)
    pub templates_dir: PathBuf,

    /// Shared admin secret; `None` leaves admin routes open
    pub admin_token: Option<String>,

    /// OTLP collector endpoint (optional)
    pub otel_endpoint: Option<String>,

    /// Service name reported to the tracing backend
    pub otel_service_name: String,
}

redacted_debug!(Config {
    show database_url,
    show bind_address,
    show plugin_root,
    show artifacts_dir,
    show export_dir,
    show templates_dir,
    redact_option admin_token,
    show otel_endpoint,
    show otel_service_name,
});

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let database_url = match env::var("DATABASE_URL") {
            Ok(url) => url,
            Err(_) => {
                let db_path = env::var("ATLAS_DB_PATH").unwrap_or_else(|_| "data/app.db".into());
                sqlite_url(&db_path)
            }
        };

        if !database_url.starts_with("sqlite:") {
            return Err(AppError::Config(format!(
                "DATABASE_URL must be a sqlite URL, got '{}'",
                database_url
            )));
        }

        Ok(Self {
            database_url,
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8000".into()),
            plugin_root: env::var("ATLAS_PLUGIN_ROOT")
                .unwrap_or_else(|_| "plugins_installed".into())
                .into(),
            artifacts_dir: env::var("ATLAS_ENGINE_ARTIFACTS_DIR")
                .unwrap_or_else(|_| "engine_artifacts".into())
                .into(),
            export_dir: env::var("ATLAS_EXPORT_DIR")
                .unwrap_or_else(|_| "exports".into())
                .into(),
            templates_dir: env::var("ATLAS_TEMPLATES_DIR")
                .unwrap_or_else(|_| "templates".into())
                .into(),
            admin_token: env::var("ATLAS_ADMIN_TOKEN")
                .ok()
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty()),
            otel_endpoint: env::var("OTEL_EXPORTER_OTLP_ENDPOINT").ok(),
            otel_service_name: env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "atlas-backend".into()),
        })
    }

    /// Configuration rooted in a single directory, used by tests and local runs.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let data_dir = data_dir.into();
        Self {
            database_url: sqlite_url(&data_dir.join("app.db").to_string_lossy()),
            bind_address: "127.0.0.1:0".into(),
            plugin_root: data_dir.join("plugins_installed"),
            artifacts_dir: data_dir.join("engine_artifacts"),
            export_dir: data_dir.join("exports"),
            templates_dir: PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates"),
            admin_token: None,
            otel_endpoint: None,
            otel_service_name: "atlas-backend".into(),
        }
    }
}

fn sqlite_url(db_path: &str) -> String {
    format!("sqlite://{}?mode=rwc", db_path)
}
