//! API module - HTTP handlers and middleware.

pub mod download_response;
pub mod handlers;
pub mod middleware;
pub mod routes;

use std::sync::Arc;

use sqlx::SqlitePool;

use crate::config::Config;
use crate::services::artifact_service::ArtifactService;
use crate::services::plugin_registry::PluginRegistry;
use crate::services::plugin_service::PluginService;
use crate::services::readiness_service::ReadinessService;
use crate::services::scaffold_service::ScaffoldService;
use crate::storage::filesystem::FilesystemStorage;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub plugin_registry: Arc<PluginRegistry>,
    pub plugin_service: Arc<PluginService>,
    pub artifact_service: Arc<ArtifactService>,
    pub readiness_service: Arc<ReadinessService>,
    pub scaffold_service: Arc<ScaffoldService>,
}

impl AppState {
    /// Wire the services around one database pool and one mount table.
    pub fn new(config: Config, db: SqlitePool, plugin_registry: Arc<PluginRegistry>) -> Self {
        let storage = Arc::new(FilesystemStorage::new(config.artifacts_dir.clone()));
        let artifact_service = Arc::new(ArtifactService::new(db.clone(), storage));
        let readiness_service = Arc::new(ReadinessService::new(artifact_service.clone()));
        let scaffold_service = Arc::new(ScaffoldService::new(
            config.templates_dir.clone(),
            config.export_dir.clone(),
            artifact_service.clone(),
        ));
        let plugin_service = Arc::new(PluginService::new(
            db.clone(),
            plugin_registry.clone(),
            config.plugin_root.clone(),
        ));

        Self {
            config,
            db,
            plugin_registry,
            plugin_service,
            artifact_service,
            readiness_service,
            scaffold_service,
        }
    }
}

pub type SharedState = Arc<AppState>;
