//! Atlas backend - main entry point

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use atlas_backend::{
    api,
    config::Config,
    db,
    error::{AppError, Result},
    services::plugin_registry::PluginRegistry,
    telemetry,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;
    let _otel_guard =
        telemetry::init_tracing(config.otel_endpoint.as_deref(), &config.otel_service_name);
    tracing::info!(?config, "Starting Atlas backend");

    let db_pool = db::create_pool(&config.database_url).await?;
    tracing::info!("Connected to database");

    db::run_migrations(&db_pool).await?;
    tracing::info!("Database migrations complete");

    for dir in [&config.plugin_root, &config.artifacts_dir, &config.export_dir] {
        tokio::fs::create_dir_all(dir).await?;
    }
    if !config.templates_dir.is_dir() {
        tracing::warn!(
            templates_dir = ?config.templates_dir,
            "Template directory missing; spec exports will fail"
        );
    }

    let plugin_registry = Arc::new(
        PluginRegistry::new()
            .map_err(|e| AppError::Internal(format!("Failed to create plugin registry: {}", e)))?,
    );
    let state = Arc::new(api::AppState::new(
        config.clone(),
        db_pool,
        plugin_registry,
    ));

    mount_plugins(&state).await?;

    let app = Router::new()
        .merge(api::routes::create_router(state))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

/// Mount every enabled plugin once at boot.
async fn mount_plugins(state: &api::SharedState) -> Result<()> {
    let Some(reports) = state.plugin_service.mount_enabled_at_startup().await? else {
        return Ok(());
    };

    let loaded = reports.iter().filter(|r| r.mounted).count();
    for report in reports.iter().filter(|r| !r.mounted) {
        tracing::error!(
            plugin = %report.slug,
            "Failed to load plugin: {}",
            report.error.as_deref().unwrap_or("unknown error")
        );
    }

    tracing::info!(
        "Plugin system initialized: {} plugins loaded, {} errors",
        loaded,
        reports.len() - loaded
    );
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to install Ctrl+C handler: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
