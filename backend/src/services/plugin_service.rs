//! Plugin registry persistence and lifecycle.
//!
//! Handles archive installation, enable/disable/remove, the one-time startup
//! mount and on-demand reconciliation of the live mount table with the
//! `plugins_registry` table.

use std::collections::HashSet;
use std::io::{Cursor, Read};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use chrono::Utc;
use regex::Regex;
use serde_json::Value;
use sqlx::SqlitePool;
use tokio::fs;
use tracing::{debug, info, warn};
use uuid::Uuid;
use zip::ZipArchive;

use crate::error::{AppError, Result};
use crate::models::plugin::{
    InstallOutcome, LifecycleOutcome, MountReport, PluginRecord, PluginRow, ReconcileReport,
};
use crate::models::plugin_manifest::PluginManifest;

use super::plugin_registry::PluginRegistry;

/// Uploads above this size are refused before parsing.
pub const MAX_PLUGIN_ARCHIVE_BYTES: usize = 25 * 1024 * 1024;

/// Entry point location relative to the plugin directory.
pub const ENTRY_POINT: &str = "backend/router.wasm";

const MANIFEST_FILE: &str = "manifest.json";
const LIST_LIMIT: i64 = 500;

pub const DISABLE_NOTE: &str = "Router remains mounted until restart; skipped on next boot.";
pub const REMOVE_NOTE: &str = "Restart to fully unload if router already mounted.";

fn slug_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9._-]*$").unwrap())
}

/// Whether `slug` is usable as a plugin id and directory name.
pub fn is_valid_slug(slug: &str) -> bool {
    slug.len() <= 128 && !slug.contains("..") && slug_regex().is_match(slug)
}

/// Slug and raw manifest found while inspecting an archive.
#[derive(Debug)]
struct ArchiveSummary {
    slug: String,
    manifest: Value,
}

/// Locate `<slug>/manifest.json`, check the entry point and read the manifest.
///
/// Touches neither disk nor database.
fn inspect_archive(data: &[u8]) -> Result<ArchiveSummary> {
    let mut archive = ZipArchive::new(Cursor::new(data))
        .map_err(|e| AppError::Validation(format!("Invalid ZIP file: {}", e)))?;

    let candidates: Vec<String> = archive
        .file_names()
        .filter(|name| {
            let mut parts = name.split('/');
            matches!(
                (parts.next(), parts.next(), parts.next()),
                (Some(dir), Some(MANIFEST_FILE), None) if !dir.is_empty()
            )
        })
        .map(str::to_string)
        .collect();

    let manifest_name = match candidates.as_slice() {
        [one] => one.clone(),
        [] => {
            return Err(AppError::Validation(
                "Plugin archive must contain <slug>/manifest.json".into(),
            ))
        }
        many => {
            return Err(AppError::Validation(format!(
                "Plugin archive is ambiguous: {} top-level directories contain manifest.json",
                many.len()
            )))
        }
    };

    let slug = manifest_name
        .split('/')
        .next()
        .unwrap_or_default()
        .to_string();
    if !is_valid_slug(&slug) {
        return Err(AppError::Validation(format!(
            "Invalid plugin slug '{}': use lowercase letters, digits, '.', '_' or '-'",
            slug
        )));
    }

    let entry_point = format!("{}/{}", slug, ENTRY_POINT);
    if !archive.file_names().any(|name| name == entry_point) {
        return Err(AppError::Validation(format!(
            "Plugin archive is missing its entry point {}",
            entry_point
        )));
    }

    let mut text = String::new();
    archive
        .by_name(&manifest_name)?
        .read_to_string(&mut text)
        .map_err(|e| AppError::Validation(format!("manifest.json is not readable text: {}", e)))?;
    let manifest: Value = serde_json::from_str(&text)
        .map_err(|e| AppError::Validation(format!("manifest.json is not valid JSON: {}", e)))?;

    Ok(ArchiveSummary { slug, manifest })
}

/// Extract the `<slug>/` subtree of the archive into `target`.
///
/// Entries with unsafe names or outside the slug directory are skipped.
fn extract_plugin_dir(data: &[u8], slug: &str, target: &Path) -> Result<usize> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    std::fs::create_dir_all(target)?;

    let prefix = Path::new(slug);
    let mut written = 0;
    let mut ignored = 0;

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;

        let Some(path) = file.enclosed_name() else {
            warn!(plugin = slug, entry = file.name(), "Skipping unsafe archive entry");
            continue;
        };
        let Ok(relative) = path.strip_prefix(prefix) else {
            ignored += 1;
            continue;
        };
        if relative.as_os_str().is_empty() {
            continue;
        }

        let outpath = target.join(relative);
        if file.is_dir() {
            std::fs::create_dir_all(&outpath)?;
            continue;
        }
        if let Some(parent) = outpath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut outfile = std::fs::File::create(&outpath)?;
        std::io::copy(&mut file, &mut outfile)?;
        written += 1;
    }

    if ignored > 0 {
        warn!(
            plugin = slug,
            ignored, "Ignored archive entries outside the plugin directory"
        );
    }

    Ok(written)
}

/// Plugin service
pub struct PluginService {
    db: SqlitePool,
    registry: Arc<PluginRegistry>,
    plugin_root: PathBuf,
}

impl PluginService {
    pub fn new(db: SqlitePool, registry: Arc<PluginRegistry>, plugin_root: PathBuf) -> Self {
        Self {
            db,
            registry,
            plugin_root,
        }
    }

    /// Directory holding an installed plugin's files.
    pub fn plugin_dir(&self, slug: &str) -> PathBuf {
        self.plugin_root.join(slug)
    }

    /// Install (or replace) a plugin from a zip archive.
    pub async fn install_from_zip(&self, data: Bytes) -> Result<InstallOutcome> {
        if data.len() > MAX_PLUGIN_ARCHIVE_BYTES {
            return Err(AppError::PayloadTooLarge(format!(
                "Plugin archive is {} bytes; the limit is {} bytes",
                data.len(),
                MAX_PLUGIN_ARCHIVE_BYTES
            )));
        }
        info!("Installing plugin from ZIP ({} bytes)", data.len());

        let inspected = data.clone();
        let summary = tokio::task::spawn_blocking(move || inspect_archive(&inspected))
            .await
            .map_err(|e| AppError::Internal(format!("Archive inspection task failed: {}", e)))??;
        let slug = summary.slug;

        let manifest = PluginManifest::from_json(&slug, &summary.manifest)
            .map_err(|e| AppError::Validation(format!("Invalid manifest.json: {}", e)))?;

        self.unpack(&slug, data).await?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO plugins_registry
                (id, name, version, enabled, manifest_json, installed_at)
            VALUES (?, ?, ?, 1, ?, ?)
            "#,
        )
        .bind(&slug)
        .bind(&manifest.name)
        .bind(&manifest.version)
        .bind(summary.manifest.to_string())
        .bind(Utc::now())
        .execute(&self.db)
        .await?;

        let plugin = self.get(&slug).await?;
        let report = self.mount_record(&plugin).await;

        info!(
            "Plugin {} v{} installed (mounted: {})",
            plugin.id, plugin.version, report.mounted
        );

        Ok(InstallOutcome {
            status: "ok",
            plugin,
            mounted: report.mounted,
            mount_error: report.error,
        })
    }

    /// Extract into a staging directory, then swap it into place.
    async fn unpack(&self, slug: &str, data: Bytes) -> Result<()> {
        fs::create_dir_all(&self.plugin_root).await?;
        let staging = self
            .plugin_root
            .join(format!(".staging-{}", Uuid::new_v4().simple()));

        let target = staging.clone();
        let owned_slug = slug.to_string();
        let extracted = tokio::task::spawn_blocking(move || {
            extract_plugin_dir(&data, &owned_slug, &target)
        })
        .await
        .map_err(|e| AppError::Internal(format!("ZIP extraction task failed: {}", e)))
        .and_then(|r| r);

        let swapped = match extracted {
            Ok(count) => {
                debug!(plugin = slug, files = count, "Extracted plugin archive");
                self.swap_into_place(slug, &staging).await
            }
            Err(e) => Err(e),
        };

        if swapped.is_err() && fs::try_exists(&staging).await.unwrap_or(false) {
            if let Err(e) = fs::remove_dir_all(&staging).await {
                warn!("Failed to clean staging directory {:?}: {}", staging, e);
            }
        }
        swapped
    }

    async fn swap_into_place(&self, slug: &str, staging: &Path) -> Result<()> {
        let target = self.plugin_dir(slug);
        if fs::try_exists(&target).await? {
            fs::remove_dir_all(&target).await?;
        }
        fs::rename(staging, &target).await?;
        Ok(())
    }

    /// Installed plugins, newest first.
    pub async fn list(&self) -> Result<Vec<PluginRecord>> {
        let rows = sqlx::query_as::<_, PluginRow>(
            r#"
            SELECT id, name, version, enabled, manifest_json, installed_at
            FROM plugins_registry
            ORDER BY installed_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(LIST_LIMIT)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(PluginRecord::from).collect())
    }

    pub async fn get(&self, id: &str) -> Result<PluginRecord> {
        let row = sqlx::query_as::<_, PluginRow>(
            r#"
            SELECT id, name, version, enabled, manifest_json, installed_at
            FROM plugins_registry
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Plugin '{}' not found", id)))?;

        Ok(row.into())
    }

    async fn enabled_plugins(&self) -> Result<Vec<PluginRecord>> {
        let rows = sqlx::query_as::<_, PluginRow>(
            r#"
            SELECT id, name, version, enabled, manifest_json, installed_at
            FROM plugins_registry
            WHERE enabled = 1
            ORDER BY id
            "#,
        )
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(PluginRecord::from).collect())
    }

    async fn set_enabled(&self, id: &str, enabled: bool) -> Result<()> {
        sqlx::query("UPDATE plugins_registry SET enabled = ? WHERE id = ?")
            .bind(enabled)
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Enable a plugin and try to (re)mount it right away.
    pub async fn enable(&self, id: &str) -> Result<LifecycleOutcome> {
        let plugin = self.get(id).await?;
        self.set_enabled(id, true).await?;
        let report = self.mount_record(&plugin).await;

        info!(plugin = id, mounted = report.mounted, "Plugin enabled");

        Ok(LifecycleOutcome {
            status: "ok",
            id: plugin.id,
            enabled: true,
            mount: Some(report),
            note: None,
        })
    }

    /// Disable a plugin. A live mount stays until restart or reconcile.
    pub async fn disable(&self, id: &str) -> Result<LifecycleOutcome> {
        let plugin = self.get(id).await?;
        self.set_enabled(id, false).await?;

        info!(plugin = id, "Plugin disabled");

        Ok(LifecycleOutcome {
            status: "ok",
            id: plugin.id,
            enabled: false,
            mount: None,
            note: Some(DISABLE_NOTE),
        })
    }

    /// Delete the registry row and the plugin directory.
    pub async fn remove(&self, id: &str) -> Result<LifecycleOutcome> {
        let plugin = self.get(id).await?;

        sqlx::query("DELETE FROM plugins_registry WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;

        let dir = self.plugin_dir(&plugin.id);
        if fs::try_exists(&dir).await.unwrap_or(false) {
            if let Err(e) = fs::remove_dir_all(&dir).await {
                warn!(plugin = id, "Failed to delete plugin directory: {}", e);
            }
        }

        info!(plugin = id, "Plugin removed");

        Ok(LifecycleOutcome {
            status: "ok",
            id: plugin.id,
            enabled: false,
            mount: None,
            note: Some(REMOVE_NOTE),
        })
    }

    /// Mount every enabled plugin. Runs once per registry; later calls
    /// return `None`.
    pub async fn mount_enabled_at_startup(&self) -> Result<Option<Vec<MountReport>>> {
        if !self.registry.claim_startup_mount() {
            debug!("Startup mount already ran");
            return Ok(None);
        }

        let mut reports = Vec::new();
        for plugin in self.enabled_plugins().await? {
            reports.push(self.mount_record(&plugin).await);
        }
        Ok(Some(reports))
    }

    /// Bring the live mount table in line with the registry.
    pub async fn reconcile(&self) -> Result<ReconcileReport> {
        let enabled = self.enabled_plugins().await?;
        let wanted: HashSet<&str> = enabled.iter().map(|p| p.id.as_str()).collect();
        let mut report = ReconcileReport::default();

        for slug in self.registry.mounted_slugs().await {
            if !wanted.contains(slug.as_str()) {
                self.registry.unregister(&slug).await;
                report.unmounted.push(slug);
            }
        }

        for plugin in &enabled {
            if self.registry.is_mounted(&plugin.id).await {
                report.unchanged.push(plugin.id.clone());
            } else {
                report.mounted.push(self.mount_record(plugin).await);
            }
        }

        info!(
            mounted = report.mounted.len(),
            unmounted = report.unmounted.len(),
            unchanged = report.unchanged.len(),
            "Plugin mount table reconciled"
        );
        Ok(report)
    }

    /// Best-effort mount; failures are logged and reported, never raised.
    async fn mount_record(&self, plugin: &PluginRecord) -> MountReport {
        match self.try_mount(plugin).await {
            Ok(internal_version) => {
                debug!(plugin = %plugin.id, internal_version, "Plugin mounted");
                MountReport::mounted(&plugin.id)
            }
            Err(e) => {
                warn!(plugin = %plugin.id, "Failed to mount plugin: {}", e);
                MountReport::failed(&plugin.id, e)
            }
        }
    }

    async fn try_mount(&self, plugin: &PluginRecord) -> Result<u64> {
        let manifest = PluginManifest::from_json(&plugin.id, &plugin.manifest)
            .map_err(|e| AppError::Validation(format!("Invalid manifest.json: {}", e)))?;
        let wasm_path = self.plugin_dir(&plugin.id).join(ENTRY_POINT);
        let wasm_bytes = fs::read(&wasm_path).await.map_err(|e| {
            AppError::Plugin(format!("Cannot read entry point {:?}: {}", wasm_path, e))
        })?;

        self.registry
            .register(&plugin.id, manifest, wasm_bytes)
            .await
            .map_err(|e| AppError::Plugin(e.to_string()))
    }
}
