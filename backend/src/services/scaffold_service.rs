//! Scaffold exporter.
//!
//! Composes template fragments (or the PMX preset) into a package directory,
//! zips it, keeps a copy in the export directory and records it in the
//! artifact store.

use std::collections::HashSet;
use std::io::{Cursor, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bytes::Bytes;
use serde_json::{json, Value};
use tokio::fs;
use tracing::{debug, info, warn};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::{AppError, Result};
use crate::models::export::{ExportListing, ExportMode, ExportRequest, ExportResult, PlatformSpec};

use super::artifact_service::ArtifactService;
use super::plugin_service::is_valid_slug;
use super::presets::{
    find_preset, DEFAULT_DEPLOY_PROFILE, PMX_PACKAGE_FILES, PMX_PRESET_ID,
    UNSUPPORTED_PRESET_MESSAGE,
};

pub const EITHER_PRESET_OR_SPEC: &str = "Provide either {preset_id} OR {spec}.";

const DEFAULT_PLATFORM_SLUG: &str = "atlas_platform";
const SPEC_README_DEPLOY: &str = "Run: docker compose up -d\n";
const SPEC_ENV_EXAMPLE: &str = "JWT_SECRET=change_me\nOCR_API_KEY=change_me\n";

/// Copy every regular file under `src` into `dst`, keeping relative paths.
fn copy_tree(src: &Path, dst: &Path) -> Result<usize> {
    let mut copied = 0;
    for entry in WalkDir::new(src) {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| AppError::Internal(format!("Template path outside root: {}", e)))?;
        let target = dst.join(relative);
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(entry.path(), &target)?;
        copied += 1;
    }
    Ok(copied)
}

/// Zip the files under `root` with paths relative to it, in a stable order.
fn zip_dir(root: &Path) -> Result<Vec<u8>> {
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(std::io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| AppError::Internal(format!("Package path outside root: {}", e)))?;
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        writer.start_file(name, options)?;
        writer.write_all(&std::fs::read(entry.path())?)?;
    }

    Ok(writer.finish()?.into_inner())
}

/// Write `files` under `root`.
fn write_files(root: &Path, files: &[(&str, &str)]) -> Result<()> {
    for (relative, content) in files {
        let path = root.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
    }
    Ok(())
}

/// Template selection resolved from a platform spec.
#[derive(Debug, Clone)]
struct ScaffoldPlan {
    slug: String,
    profile: String,
    modules: Vec<String>,
    skipped: Vec<String>,
}

/// Scaffold export service
pub struct ScaffoldService {
    templates_dir: PathBuf,
    export_dir: PathBuf,
    artifacts: Arc<ArtifactService>,
}

impl ScaffoldService {
    pub fn new(templates_dir: PathBuf, export_dir: PathBuf, artifacts: Arc<ArtifactService>) -> Self {
        Self {
            templates_dir,
            export_dir,
            artifacts,
        }
    }

    /// Export by preset id or by platform spec; exactly one must be given.
    pub async fn export_from_payload(&self, request: ExportRequest) -> Result<ExportResult> {
        let preset_id = request
            .preset_id
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());
        let spec = request.spec.filter(|spec| match spec {
            Value::Null => false,
            Value::Object(map) => !map.is_empty(),
            _ => true,
        });

        match (preset_id, spec) {
            (Some(preset_id), None) => self.export_preset(&preset_id).await,
            (None, Some(spec)) => self.export_spec(spec).await,
            _ => Err(AppError::Validation(EITHER_PRESET_OR_SPEC.into())),
        }
    }

    async fn export_preset(&self, preset_id: &str) -> Result<ExportResult> {
        match find_preset(preset_id) {
            Some(preset) if preset.available => {}
            Some(_) => return Err(AppError::Validation(UNSUPPORTED_PRESET_MESSAGE.into())),
            None => {
                return Err(AppError::Validation(format!(
                    "Unknown preset '{}'",
                    preset_id
                )))
            }
        }

        let package = tokio::task::spawn_blocking(|| {
            let workdir = tempfile::tempdir()?;
            let root = workdir.path().join(PMX_PRESET_ID);
            write_files(&root, PMX_PACKAGE_FILES)?;
            zip_dir(&root)
        })
        .await
        .map_err(|e| AppError::Internal(format!("Preset build task failed: {}", e)))??;

        self.publish(
            format!("{}.zip", PMX_PRESET_ID),
            package,
            ExportMode::Preset,
            Vec::new(),
            json!({"preset_id": PMX_PRESET_ID}),
        )
        .await
    }

    async fn export_spec(&self, spec: Value) -> Result<ExportResult> {
        let spec: PlatformSpec = serde_json::from_value(spec)
            .map_err(|e| AppError::Validation(format!("Invalid spec: {}", e)))?;
        let plan = self.plan(&spec)?;

        let templates = self.templates_dir.clone();
        let build = plan.clone();
        let package = tokio::task::spawn_blocking(move || build_spec_package(&templates, &build))
            .await
            .map_err(|e| AppError::Internal(format!("Export build task failed: {}", e)))??;

        self.publish(
            format!("{}_onprem_v1.zip", plan.slug),
            package,
            ExportMode::Spec,
            plan.skipped,
            json!({
                "slug": plan.slug,
                "name": spec.platform.name,
                "domain": spec.platform.domain,
                "profile": plan.profile,
                "modules": plan.modules,
            }),
        )
        .await
    }

    /// Resolve slug, deploy profile and module templates.
    fn plan(&self, spec: &PlatformSpec) -> Result<ScaffoldPlan> {
        let slug = spec
            .platform
            .slug
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_PLATFORM_SLUG)
            .to_string();
        if !is_valid_slug(&slug) {
            return Err(AppError::Validation(format!(
                "Invalid platform slug '{}': use lowercase letters, digits, '.', '_' or '-'",
                slug
            )));
        }

        let profile = spec
            .deploy
            .profile
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_DEPLOY_PROFILE)
            .to_string();
        if !is_valid_slug(&profile)
            || !self.templates_dir.join("deploy_profiles").join(&profile).is_dir()
        {
            return Err(AppError::Validation(format!(
                "Unknown deploy profile '{}'",
                profile
            )));
        }

        let mut seen = HashSet::new();
        let mut modules = Vec::new();
        let mut skipped = Vec::new();
        for module in &spec.modules {
            if !seen.insert(module.as_str()) {
                continue;
            }
            if is_valid_slug(module) && self.templates_dir.join("modules").join(module).is_dir() {
                modules.push(module.clone());
            } else {
                skipped.push(module.clone());
            }
        }
        if !skipped.is_empty() {
            warn!(slug = %slug, ?skipped, "Skipping modules without templates");
        }

        Ok(ScaffoldPlan {
            slug,
            profile,
            modules,
            skipped,
        })
    }

    /// Keep the zip in the export directory and record it as an artifact.
    async fn publish(
        &self,
        artifact: String,
        package: Vec<u8>,
        mode: ExportMode,
        skipped_modules: Vec<String>,
        mut meta: Value,
    ) -> Result<ExportResult> {
        let sha256 = ArtifactService::calculate_sha256(&package);

        fs::create_dir_all(&self.export_dir).await?;
        let target = self.export_dir.join(&artifact);
        let partial = self.export_dir.join(format!(".{}.partial", artifact));
        fs::write(&partial, &package).await?;
        fs::rename(&partial, &target).await?;

        if let Some(map) = meta.as_object_mut() {
            map.insert("artifact".into(), json!(artifact));
            map.insert("mode".into(), json!(mode));
        }
        let stored = self
            .artifacts
            .store("export_zip", &artifact, Bytes::from(package), meta)
            .await?;

        info!(
            artifact = %artifact,
            artifact_id = %stored.id,
            bytes = stored.bytes,
            "Scaffold exported"
        );

        Ok(ExportResult {
            status: "ok",
            download_url: format!("/api/factory/download/{}", artifact),
            artifact,
            sha256,
            artifact_id: stored.id,
            mode,
            skipped_modules,
        })
    }

    /// Exported zips, newest first.
    pub async fn list_exports(&self) -> Result<Vec<ExportListing>> {
        if !fs::try_exists(&self.export_dir).await? {
            return Ok(Vec::new());
        }

        let mut items = Vec::new();
        let mut entries = fs::read_dir(&self.export_dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !name.ends_with(".zip") || name.starts_with('.') {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let mtime = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_secs() as i64)
                .unwrap_or_default();
            let content = fs::read(entry.path()).await?;

            items.push(ExportListing {
                artifact: name,
                bytes: metadata.len(),
                sha256: ArtifactService::calculate_sha256(&content),
                mtime,
            });
        }

        items.sort_by(|a, b| b.mtime.cmp(&a.mtime).then_with(|| a.artifact.cmp(&b.artifact)));
        Ok(items)
    }

    /// Raw bytes of an exported zip by filename.
    pub async fn download_export(&self, artifact: &str) -> Result<Bytes> {
        let not_found = || AppError::NotFound(format!("Export '{}' not found", artifact));

        if artifact.is_empty()
            || artifact.contains(['/', '\\', '\0'])
            || artifact.contains("..")
            || artifact.starts_with('.')
        {
            return Err(not_found());
        }

        let path = self.export_dir.join(artifact);
        match fs::read(&path).await {
            Ok(content) => {
                debug!(artifact, bytes = content.len(), "Serving export");
                Ok(Bytes::from(content))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(not_found()),
            Err(e) => Err(e.into()),
        }
    }
}

fn build_spec_package(templates: &Path, plan: &ScaffoldPlan) -> Result<Vec<u8>> {
    let workdir = tempfile::tempdir()?;
    let root = workdir.path().join(format!("{}_onprem_v1", plan.slug));
    std::fs::create_dir_all(&root)?;

    for (fragment, dest) in [("backend", "backend"), ("frontend", "frontend")] {
        let src = templates.join("core").join(fragment);
        if !src.is_dir() {
            return Err(AppError::Config(format!(
                "Template fragment core/{} is missing from {:?}",
                fragment, templates
            )));
        }
        copy_tree(&src, &root.join(dest))?;
    }

    for module in &plan.modules {
        copy_tree(
            &templates.join("modules").join(module),
            &root.join("backend").join("modules").join(module),
        )?;
    }

    copy_tree(
        &templates.join("deploy_profiles").join(&plan.profile),
        &root.join("ops"),
    )?;

    write_files(
        &root,
        &[
            ("README_DEPLOY.md", SPEC_README_DEPLOY),
            (".env.example", SPEC_ENV_EXAMPLE),
        ],
    )?;

    zip_dir(&root)
}
