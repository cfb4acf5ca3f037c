//! Live mount table of route plugins.
//!
//! Provides Arc<RwLock<HashMap>> based storage keyed by slug, so a plugin can
//! be replaced or dropped without affecting in-flight requests. The registry
//! is created once per process and also owns the "startup mount has run"
//! flag.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::plugin::PluginResourceLimits;
use crate::models::plugin_manifest::PluginManifest;

use super::wasm_bindings::{WasmHttpRequest, WasmHttpResponse};
use super::wasm_runtime::{execute_with_timeout, CompiledPlugin, WasmError, WasmResult, WasmRuntime};

/// Mounted plugin.
///
/// Uses Arc for the compiled module so a request that already holds it
/// finishes on the old version after a replacement.
pub struct MountedPlugin {
    pub slug: String,
    pub name: String,
    pub version: String,
    /// Generation counter, bumped on every (re)mount
    pub internal_version: u64,
    pub compiled: Arc<CompiledPlugin>,
    pub manifest: PluginManifest,
    pub limits: PluginResourceLimits,
    pub mounted_at: DateTime<Utc>,
}

impl std::fmt::Debug for MountedPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MountedPlugin")
            .field("slug", &self.slug)
            .field("name", &self.name)
            .field("version", &self.version)
            .field("internal_version", &self.internal_version)
            .finish()
    }
}

/// Summary information about a mounted plugin.
#[derive(Debug, Clone, Serialize)]
pub struct MountedPluginInfo {
    pub slug: String,
    pub name: String,
    pub version: String,
    pub internal_version: u64,
    pub routes: usize,
    pub mounted_at: DateTime<Utc>,
}

/// Plugin registry for the live mount table.
pub struct PluginRegistry {
    plugins: Arc<RwLock<HashMap<String, Arc<MountedPlugin>>>>,
    version_counter: Arc<RwLock<u64>>,
    runtime: Arc<WasmRuntime>,
    startup_mounted: AtomicBool,
}

impl PluginRegistry {
    /// Create a new plugin registry.
    pub fn new() -> WasmResult<Self> {
        Ok(Self::with_runtime(WasmRuntime::new()?))
    }

    /// Create a plugin registry with a custom runtime.
    pub fn with_runtime(runtime: WasmRuntime) -> Self {
        Self {
            plugins: Arc::new(RwLock::new(HashMap::new())),
            version_counter: Arc::new(RwLock::new(0)),
            runtime: Arc::new(runtime),
            startup_mounted: AtomicBool::new(false),
        }
    }

    /// Claim the one startup mount pass. Returns false if it already ran.
    pub fn claim_startup_mount(&self) -> bool {
        self.startup_mounted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// Whether the startup mount pass has been claimed.
    pub fn startup_mount_done(&self) -> bool {
        self.startup_mounted.load(Ordering::Acquire)
    }

    async fn next_version(&self) -> u64 {
        let mut counter = self.version_counter.write().await;
        *counter += 1;
        *counter
    }

    /// Compile `wasm_bytes` and mount it under `slug`.
    ///
    /// An existing plugin with the same slug is replaced atomically.
    pub async fn register(
        &self,
        slug: &str,
        manifest: PluginManifest,
        wasm_bytes: Vec<u8>,
    ) -> WasmResult<u64> {
        info!(
            "Mounting plugin {} ({}) version {}",
            manifest.name, slug, manifest.version
        );

        let runtime = self.runtime.clone();
        let compiled = tokio::task::spawn_blocking(move || runtime.compile(&wasm_bytes))
            .await
            .map_err(|e| WasmError::EngineError(format!("compile task failed: {}", e)))??;

        let internal_version = self.next_version().await;
        let plugin = Arc::new(MountedPlugin {
            slug: slug.to_string(),
            name: manifest.name.clone(),
            version: manifest.version.clone(),
            internal_version,
            compiled: Arc::new(compiled),
            limits: manifest.to_resource_limits(),
            manifest,
            mounted_at: Utc::now(),
        });

        let mut plugins = self.plugins.write().await;
        if let Some(existing) = plugins.get(slug) {
            info!(
                "Hot-reloading plugin {} from v{} (internal {}) to v{} (internal {})",
                slug, existing.version, existing.internal_version, plugin.version, internal_version
            );
        }
        plugins.insert(slug.to_string(), plugin);

        Ok(internal_version)
    }

    /// Remove a plugin from the mount table. Returns whether it was mounted.
    pub async fn unregister(&self, slug: &str) -> bool {
        let mut plugins = self.plugins.write().await;
        match plugins.remove(slug) {
            Some(plugin) => {
                info!("Unmounted plugin {} (internal {})", slug, plugin.internal_version);
                true
            }
            None => {
                warn!("Attempted to unmount plugin {} which is not mounted", slug);
                false
            }
        }
    }

    pub async fn get(&self, slug: &str) -> Option<Arc<MountedPlugin>> {
        self.plugins.read().await.get(slug).cloned()
    }

    pub async fn is_mounted(&self, slug: &str) -> bool {
        self.plugins.read().await.contains_key(slug)
    }

    pub async fn mounted_slugs(&self) -> Vec<String> {
        let mut slugs: Vec<String> = self.plugins.read().await.keys().cloned().collect();
        slugs.sort();
        slugs
    }

    /// List all mounted plugins, sorted by slug.
    pub async fn list_plugins(&self) -> Vec<MountedPluginInfo> {
        let plugins = self.plugins.read().await;
        let mut items: Vec<MountedPluginInfo> = plugins
            .values()
            .map(|p| MountedPluginInfo {
                slug: p.slug.clone(),
                name: p.name.clone(),
                version: p.version.clone(),
                internal_version: p.internal_version,
                routes: p.manifest.routes.len(),
                mounted_at: p.mounted_at,
            })
            .collect();
        items.sort_by(|a, b| a.slug.cmp(&b.slug));
        items
    }

    pub async fn plugin_count(&self) -> usize {
        self.plugins.read().await.len()
    }

    /// Run a request through a mounted plugin inside the sandbox.
    pub async fn execute(
        &self,
        plugin: Arc<MountedPlugin>,
        request: WasmHttpRequest,
    ) -> WasmResult<WasmHttpResponse> {
        debug!(
            "Dispatching {} {} to plugin {} (internal {})",
            request.method, request.path, plugin.slug, plugin.internal_version
        );

        let runtime = self.runtime.clone();
        let timeout_secs = plugin.limits.timeout_secs;
        let task = tokio::task::spawn_blocking(move || {
            runtime.handle_request(&plugin.compiled, &plugin.slug, &plugin.limits, &request)
        });

        execute_with_timeout(timeout_secs, async move {
            task.await
                .map_err(|e| WasmError::EngineError(format!("plugin task failed: {}", e)))?
        })
        .await
    }
}
