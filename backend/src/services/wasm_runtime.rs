//! WASM runtime service for executing route plugins.
//!
//! Provides a wasmtime-based sandbox with resource limits and timeout
//! handling. Plugins are core modules with no host imports; the only way in
//! or out is the request/response exchange described in `wasm_bindings`.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};
use wasmtime::{Config, Engine, Instance, Module, Store, StoreLimits, StoreLimitsBuilder, Trap};

use super::wasm_bindings::{unpack_ptr_len, WasmHttpRequest, WasmHttpResponse};
use crate::models::plugin::PluginResourceLimits;

/// Default fuel per second of execution time.
const FUEL_PER_SECOND: u64 = 100_000_000;

/// Largest response a plugin may return.
pub const MAX_RESPONSE_BYTES: u32 = 8 * 1024 * 1024;

/// Exports every route plugin must provide.
pub const REQUIRED_EXPORTS: [&str; 3] = ["memory", "alloc", "handle"];

/// Errors that can occur during WASM execution.
#[derive(Debug, Error)]
pub enum WasmError {
    #[error("WASM execution timed out after {0} seconds")]
    Timeout(u32),

    #[error("WASM execution exceeded fuel limit")]
    FuelExhausted,

    #[error("WASM module validation failed: {0}")]
    ValidationFailed(String),

    #[error("WASM compilation failed: {0}")]
    CompilationFailed(String),

    #[error("WASM instantiation failed: {0}")]
    InstantiationFailed(String),

    #[error("WASM function call failed: {0}")]
    CallFailed(String),

    #[error("WASM engine error: {0}")]
    EngineError(String),

    #[error("Plugin returned invalid response: {0}")]
    InvalidResponse(String),
}

impl From<wasmtime::Error> for WasmError {
    fn from(e: wasmtime::Error) -> Self {
        match e.downcast_ref::<Trap>() {
            Some(Trap::OutOfFuel) => WasmError::FuelExhausted,
            Some(trap) => WasmError::CallFailed(format!("trap: {}", trap)),
            None => WasmError::CallFailed(e.to_string()),
        }
    }
}

/// Result type for WASM operations.
pub type WasmResult<T> = std::result::Result<T, WasmError>;

/// Plugin execution context stored in the WASM Store.
pub struct PluginContext {
    pub plugin_id: String,
    limits: StoreLimits,
}

impl PluginContext {
    /// Create a new plugin context.
    pub fn new(plugin_id: String, limits: &PluginResourceLimits) -> Self {
        let store_limits = StoreLimitsBuilder::new()
            .memory_size(limits.memory_mb as usize * 1024 * 1024)
            .table_elements(10000)
            .instances(1)
            .tables(4)
            .memories(1)
            .build();

        Self {
            plugin_id,
            limits: store_limits,
        }
    }
}

/// Compiled plugin ready for instantiation.
///
/// Each plugin version gets its own Engine so a replaced plugin can drain
/// independently of its successor.
pub struct CompiledPlugin {
    engine: Engine,
    module: Module,
}

impl CompiledPlugin {
    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn module(&self) -> &Module {
        &self.module
    }
}

/// WASM runtime for compiling and executing plugins.
///
/// Execution is bounded twice: fuel metering inside the store and a
/// wall-clock timeout around the blocking call.
pub struct WasmRuntime {
    config: Config,
}

impl WasmRuntime {
    /// Create a new WASM runtime with default configuration.
    pub fn new() -> WasmResult<Self> {
        let mut config = Config::new();

        // Fuel-based execution metering
        config.consume_fuel(true);

        // Features plugins have no use for
        config.wasm_threads(false);
        config.wasm_component_model(false);

        // Make sure the configuration is usable before handing it out
        Engine::new(&config).map_err(|e| WasmError::EngineError(e.to_string()))?;

        Ok(Self { config })
    }

    /// Compile a plugin module from bytes.
    ///
    /// Rejects modules that import anything from the host or miss one of
    /// the [`REQUIRED_EXPORTS`].
    pub fn compile(&self, wasm_bytes: &[u8]) -> WasmResult<CompiledPlugin> {
        let engine =
            Engine::new(&self.config).map_err(|e| WasmError::EngineError(e.to_string()))?;

        let module = Module::new(&engine, wasm_bytes)
            .map_err(|e| WasmError::CompilationFailed(e.to_string()))?;

        check_interface(&module)?;

        info!("Compiled WASM module ({} bytes)", wasm_bytes.len());

        Ok(CompiledPlugin { engine, module })
    }

    /// Create a new store for plugin execution.
    pub fn create_store(
        &self,
        compiled: &CompiledPlugin,
        plugin_id: &str,
        limits: &PluginResourceLimits,
    ) -> WasmResult<Store<PluginContext>> {
        let context = PluginContext::new(plugin_id.to_string(), limits);
        let mut store = Store::new(compiled.engine(), context);

        store.limiter(|ctx| &mut ctx.limits);

        let fuel = limits
            .fuel
            .max(limits.timeout_secs as u64 * FUEL_PER_SECOND);
        store
            .set_fuel(fuel)
            .map_err(|e| WasmError::EngineError(e.to_string()))?;

        debug!(
            "Created store for plugin {} with {} fuel, {} MB memory limit",
            plugin_id, fuel, limits.memory_mb
        );

        Ok(store)
    }

    /// Run one request through a plugin. Blocking; call from `spawn_blocking`.
    pub fn handle_request(
        &self,
        compiled: &CompiledPlugin,
        plugin_id: &str,
        limits: &PluginResourceLimits,
        request: &WasmHttpRequest,
    ) -> WasmResult<WasmHttpResponse> {
        let mut store = self.create_store(compiled, plugin_id, limits)?;

        let instance = Instance::new(&mut store, compiled.module(), &[])
            .map_err(|e| WasmError::InstantiationFailed(e.to_string()))?;

        let memory = instance
            .get_memory(&mut store, "memory")
            .ok_or_else(|| WasmError::ValidationFailed("missing export 'memory'".into()))?;
        let alloc = instance
            .get_typed_func::<i32, i32>(&mut store, "alloc")
            .map_err(|e| WasmError::ValidationFailed(format!("export 'alloc': {}", e)))?;
        let handle = instance
            .get_typed_func::<(i32, i32), i64>(&mut store, "handle")
            .map_err(|e| WasmError::ValidationFailed(format!("export 'handle': {}", e)))?;

        let payload = serde_json::to_vec(request)
            .map_err(|e| WasmError::CallFailed(format!("request encoding: {}", e)))?;
        let len = i32::try_from(payload.len())
            .map_err(|_| WasmError::CallFailed("request too large".into()))?;

        let ptr = alloc.call(&mut store, len)?;
        memory
            .write(&mut store, ptr as u32 as usize, &payload)
            .map_err(|e| WasmError::CallFailed(format!("writing request: {}", e)))?;

        let packed = handle.call(&mut store, (ptr, len))?;
        let (out_ptr, out_len) = unpack_ptr_len(packed);
        if out_len > MAX_RESPONSE_BYTES {
            return Err(WasmError::InvalidResponse(format!(
                "response of {} bytes exceeds {} byte limit",
                out_len, MAX_RESPONSE_BYTES
            )));
        }

        let mut buf = vec![0u8; out_len as usize];
        memory
            .read(&store, out_ptr as usize, &mut buf)
            .map_err(|e| WasmError::InvalidResponse(format!("reading response: {}", e)))?;

        let response: WasmHttpResponse = serde_json::from_slice(&buf)
            .map_err(|e| WasmError::InvalidResponse(e.to_string()))?;
        if !(100..=599).contains(&response.status) {
            return Err(WasmError::InvalidResponse(format!(
                "status {} out of range",
                response.status
            )));
        }

        if let Ok(remaining) = store.get_fuel() {
            debug!(
                plugin = plugin_id,
                fuel_remaining = remaining,
                status = response.status,
                "Plugin request handled"
            );
        }

        Ok(response)
    }
}

fn check_interface(module: &Module) -> WasmResult<()> {
    if let Some(import) = module.imports().next() {
        return Err(WasmError::ValidationFailed(format!(
            "plugin imports '{}::{}' but no host imports are provided",
            import.module(),
            import.name()
        )));
    }
    for name in REQUIRED_EXPORTS {
        if module.get_export(name).is_none() {
            return Err(WasmError::ValidationFailed(format!(
                "missing required export '{}'",
                name
            )));
        }
    }
    Ok(())
}

/// Execute a WASM function with timeout protection.
///
/// Uses dual-layer protection:
/// 1. Fuel metering for deterministic per-operation limits
/// 2. Wall-clock timeout as a backstop
pub async fn execute_with_timeout<F, T>(timeout_secs: u32, future: F) -> WasmResult<T>
where
    F: std::future::Future<Output = WasmResult<T>>,
{
    // Slightly longer than the fuel budget so fuel exhaustion triggers first
    let timeout = Duration::from_secs((timeout_secs + 1) as u64);

    match tokio::time::timeout(timeout, future).await {
        Ok(result) => result,
        Err(_) => {
            warn!(
                "WASM execution wall-clock timeout after {} seconds",
                timeout_secs
            );
            Err(WasmError::Timeout(timeout_secs))
        }
    }
}
