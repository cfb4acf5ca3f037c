//! Business logic services.

pub mod artifact_service;
pub mod plugin_generator;
pub mod plugin_registry;
pub mod plugin_service;
pub mod presets;
pub mod readiness_service;
pub mod scaffold_service;
pub mod spec_validator;
pub mod wasm_bindings;
pub mod wasm_runtime;
