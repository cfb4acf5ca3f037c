//! Database and API models.

pub mod artifact;
pub mod export;
pub mod module_spec;
pub mod plugin;
pub mod plugin_manifest;
