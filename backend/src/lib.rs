//! Atlas backend library.
//!
//! Route plugin registry with a wasm sandbox, module spec readiness engines
//! and the scaffold factory.

#[macro_use]
mod macros;

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod storage;
pub mod telemetry;

pub use config::Config;
pub use error::{AppError, Result};
