//! HTTP request handlers.

pub mod engines;
pub mod factory;
pub mod health;
pub mod plugin_proxy;
pub mod plugins;
