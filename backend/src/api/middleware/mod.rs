//! API middleware.

pub mod admin;
