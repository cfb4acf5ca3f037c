//! Module spec vocabulary and readiness result types.
//!
//! Specs arrive as untyped JSON so malformed input can be reported field by
//! field; these enums name the closed value sets the validator checks against.

use serde::Serialize;

/// Allowed values of a spec's `kind`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SpecKind {
    Plugin,
    Service,
    App,
    Bundle,
}

impl SpecKind {
    pub const ALL: [SpecKind; 4] = [
        SpecKind::Plugin,
        SpecKind::Service,
        SpecKind::App,
        SpecKind::Bundle,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SpecKind::Plugin => "plugin",
            SpecKind::Service => "service",
            SpecKind::App => "app",
            SpecKind::Bundle => "bundle",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.as_str() == s)
    }
}

/// Allowed values of `modules[i].type`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ModuleType {
    FastapiRouter,
    Worker,
    ReactPage,
    DbMigration,
}

impl ModuleType {
    pub const ALL: [ModuleType; 4] = [
        ModuleType::FastapiRouter,
        ModuleType::Worker,
        ModuleType::ReactPage,
        ModuleType::DbMigration,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModuleType::FastapiRouter => "fastapi_router",
            ModuleType::Worker => "worker",
            ModuleType::ReactPage => "react_page",
            ModuleType::DbMigration => "db_migration",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|t| t.as_str() == s)
    }
}

/// Validator output. Never an error: malformed input yields `valid: false`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SpecValidation {
    pub valid: bool,
    pub errors: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReadinessStatus {
    Pass,
    Warn,
    Fail,
}

impl ReadinessStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadinessStatus::Pass => "PASS",
            ReadinessStatus::Warn => "WARN",
            ReadinessStatus::Fail => "FAIL",
        }
    }
}

impl std::fmt::Display for ReadinessStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessCheck {
    pub id: &'static str,
    pub passed: bool,
    pub weight: u32,
    pub notes: String,
}

/// Weighted rubric result, recomputed per request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadinessResult {
    pub score: u32,
    pub status: ReadinessStatus,
    pub checks: Vec<ReadinessCheck>,
}
