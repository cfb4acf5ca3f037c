//! Plugin manifest model for parsing `<slug>/manifest.json`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::plugin::PluginResourceLimits;

/// Version used when the manifest does not declare one.
pub const DEFAULT_PLUGIN_VERSION: &str = "0.1.0";

const ALLOWED_METHODS: &[&str] = &["GET", "POST", "PUT", "PATCH", "DELETE", "HEAD", "OPTIONS"];

/// Parsed view of a plugin's manifest.json.
///
/// Only the keys the host acts on are modelled; the raw JSON is stored as-is
/// in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginManifest {
    /// Display name (defaults to the slug)
    pub name: String,
    /// Plugin version (defaults to 0.1.0)
    pub version: String,
    pub description: Option<String>,
    /// Declared routes; empty means every path is forwarded
    #[serde(default)]
    pub routes: Vec<RouteDecl>,
    #[serde(default)]
    pub requirements: RequirementsConfig,
}

/// One route a plugin answers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteDecl {
    /// HTTP method; `None` matches any
    pub method: Option<String>,
    /// Path relative to `/ext/<slug>`; a trailing `/*` matches as prefix
    pub path: String,
}

impl RouteDecl {
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if let Some(ref m) = self.method {
            if !m.eq_ignore_ascii_case(method) {
                return false;
            }
        }
        match self.path.strip_suffix("/*") {
            Some(prefix) => {
                path == prefix
                    || path
                        .strip_prefix(prefix)
                        .is_some_and(|rest| rest.starts_with('/') || prefix.is_empty())
            }
            None => self.path == path,
        }
    }
}

/// Requirements section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementsConfig {
    /// Maximum memory limit in MB
    #[serde(default = "default_max_memory")]
    pub max_memory_mb: u32,
    /// Execution timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
}

fn default_max_memory() -> u32 {
    64
}

fn default_timeout() -> u32 {
    5
}

impl Default for RequirementsConfig {
    fn default() -> Self {
        Self {
            max_memory_mb: default_max_memory(),
            timeout_secs: default_timeout(),
        }
    }
}

impl PluginManifest {
    /// Parse a manifest for `slug` from its JSON content.
    ///
    /// `name` and `version` are read leniently: missing, null or blank values
    /// fall back to the slug and [`DEFAULT_PLUGIN_VERSION`].
    pub fn from_json(slug: &str, raw: &Value) -> Result<Self, ManifestValidationError> {
        let obj = raw.as_object().ok_or(ManifestValidationError::NotAnObject)?;

        let name = lenient_string(obj.get("name"), "name")?.unwrap_or_else(|| slug.to_string());
        let version = lenient_string(obj.get("version"), "version")?
            .unwrap_or_else(|| DEFAULT_PLUGIN_VERSION.to_string());
        let description = obj
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        let routes = match obj.get("routes") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(items)) => items
                .iter()
                .enumerate()
                .map(|(i, item)| parse_route(i, item))
                .collect::<Result<Vec<_>, _>>()?,
            Some(_) => {
                return Err(ManifestValidationError::InvalidField {
                    field: "routes",
                    reason: "must be an array".into(),
                })
            }
        };

        let requirements = match obj.get("requirements") {
            None | Some(Value::Null) => RequirementsConfig::default(),
            Some(v) => serde_json::from_value(v.clone()).map_err(|e| {
                ManifestValidationError::InvalidField {
                    field: "requirements",
                    reason: e.to_string(),
                }
            })?,
        };

        let manifest = Self {
            name,
            version,
            description,
            routes,
            requirements,
        };
        manifest.validate()?;
        Ok(manifest)
    }

    /// Validate the manifest for constraints not covered by parsing.
    pub fn validate(&self) -> Result<(), ManifestValidationError> {
        if self.requirements.max_memory_mb == 0 || self.requirements.max_memory_mb > 512 {
            return Err(ManifestValidationError::InvalidMemoryLimit(
                self.requirements.max_memory_mb,
            ));
        }

        if self.requirements.timeout_secs == 0 || self.requirements.timeout_secs > 300 {
            return Err(ManifestValidationError::InvalidTimeout(
                self.requirements.timeout_secs,
            ));
        }

        Ok(())
    }

    /// Whether a request should be forwarded to the plugin.
    pub fn allows(&self, method: &str, path: &str) -> bool {
        self.routes.is_empty() || self.routes.iter().any(|r| r.matches(method, path))
    }

    /// Convert requirements config to PluginResourceLimits.
    pub fn to_resource_limits(&self) -> PluginResourceLimits {
        PluginResourceLimits {
            memory_mb: self.requirements.max_memory_mb,
            timeout_secs: self.requirements.timeout_secs,
            fuel: (self.requirements.timeout_secs as u64) * 100_000_000,
        }
    }
}

fn lenient_string(
    value: Option<&Value>,
    field: &'static str,
) -> Result<Option<String>, ManifestValidationError> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) if s.trim().is_empty() => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.trim().to_string())),
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err(ManifestValidationError::InvalidField {
            field,
            reason: "must be a string".into(),
        }),
    }
}

fn parse_route(index: usize, item: &Value) -> Result<RouteDecl, ManifestValidationError> {
    let obj = item
        .as_object()
        .ok_or_else(|| ManifestValidationError::InvalidRoute(index, "must be an object".into()))?;

    let path = obj
        .get("path")
        .and_then(Value::as_str)
        .ok_or_else(|| ManifestValidationError::InvalidRoute(index, "path required".into()))?;
    if !path.starts_with('/') {
        return Err(ManifestValidationError::InvalidRoute(
            index,
            format!("path '{}' must start with '/'", path),
        ));
    }

    let method = match obj.get("method") {
        None | Some(Value::Null) => None,
        Some(Value::String(m)) => {
            let upper = m.to_ascii_uppercase();
            if !ALLOWED_METHODS.contains(&upper.as_str()) {
                return Err(ManifestValidationError::InvalidRoute(
                    index,
                    format!("unsupported method '{}'", m),
                ));
            }
            Some(upper)
        }
        Some(_) => {
            return Err(ManifestValidationError::InvalidRoute(
                index,
                "method must be a string".into(),
            ))
        }
    };

    Ok(RouteDecl {
        method,
        path: path.to_string(),
    })
}

/// Errors that can occur during manifest validation.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ManifestValidationError {
    #[error("manifest.json must be a JSON object")]
    NotAnObject,

    #[error("Invalid manifest field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },

    #[error("Invalid routes[{0}]: {1}")]
    InvalidRoute(usize, String),

    #[error("Invalid max_memory_mb {0}: must be between 1 and 512")]
    InvalidMemoryLimit(u32),

    #[error("Invalid timeout {0}: must be between 1 and 300 seconds")]
    InvalidTimeout(u32),
}
