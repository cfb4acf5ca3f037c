//! Structural validation of module specs.
//!
//! Every rule is evaluated independently and all violations are collected.
//! Malformed input never produces an error, only `valid: false`.

use serde_json::{json, Value};

use crate::models::module_spec::{ModuleType, SpecKind, SpecValidation};

/// Validate a module spec given as untyped JSON.
pub fn validate_spec(spec: &Value) -> SpecValidation {
    let Some(obj) = spec.as_object() else {
        return SpecValidation {
            valid: false,
            errors: vec!["spec must be an object".to_string()],
        };
    };

    let mut errors = Vec::new();

    let name_ok = obj
        .get("name")
        .and_then(Value::as_str)
        .is_some_and(|n| n.trim().chars().count() >= 2);
    if !name_ok {
        errors.push("name must be a string (min length 2)".to_string());
    }

    let kind_ok = obj
        .get("kind")
        .and_then(Value::as_str)
        .and_then(SpecKind::parse)
        .is_some();
    if !kind_ok {
        errors.push("kind must be one of: plugin|service|app|bundle".to_string());
    }

    match obj.get("modules").and_then(Value::as_array) {
        Some(modules) if !modules.is_empty() => {
            for (i, module) in modules.iter().enumerate() {
                let Some(m) = module.as_object() else {
                    errors.push(format!("modules[{}] must be an object", i));
                    continue;
                };
                let id_ok = m
                    .get("id")
                    .and_then(Value::as_str)
                    .is_some_and(|id| !id.trim().is_empty());
                if !id_ok {
                    errors.push(format!("modules[{}].id required", i));
                }
                if module_type(module).is_none() {
                    errors.push(format!("modules[{}].type invalid", i));
                }
            }
        }
        _ => errors.push("modules must be a non-empty array".to_string()),
    }

    SpecValidation {
        valid: errors.is_empty(),
        errors,
    }
}

/// Module type of one `modules[i]` entry, if it is a recognised one.
pub fn module_type(module: &Value) -> Option<ModuleType> {
    module
        .get("type")
        .and_then(Value::as_str)
        .and_then(ModuleType::parse)
}

/// JSON schema describing the accepted module spec shape.
pub fn spec_schema() -> Value {
    let kinds: Vec<&str> = SpecKind::ALL.iter().map(SpecKind::as_str).collect();
    let types: Vec<&str> = ModuleType::ALL.iter().map(ModuleType::as_str).collect();
    json!({
        "type": "object",
        "required": ["name", "kind", "modules"],
        "properties": {
            "name": {"type": "string", "minLength": 2},
            "kind": {"type": "string", "enum": kinds},
            "modules": {
                "type": "array",
                "minItems": 1,
                "items": {
                    "type": "object",
                    "required": ["id", "type"],
                    "properties": {
                        "id": {"type": "string"},
                        "type": {"type": "string", "enum": types},
                        "config": {"type": "object"}
                    }
                }
            },
            "meta": {"type": "object"}
        }
    })
}
