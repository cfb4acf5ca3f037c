//! Readiness scoring of module specs.
//!
//! The rubric and thresholds are fixed. Rendered reports and spec
//! comparisons are archived through the artifact store.

use std::sync::Arc;

use bytes::Bytes;
use serde::Serialize;
use serde_json::{json, Value};

use super::artifact_service::ArtifactService;
use super::spec_validator::{module_type, validate_spec};
use crate::error::Result;
use crate::models::artifact::ArtifactDescriptor;
use crate::models::module_spec::{ModuleType, ReadinessCheck, ReadinessResult, ReadinessStatus};

pub const PASS_THRESHOLD: u32 = 75;
pub const WARN_THRESHOLD: u32 = 55;

const WEIGHT_SPEC_VALID: u32 = 40;
const WEIGHT_HAS_API: u32 = 15;
const WEIGHT_HAS_UI: u32 = 15;
const WEIGHT_HAS_DB: u32 = 10;
const WEIGHT_HAS_WORKER: u32 = 10;
const WEIGHT_META: u32 = 10;

/// Map a score to its verdict.
pub fn status_for_score(score: u32) -> ReadinessStatus {
    if score >= PASS_THRESHOLD {
        ReadinessStatus::Pass
    } else if score >= WARN_THRESHOLD {
        ReadinessStatus::Warn
    } else {
        ReadinessStatus::Fail
    }
}

/// Score a spec against the rubric.
pub fn score_spec(spec: &Value) -> ReadinessResult {
    let validation = validate_spec(spec);

    let modules: &[Value] = spec
        .get("modules")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or_default();
    let has = |wanted: ModuleType| modules.iter().any(|m| module_type(m) == Some(wanted));

    let meta_present = spec
        .get("meta")
        .and_then(Value::as_object)
        .is_some_and(|m| !m.is_empty());

    let checks = vec![
        ReadinessCheck {
            id: "spec_valid",
            passed: validation.valid,
            weight: WEIGHT_SPEC_VALID,
            notes: validation.errors.join("; "),
        },
        check("has_api", has(ModuleType::FastapiRouter), WEIGHT_HAS_API),
        check("has_ui", has(ModuleType::ReactPage), WEIGHT_HAS_UI),
        check("has_db", has(ModuleType::DbMigration), WEIGHT_HAS_DB),
        check("has_worker", has(ModuleType::Worker), WEIGHT_HAS_WORKER),
        check("meta_present", meta_present, WEIGHT_META),
    ];

    let score = checks.iter().filter(|c| c.passed).map(|c| c.weight).sum();

    ReadinessResult {
        score,
        status: status_for_score(score),
        checks,
    }
}

fn check(id: &'static str, passed: bool, weight: u32) -> ReadinessCheck {
    ReadinessCheck {
        id,
        passed,
        weight,
        notes: String::new(),
    }
}

fn display_field(spec: &Value, key: &str, fallback: &str) -> String {
    match spec.get(key) {
        None | Some(Value::Null) => fallback.to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Render the deterministic Markdown report for a scored spec.
pub fn render_markdown(spec: &Value, result: &ReadinessResult) -> String {
    let mut lines = vec![
        format!("# Readiness Report: {}", display_field(spec, "name", "Untitled")),
        String::new(),
        format!("- Kind: **{}**", display_field(spec, "kind", "n/a")),
        format!("- Status: **{}**", result.status),
        format!("- Score: **{}/100**", result.score),
        String::new(),
        "## Checks".to_string(),
    ];

    for c in &result.checks {
        let verdict = if c.passed { "PASS" } else { "FAIL" };
        let notes = if c.notes.is_empty() {
            String::new()
        } else {
            format!("- {}", c.notes)
        };
        lines.push(format!("- `{}`: **{}** (w={}) {}", c.id, verdict, c.weight, notes));
    }

    lines.push(String::new());
    lines.push("## Recommendations".to_string());
    lines.push(
        match result.status {
            ReadinessStatus::Fail => {
                "- Fix schema validity and ensure at least one API module and UI module."
            }
            ReadinessStatus::Warn => "- Add missing modules (UI/DB/Worker) and enrich meta.",
            ReadinessStatus::Pass => {
                "- Baseline looks good. Next: tests, observability, versioning policy."
            }
        }
        .to_string(),
    );

    lines.join("\n")
}

/// CSV comparison of two scored specs: score row with delta, status row.
pub fn render_comparison_csv(a: &ReadinessResult, b: &ReadinessResult) -> String {
    let delta = a.score as i64 - b.score as i64;
    format!(
        "item,a,b,delta\r\nscore,{},{},{}\r\nstatus,{},{},\r\n",
        a.score, b.score, delta, a.status, b.status
    )
}

#[derive(Debug, Clone, Serialize)]
pub struct ReadinessReport {
    pub readiness: ReadinessResult,
    pub markdown: String,
    pub artifact: ArtifactDescriptor,
}

#[derive(Debug, Clone)]
pub struct Comparison {
    pub csv: String,
    pub artifact: ArtifactDescriptor,
}

/// Scores specs and archives the rendered outputs.
pub struct ReadinessService {
    artifacts: Arc<ArtifactService>,
}

impl ReadinessService {
    pub fn new(artifacts: Arc<ArtifactService>) -> Self {
        Self { artifacts }
    }

    /// Score `spec`, render the Markdown report and store it.
    pub async fn report(&self, spec: &Value) -> Result<ReadinessReport> {
        let readiness = score_spec(spec);
        let markdown = render_markdown(spec, &readiness);
        let artifact = self
            .artifacts
            .store(
                "readiness_md",
                "readiness.md",
                Bytes::from(markdown.clone()),
                json!({"name": spec.get("name"), "status": readiness.status}),
            )
            .await?;

        tracing::info!(
            score = readiness.score,
            status = %readiness.status,
            artifact_id = %artifact.id,
            "Readiness report stored"
        );

        Ok(ReadinessReport {
            readiness,
            markdown,
            artifact,
        })
    }

    /// Compare two specs and store the CSV.
    pub async fn compare(&self, a: &Value, b: &Value) -> Result<Comparison> {
        let csv = render_comparison_csv(&score_spec(a), &score_spec(b));
        let artifact = self
            .artifacts
            .store(
                "compare_csv",
                "compare.csv",
                Bytes::from(csv.clone()),
                json!({"a_name": a.get("name"), "b_name": b.get("name")}),
            )
            .await?;
        Ok(Comparison { csv, artifact })
    }
}
