//! Engine artifact model.

use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::FromRow;

/// Raw `engine_artifacts` row
#[derive(Debug, Clone, FromRow)]
pub struct ArtifactRow {
    pub id: String,
    pub kind: String,
    pub filename: String,
    pub storage_key: String,
    pub bytes: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub meta_json: String,
}

/// Artifact entity. Write-once: there is no update path.
#[derive(Debug, Clone, Serialize)]
pub struct Artifact {
    pub id: String,
    pub kind: String,
    pub filename: String,
    /// Storage key of the backing file
    pub path: String,
    pub bytes: i64,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
    pub meta: serde_json::Value,
}

impl From<ArtifactRow> for Artifact {
    fn from(row: ArtifactRow) -> Self {
        Self {
            meta: serde_json::from_str(&row.meta_json)
                .unwrap_or_else(|_| serde_json::Value::Object(Default::default())),
            id: row.id,
            kind: row.kind,
            filename: row.filename,
            path: row.storage_key,
            bytes: row.bytes,
            sha256: row.sha256,
            created_at: row.created_at,
        }
    }
}

/// Returned by the store operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArtifactDescriptor {
    pub id: String,
    pub kind: String,
    pub path: String,
    pub bytes: i64,
    pub sha256: String,
}

impl From<&Artifact> for ArtifactDescriptor {
    fn from(a: &Artifact) -> Self {
        Self {
            id: a.id.clone(),
            kind: a.kind.clone(),
            path: a.path.clone(),
            bytes: a.bytes,
            sha256: a.sha256.clone(),
        }
    }
}
