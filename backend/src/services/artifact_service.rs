//! Artifact store: write-once files with a metadata row and SHA-256 digest.

use std::sync::{Arc, OnceLock};

use bytes::Bytes;
use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::artifact::{Artifact, ArtifactDescriptor, ArtifactRow};
use crate::storage::StorageBackend;

/// Upper bound for list queries.
pub const MAX_LIST_LIMIT: i64 = 500;

/// Artifact service
pub struct ArtifactService {
    db: SqlitePool,
    storage: Arc<dyn StorageBackend>,
}

impl ArtifactService {
    /// Create a new artifact service
    pub fn new(db: SqlitePool, storage: Arc<dyn StorageBackend>) -> Self {
        Self { db, storage }
    }

    /// Calculate SHA-256 checksum of data
    pub fn calculate_sha256(data: &[u8]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(data);
        format!("{:x}", hasher.finalize())
    }

    /// Persist `content` under a fresh id and record its row.
    pub async fn store(
        &self,
        kind: &str,
        filename: &str,
        content: Bytes,
        meta: serde_json::Value,
    ) -> Result<ArtifactDescriptor> {
        if kind.trim().is_empty() {
            return Err(AppError::Validation("artifact kind is required".into()));
        }

        let id = Uuid::new_v4().simple().to_string();
        let filename = sanitize_filename(filename);
        let storage_key = format!("{}__{}", id, filename);
        let sha256 = Self::calculate_sha256(&content);
        let bytes = content.len() as i64;
        let meta = if meta.is_object() {
            meta
        } else {
            serde_json::json!({})
        };

        self.storage.put(&storage_key, content).await?;

        let inserted = sqlx::query(
            r#"
            INSERT INTO engine_artifacts
                (id, kind, filename, storage_key, bytes, sha256, created_at, meta_json)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(kind)
        .bind(&filename)
        .bind(&storage_key)
        .bind(bytes)
        .bind(&sha256)
        .bind(Utc::now())
        .bind(meta.to_string())
        .execute(&self.db)
        .await;

        if let Err(e) = inserted {
            // Leave no orphan file behind a failed insert
            if let Err(cleanup) = self.storage.delete(&storage_key).await {
                warn!("Failed to remove orphaned artifact file {}: {}", storage_key, cleanup);
            }
            return Err(e.into());
        }

        info!(artifact_id = %id, kind, bytes, "Stored artifact");

        Ok(ArtifactDescriptor {
            id,
            kind: kind.to_string(),
            path: storage_key,
            bytes,
            sha256,
        })
    }

    /// Get artifact by ID
    pub async fn get(&self, id: &str) -> Result<Artifact> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, kind, filename, storage_key, bytes, sha256, created_at, meta_json
            FROM engine_artifacts
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Artifact '{}' not found", id)))?;

        Ok(row.into())
    }

    /// Fetch an artifact's content.
    ///
    /// A row whose backing file is missing yields [`AppError::Gone`], never
    /// empty content.
    pub async fn download(&self, id: &str) -> Result<(Artifact, Bytes)> {
        let artifact = self.get(id).await?;

        if !self.storage.exists(&artifact.path).await? {
            warn!(artifact_id = %id, path = %artifact.path, "Artifact file missing");
            return Err(AppError::Gone(format!(
                "Artifact '{}' exists but its file is missing",
                id
            )));
        }

        let content = self.storage.get(&artifact.path).await.map_err(|e| {
            warn!(artifact_id = %id, "Artifact file unreadable: {}", e);
            AppError::Gone(format!("Artifact '{}' file could not be read", id))
        })?;

        Ok((artifact, content))
    }

    /// Most recent artifacts first. `limit` is clamped to 1..=500.
    pub async fn list(&self, limit: Option<i64>) -> Result<Vec<Artifact>> {
        let limit = limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let rows = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, kind, filename, storage_key, bytes, sha256, created_at, meta_json
            FROM engine_artifacts
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Artifact::from).collect())
    }

    /// Most recent artifacts of one kind first.
    pub async fn list_kind(&self, kind: &str, limit: Option<i64>) -> Result<Vec<Artifact>> {
        let limit = limit.unwrap_or(MAX_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);
        let rows = sqlx::query_as::<_, ArtifactRow>(
            r#"
            SELECT id, kind, filename, storage_key, bytes, sha256, created_at, meta_json
            FROM engine_artifacts
            WHERE kind = ?
            ORDER BY created_at DESC, rowid DESC
            LIMIT ?
            "#,
        )
        .bind(kind)
        .bind(limit)
        .fetch_all(&self.db)
        .await?;

        Ok(rows.into_iter().map(Artifact::from).collect())
    }
}

fn dot_run_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\.{2,}").unwrap())
}

/// Reduce a client-supplied filename to a safe single path component.
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default();
    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .take(120)
        .collect();
    // Storage keys reject "..", so dot runs collapse to one underscore
    let cleaned = dot_run_regex().replace_all(&cleaned, "_");
    let cleaned = cleaned.trim_start_matches('.');
    if cleaned.is_empty() {
        "artifact.bin".to_string()
    } else {
        cleaned.to_string()
    }
}
