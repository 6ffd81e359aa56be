//! Idempotency ledger
//!
//! One LOAD_AUDIT row per (source category, file name, file size) tracks the
//! file's lifecycle. A row that reaches SUCCESS is permanently idempotent:
//! any later sighting of the identical triple is skipped. Rows are upserted
//! on every transition and never deleted.

use anyhow::{Context, Result};
use sqlx::PgPool;
use tracing::debug;

/// Upper bound for the diagnostic message column.
pub const MAX_MESSAGE_LEN: usize = 4000;

/// Lifecycle status of a tracked file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditStatus {
    Downloaded,
    Validated,
    Staged,
    Transformed,
    Success,
    Error,
}

impl AuditStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AuditStatus::Downloaded => "DOWNLOADED",
            AuditStatus::Validated => "VALIDATED",
            AuditStatus::Staged => "STAGED",
            AuditStatus::Transformed => "TRANSFORMED",
            AuditStatus::Success => "SUCCESS",
            AuditStatus::Error => "ERROR",
        }
    }
}

/// Truncate a diagnostic message to the ledger column limit.
pub fn truncate_message(message: &str) -> String {
    message.chars().take(MAX_MESSAGE_LEN).collect()
}

/// Durable per-file audit trail.
#[derive(Clone)]
pub struct Ledger {
    pool: PgPool,
}

impl Ledger {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the audit table when it does not exist yet.
    pub async fn ensure_schema(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS load_audit (
                source_dir  TEXT NOT NULL,
                file_name   TEXT NOT NULL,
                file_size   BIGINT NOT NULL,
                status      TEXT NOT NULL,
                rows_csv    BIGINT,
                rows_db     BIGINT,
                load_ts     TIMESTAMPTZ NOT NULL DEFAULT now(),
                message     TEXT,
                PRIMARY KEY (source_dir, file_name, file_size)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create load_audit table")?;
        Ok(())
    }

    /// Create-or-update to DOWNLOADED, clearing any prior message. Written
    /// before the transfer starts so a crash mid-download stays visible;
    /// upsert semantics make reruns of interrupted executions safe.
    pub async fn record_seen(&self, source: &str, name: &str, size: i64) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO load_audit (source_dir, file_name, file_size, status, load_ts, message)
            VALUES ($1, $2, $3, 'DOWNLOADED', now(), NULL)
            ON CONFLICT (source_dir, file_name, file_size)
            DO UPDATE SET status = 'DOWNLOADED', load_ts = now(), message = NULL
            "#,
        )
        .bind(source)
        .bind(name)
        .bind(size)
        .execute(&self.pool)
        .await
        .context("Failed to upsert audit record")?;

        debug!(source, name, size, "Audit: DOWNLOADED");
        Ok(())
    }

    /// The permanent idempotency gate.
    pub async fn already_succeeded(&self, source: &str, name: &str, size: i64) -> Result<bool> {
        let exists: (bool,) = sqlx::query_as(
            r#"
            SELECT EXISTS (
                SELECT 1 FROM load_audit
                WHERE source_dir = $1 AND file_name = $2 AND file_size = $3
                  AND status = 'SUCCESS'
            )
            "#,
        )
        .bind(source)
        .bind(name)
        .bind(size)
        .fetch_one(&self.pool)
        .await
        .context("Failed to query audit record")?;

        Ok(exists.0)
    }

    /// Record an intermediate lifecycle transition.
    pub async fn mark_status(
        &self,
        source: &str,
        name: &str,
        size: i64,
        status: AuditStatus,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE load_audit
            SET status = $4, load_ts = now()
            WHERE source_dir = $1 AND file_name = $2 AND file_size = $3
            "#,
        )
        .bind(source)
        .bind(name)
        .bind(size)
        .bind(status.as_str())
        .execute(&self.pool)
        .await
        .context("Failed to update audit status")?;

        debug!(source, name, size, status = status.as_str(), "Audit transition");
        Ok(())
    }

    pub async fn mark_success(
        &self,
        source: &str,
        name: &str,
        size: i64,
        rows_validated: i64,
        rows_staged: i64,
        message: &str,
    ) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE load_audit
            SET status = 'SUCCESS', rows_csv = $4, rows_db = $5, load_ts = now(), message = $6
            WHERE source_dir = $1 AND file_name = $2 AND file_size = $3
            "#,
        )
        .bind(source)
        .bind(name)
        .bind(size)
        .bind(rows_validated)
        .bind(rows_staged)
        .bind(truncate_message(message))
        .execute(&self.pool)
        .await
        .context("Failed to mark audit success")?;
        Ok(())
    }

    pub async fn mark_error(&self, source: &str, name: &str, size: i64, message: &str) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE load_audit
            SET status = 'ERROR', load_ts = now(), message = $4
            WHERE source_dir = $1 AND file_name = $2 AND file_size = $3
            "#,
        )
        .bind(source)
        .bind(name)
        .bind(size)
        .bind(truncate_message(message))
        .execute(&self.pool)
        .await
        .context("Failed to mark audit error")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_message_bounds() {
        let short = "all fine";
        assert_eq!(truncate_message(short), short);

        let long = "x".repeat(MAX_MESSAGE_LEN + 100);
        assert_eq!(truncate_message(&long).chars().count(), MAX_MESSAGE_LEN);
    }

    #[test]
    fn test_status_labels() {
        assert_eq!(AuditStatus::Downloaded.as_str(), "DOWNLOADED");
        assert_eq!(AuditStatus::Success.as_str(), "SUCCESS");
        assert_eq!(AuditStatus::Error.as_str(), "ERROR");
    }
}
