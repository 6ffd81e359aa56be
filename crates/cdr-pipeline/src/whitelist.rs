//! Schema whitelist resolver
//!
//! Answers "which input columns are acceptable for source type T at stage
//! S". For the staging stage the column set is introspected from the staging
//! table and cached for 24 hours in a small SQLite database, so the cache
//! survives process exit and maintenance commands operate on the same state
//! the sweep sees. When introspection fails or returns nothing the resolver
//! degrades to permissive mode (accept everything, logged as a warning)
//! rather than blocking ingestion. For the detail stage the whitelist is
//! exactly the mapped source columns.

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use sqlx::PgPool;
use std::path::PathBuf;
use tracing::{debug, info, warn};

use crate::config::{SourceConfig, WhitelistMode};
use crate::mapping::TECHNICAL_COLUMNS;

/// Default lifetime of an introspected column set.
pub const CACHE_TTL_SECS: i64 = 86_400;

/// Durable TTL cache for introspected column sets, keyed by source type.
/// One SQLite file shared by every process using the same local root.
pub struct ColumnCache {
    db_path: PathBuf,
    ttl_secs: i64,
}

impl ColumnCache {
    pub fn new(db_path: PathBuf) -> Self {
        let ttl_secs = std::env::var("CDR_COLUMN_CACHE_TTL")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(CACHE_TTL_SECS);

        Self { db_path, ttl_secs }
    }

    fn open_connection(&self) -> Result<Connection> {
        if let Some(parent) = self.db_path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        Connection::open(&self.db_path)
            .with_context(|| format!("Cannot open cache db {}", self.db_path.display()))
    }

    /// Create the cache schema when it does not exist yet.
    pub fn init(&self) -> Result<()> {
        let conn = self.open_connection()?;
        conn.execute(
            r#"
            CREATE TABLE IF NOT EXISTS column_cache (
                source_type   TEXT PRIMARY KEY,
                columns_json  TEXT NOT NULL,
                expires_at    TEXT NOT NULL
            )
            "#,
            [],
        )
        .context("Cannot create column_cache table")?;
        debug!(path = %self.db_path.display(), "Column cache schema initialized");
        Ok(())
    }

    pub fn get(&self, key: &str) -> Result<Option<Vec<String>>> {
        let conn = self.open_connection()?;
        let row: rusqlite::Result<(String, String)> = conn.query_row(
            "SELECT columns_json, expires_at FROM column_cache WHERE source_type = ?1",
            params![key],
            |row| Ok((row.get(0)?, row.get(1)?)),
        );

        match row {
            Ok((columns_json, expires_at)) => {
                let expires_at: DateTime<Utc> = expires_at
                    .parse()
                    .context("Invalid expiry timestamp in column cache")?;
                if Utc::now() > expires_at {
                    debug!(key, "Column cache entry expired");
                    let _ = self.forget(key);
                    return Ok(None);
                }
                let columns: Vec<String> =
                    serde_json::from_str(&columns_json).context("Corrupt column cache entry")?;
                Ok(Some(columns))
            },
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e).context("Column cache query failed"),
        }
    }

    pub fn put(&self, key: &str, columns: &[String]) -> Result<()> {
        self.put_with_ttl(key, columns, Duration::seconds(self.ttl_secs))
    }

    pub fn put_with_ttl(&self, key: &str, columns: &[String], ttl: Duration) -> Result<()> {
        let columns_json = serde_json::to_string(columns)?;
        let expires_at = (Utc::now() + ttl).to_rfc3339();

        let conn = self.open_connection()?;
        conn.execute(
            r#"
            INSERT OR REPLACE INTO column_cache (source_type, columns_json, expires_at)
            VALUES (?1, ?2, ?3)
            "#,
            params![key, columns_json, expires_at],
        )
        .context("Column cache insert failed")?;
        Ok(())
    }

    pub fn forget(&self, key: &str) -> Result<()> {
        let conn = self.open_connection()?;
        conn.execute(
            "DELETE FROM column_cache WHERE source_type = ?1",
            params![key],
        )
        .context("Column cache delete failed")?;
        Ok(())
    }
}

/// Stage a header is validated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Staging,
    Detail,
}

/// Result of a whitelist check.
#[derive(Debug, Clone)]
pub struct ValidationOutcome {
    pub valid: bool,
    pub unknown_columns: Vec<String>,
}

/// Resolver for per-source, per-stage column whitelists.
pub struct WhitelistResolver {
    pool: PgPool,
    mode: WhitelistMode,
    cache: ColumnCache,
}

impl WhitelistResolver {
    pub fn new(pool: PgPool, mode: WhitelistMode, cache: ColumnCache) -> Self {
        Self { pool, mode, cache }
    }

    fn cache_key(source: &SourceConfig) -> String {
        source.name.to_lowercase()
    }

    /// Introspect the current column set of a table.
    pub async fn table_columns(&self, table: &str) -> Result<Vec<String>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT column_name FROM information_schema.columns
            WHERE table_name = $1
            ORDER BY ordinal_position
            "#,
        )
        .bind(table.to_lowercase())
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to introspect columns of {}", table))?;

        Ok(rows.into_iter().map(|(c,)| c.to_uppercase()).collect())
    }

    /// Staging whitelist for a source, cached. An empty result means
    /// permissive mode. Cache failures count as misses.
    pub async fn staging_whitelist(&self, source: &SourceConfig) -> Vec<String> {
        let key = Self::cache_key(source);
        match self.cache.get(&key) {
            Ok(Some(columns)) => return columns,
            Ok(None) => {},
            Err(e) => warn!(key, error = %e, "Column cache read failed"),
        }

        match self.table_columns(&source.staging_table).await {
            Ok(columns) => {
                info!(
                    source = %source.name,
                    table = %source.staging_table,
                    count = columns.len(),
                    "Cached staging whitelist"
                );
                if let Err(e) = self.cache.put(&key, &columns) {
                    warn!(key, error = %e, "Column cache write failed");
                }
                columns
            },
            Err(e) => {
                warn!(
                    source = %source.name,
                    table = %source.staging_table,
                    error = %e,
                    "Column introspection failed, falling back to permissive mode"
                );
                Vec::new()
            },
        }
    }

    /// Drop then re-introspect the cached whitelist for a source.
    pub async fn refresh(&self, source: &SourceConfig) -> Result<Vec<String>> {
        let key = Self::cache_key(source);
        self.cache.forget(&key)?;
        let columns = self.table_columns(&source.staging_table).await?;
        self.cache.put(&key, &columns)?;
        Ok(columns)
    }

    /// Currently cached whitelist for a source, if any.
    pub fn cached(&self, source: &SourceConfig) -> Result<Option<Vec<String>>> {
        self.cache.get(&Self::cache_key(source))
    }

    pub fn forget(&self, source: &SourceConfig) -> Result<()> {
        self.cache.forget(&Self::cache_key(source))
    }

    /// Validate header columns for a source at a stage. Technical columns
    /// are always acceptable.
    pub async fn validate(
        &self,
        header: &[String],
        source: &SourceConfig,
        stage: Stage,
    ) -> ValidationOutcome {
        let allowed: Vec<String> = match stage {
            Stage::Detail => source
                .mapping
                .whitelist()
                .into_iter()
                .map(str::to_string)
                .collect(),
            Stage::Staging => match self.mode {
                WhitelistMode::Permissive => {
                    return ValidationOutcome {
                        valid: true,
                        unknown_columns: Vec::new(),
                    }
                },
                WhitelistMode::Strict => source
                    .mapping
                    .whitelist()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
                WhitelistMode::Dynamic => {
                    let columns = self.staging_whitelist(source).await;
                    if columns.is_empty() {
                        warn!(
                            source = %source.name,
                            "Staging whitelist empty, accepting all columns"
                        );
                        return ValidationOutcome {
                            valid: true,
                            unknown_columns: Vec::new(),
                        };
                    }
                    columns
                },
            },
        };

        let unknown_columns = check_against(header, &allowed);
        ValidationOutcome {
            valid: unknown_columns.is_empty(),
            unknown_columns,
        }
    }
}

fn check_against(header: &[String], allowed: &[String]) -> Vec<String> {
    header
        .iter()
        .filter(|col| {
            !allowed.iter().any(|a| a.eq_ignore_ascii_case(col))
                && !TECHNICAL_COLUMNS
                    .iter()
                    .any(|t| t.eq_ignore_ascii_case(col))
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn header(cols: &[&str]) -> Vec<String> {
        cols.iter().map(|s| s.to_string()).collect()
    }

    fn create_test_cache() -> (ColumnCache, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let cache = ColumnCache::new(dir.path().join("cache.db"));
        cache.init().unwrap();
        (cache, dir)
    }

    #[test]
    fn test_check_against_flags_unknown() {
        let allowed = header(&["DATASOURCE", "A_MSISDN"]);
        let unknown = check_against(
            &header(&["DATASOURCE", "A_MSISDN", "UNKNOWN_FIELD_1", "INVALID_COL"]),
            &allowed,
        );
        assert_eq!(unknown, header(&["UNKNOWN_FIELD_1", "INVALID_COL"]));
    }

    #[test]
    fn test_technical_columns_always_allowed() {
        let allowed = header(&["DATASOURCE"]);
        let unknown = check_against(
            &header(&["DATASOURCE", "SOURCE_FILE", "SOURCE_DIR", "LOAD_TS"]),
            &allowed,
        );
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_check_is_case_insensitive() {
        let allowed = header(&["charging_id"]);
        let unknown = check_against(&header(&["CHARGING_ID"]), &allowed);
        assert!(unknown.is_empty());
    }

    #[test]
    fn test_raw_header_names_are_not_normalized() {
        // "A MSISDN" must be flagged even though its sanitized form would
        // match; the whitelist check sees the header as written.
        let allowed = header(&["A_MSISDN"]);
        let unknown = check_against(&header(&["A MSISDN"]), &allowed);
        assert_eq!(unknown, header(&["A MSISDN"]));
    }

    #[test]
    fn test_cache_roundtrip_and_forget() {
        let (cache, _dir) = create_test_cache();
        assert!(cache.get("occ").unwrap().is_none());

        cache.put("occ", &header(&["A", "B"])).unwrap();
        assert_eq!(cache.get("occ").unwrap().unwrap(), header(&["A", "B"]));

        cache.forget("occ").unwrap();
        assert!(cache.get("occ").unwrap().is_none());
    }

    #[test]
    fn test_cache_entry_expires() {
        let (cache, _dir) = create_test_cache();
        cache
            .put_with_ttl("occ", &header(&["A"]), Duration::seconds(-1))
            .unwrap();
        assert!(cache.get("occ").unwrap().is_none());
    }

    #[test]
    fn test_cache_survives_reopen() {
        // Separate instances over the same file see each other's entries,
        // which is what makes the maintenance command effective.
        let dir = tempdir().unwrap();
        let db_path = dir.path().join("cache.db");

        let writer = ColumnCache::new(db_path.clone());
        writer.init().unwrap();
        writer.put("occ", &header(&["A", "B"])).unwrap();
        drop(writer);

        let reader = ColumnCache::new(db_path);
        reader.init().unwrap();
        assert_eq!(reader.get("occ").unwrap().unwrap(), header(&["A", "B"]));

        reader.forget("occ").unwrap();
        assert!(reader.get("occ").unwrap().is_none());
    }
}
