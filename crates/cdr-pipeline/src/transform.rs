//! Staging-to-detail transform
//!
//! The whole transform for a file is one SQL statement built from the
//! source's column mapping: `INSERT INTO detail ... SELECT <expressions>
//! FROM staging WHERE <row filter> ON CONFLICT (<dedup key>) DO NOTHING`.
//! Identifiers come from the validated static mapping; runtime values
//! (file name, source dir) are always bound parameters.
//!
//! Row filtering, cleaning, type coercion and deduplication all run inside
//! the database. A row that fails the filter is rejected silently; a row
//! whose dedup key already exists in the detail store is skipped by the
//! conflict clause.

use sqlx::PgPool;
use tracing::{debug, info, warn};

use crate::config::{CleanupStrategy, SourceConfig, TimestampUnit};
use crate::error::FileError;
use crate::mapping::{CleanRule, ColumnMapping, ColumnRule, ColumnType};

/// Per-file transform result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransformOutcome {
    /// Rows present in staging for this file.
    pub staged: u64,
    /// Rows that passed the row filter.
    pub passing: u64,
    /// Rows actually inserted into the detail store.
    pub inserted: u64,
    /// Rows rejected by the row filter.
    pub rejected: u64,
    /// Passing rows skipped because their dedup key already existed.
    pub deduplicated: u64,
}

fn ident(name: &str) -> String {
    name.to_lowercase()
}

/// Cleaning expression for a staged column.
fn clean_expr(rule: &ColumnRule) -> String {
    let col = ident(rule.source);
    match rule.clean {
        CleanRule::None => col,
        CleanRule::Trim => format!("TRIM({})", col),
        CleanRule::Upper => format!("UPPER(TRIM({}))", col),
        CleanRule::Msisdn => format!("regexp_replace({}, '[\\r\\n\\t ]', '', 'g')", col),
    }
}

fn timestamp_expr(inner: &str, unit: TimestampUnit) -> String {
    match unit {
        TimestampUnit::Seconds => format!("to_timestamp(({})::bigint)", inner),
        TimestampUnit::Milliseconds => {
            format!("to_timestamp(({})::bigint::double precision / 1000)", inner)
        },
    }
}

/// Full select expression for one mapped column: clean, then coerce, then
/// apply the default for optional-but-empty values.
fn select_expr(rule: &ColumnRule, unit: TimestampUnit) -> String {
    let cleaned = clean_expr(rule);
    let coerced = match rule.kind {
        ColumnType::Text { max_length: Some(n) } => format!("substr({}, 1, {})", cleaned, n),
        ColumnType::Text { max_length: None } => cleaned,
        ColumnType::Number => format!(
            "CASE WHEN TRIM({col}) ~ '^[+-]?[0-9]+(\\.[0-9]+)?$' THEN TRIM({col})::numeric ELSE NULL END",
            col = ident(rule.source)
        ),
        ColumnType::Timestamp => timestamp_expr(&cleaned, unit),
    };
    match rule.default {
        Some(default) => format!("COALESCE(NULLIF({}, ''), '{}')", coerced, default),
        None => coerced,
    }
}

/// First non-empty trimmed value among the dedup key candidates.
fn dedup_expr(mapping: &ColumnMapping) -> String {
    let candidates: Vec<String> = mapping
        .dedup_keys
        .iter()
        .map(|k| format!("NULLIF(TRIM({}), '')", ident(k)))
        .collect();
    format!("COALESCE({})", candidates.join(", "))
}

/// Row filter: every timestamp column purely numeric (required or not, since
/// a non-numeric value would break the epoch conversion), every other
/// required column non-empty after cleaning, and a resolvable dedup key.
fn row_filter(mapping: &ColumnMapping) -> Vec<String> {
    let mut clauses = Vec::new();
    for rule in &mapping.columns {
        if matches!(rule.kind, ColumnType::Timestamp) {
            clauses.push(format!("TRIM({}) ~ '^[0-9]+$'", ident(rule.source)));
        } else if rule.required {
            clauses.push(format!("NULLIF({}, '') IS NOT NULL", clean_expr(rule)));
        }
    }
    clauses.push(format!("{} IS NOT NULL", dedup_expr(mapping)));
    clauses
}

/// Build the single transform statement for a source. `$1` is the file name
/// and `$2` the source dir.
fn build_transform_sql(source: &SourceConfig, unit: TimestampUnit) -> String {
    let mapping = &source.mapping;
    let dedup_target = mapping
        .rule(mapping.dedup_keys[0])
        .and_then(|r| r.detail_column)
        .unwrap_or(mapping.dedup_keys[0]);

    let mut targets: Vec<String> = Vec::new();
    let mut exprs: Vec<String> = Vec::new();

    for rule in &mapping.columns {
        let Some(detail) = rule.detail_column else {
            continue; // dedup-only column
        };

        if rule.source == mapping.start_time_column {
            // Calendar timestamp, derived hour, and the raw value verbatim.
            targets.push(ident(detail));
            exprs.push(select_expr(rule, unit));
            targets.push("start_hour".to_string());
            exprs.push(format!(
                "EXTRACT(HOUR FROM {})::int",
                timestamp_expr(&clean_expr(rule), unit)
            ));
            targets.push(ident(rule.source));
            exprs.push(format!("TRIM({})", ident(rule.source)));
        } else if detail == dedup_target {
            targets.push(ident(detail));
            let truncated = match rule.kind {
                ColumnType::Text { max_length: Some(n) } => {
                    format!("substr({}, 1, {})", dedup_expr(mapping), n)
                },
                _ => dedup_expr(mapping),
            };
            exprs.push(truncated);
        } else {
            targets.push(ident(detail));
            exprs.push(select_expr(rule, unit));
        }
    }

    targets.push("source_file".to_string());
    exprs.push("$1".to_string());
    targets.push("source_dir".to_string());
    exprs.push("$2".to_string());
    targets.push("load_ts".to_string());
    exprs.push("now()".to_string());

    let mut filters = vec![
        "source_file = $1".to_string(),
        "source_dir = $2".to_string(),
    ];
    filters.extend(row_filter(mapping));

    format!(
        "INSERT INTO {detail} ({targets}) SELECT {exprs} FROM {staging} WHERE {filters} \
         ON CONFLICT ({conflict}) DO NOTHING",
        detail = source.detail_table,
        targets = targets.join(", "),
        exprs = exprs.join(", "),
        staging = source.staging_table,
        filters = filters.join(" AND "),
        conflict = ident(dedup_target),
    )
}

fn purge_sql(source: &SourceConfig) -> String {
    format!(
        "DELETE FROM {} WHERE source_file = $1 AND source_dir = $2",
        source.staging_table
    )
}

/// Whether staged rows are purged within the transform transaction itself.
/// On-error cleanup cannot be transactional; the failed transaction is
/// already rolled back by the time cleanup runs.
fn purge_with_transform(cleanup: CleanupStrategy) -> bool {
    cleanup == CleanupStrategy::OnSuccess
}

fn build_passing_count_sql(source: &SourceConfig) -> String {
    let mut filters = vec![
        "source_file = $1".to_string(),
        "source_dir = $2".to_string(),
    ];
    filters.extend(row_filter(&source.mapping));
    format!(
        "SELECT count(*) FROM {} WHERE {}",
        source.staging_table,
        filters.join(" AND ")
    )
}

pub struct TransformEngine {
    pool: PgPool,
    timestamp_unit: TimestampUnit,
    cleanup: CleanupStrategy,
}

impl TransformEngine {
    pub fn new(pool: PgPool, timestamp_unit: TimestampUnit, cleanup: CleanupStrategy) -> Self {
        Self {
            pool,
            timestamp_unit,
            cleanup,
        }
    }

    /// Transform the staged rows of one file into the detail store.
    pub async fn transform_file(
        &self,
        source: &SourceConfig,
        source_file: &str,
        source_dir: &str,
    ) -> Result<TransformOutcome, FileError> {
        if source.mapping.is_empty() {
            return Err(FileError::transform(format!(
                "No transform mapping defined for source type {}",
                source.name
            )));
        }

        let outcome = self.run_transform(source, source_file, source_dir).await;

        match &outcome {
            Ok(o) => {
                info!(
                    source = %source.name,
                    source_file,
                    staged = o.staged,
                    inserted = o.inserted,
                    rejected = o.rejected,
                    deduplicated = o.deduplicated,
                    "Transform complete"
                );
            },
            Err(e) => {
                warn!(source = %source.name, source_file, error = %e, "Transform failed");
                if self.cleanup == CleanupStrategy::OnError {
                    // Best effort; the original failure is what gets reported.
                    if let Err(purge_err) =
                        self.purge_staging(source, source_file, source_dir).await
                    {
                        warn!(source_file, error = %purge_err, "Post-failure purge failed");
                    }
                }
            },
        }

        outcome
    }

    async fn run_transform(
        &self,
        source: &SourceConfig,
        source_file: &str,
        source_dir: &str,
    ) -> Result<TransformOutcome, FileError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| FileError::transform(format!("Cannot begin transaction: {}", e)))?;

        let staged: (i64,) = sqlx::query_as(&format!(
            "SELECT count(*) FROM {} WHERE source_file = $1 AND source_dir = $2",
            source.staging_table
        ))
        .bind(source_file)
        .bind(source_dir)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| FileError::transform(format!("Staged count failed: {}", e)))?;
        let staged = staged.0 as u64;

        if staged == 0 {
            info!(source = %source.name, source_file, "No staged rows, nothing to transform");
            return Ok(TransformOutcome {
                staged: 0,
                passing: 0,
                inserted: 0,
                rejected: 0,
                deduplicated: 0,
            });
        }

        let passing: (i64,) = sqlx::query_as(&build_passing_count_sql(source))
            .bind(source_file)
            .bind(source_dir)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| FileError::transform(format!("Filter count failed: {}", e)))?;
        let passing = passing.0 as u64;

        let sql = build_transform_sql(source, self.timestamp_unit);
        debug!(source = %source.name, "Transform statement: {}", sql);

        let inserted = sqlx::query(&sql)
            .bind(source_file)
            .bind(source_dir)
            .execute(&mut *tx)
            .await
            .map_err(|e| FileError::transform(format!("Detail insert failed: {}", e)))?
            .rows_affected();

        // Purge in the same transaction, so the detail insert and the staging
        // cleanup land (or fail) together.
        if purge_with_transform(self.cleanup) {
            sqlx::query(&purge_sql(source))
                .bind(source_file)
                .bind(source_dir)
                .execute(&mut *tx)
                .await
                .map_err(|e| FileError::transform(format!("Staging purge failed: {}", e)))?;
        }

        tx.commit()
            .await
            .map_err(|e| FileError::transform(format!("Commit failed: {}", e)))?;

        Ok(TransformOutcome {
            staged,
            passing,
            inserted,
            rejected: staged.saturating_sub(passing),
            deduplicated: passing.saturating_sub(inserted),
        })
    }

    async fn purge_staging(
        &self,
        source: &SourceConfig,
        source_file: &str,
        source_dir: &str,
    ) -> Result<(), FileError> {
        sqlx::query(&purge_sql(source))
            .bind(source_file)
            .bind(source_dir)
            .execute(&self.pool)
            .await
            .map_err(|e| FileError::transform(format!("Staging purge failed: {}", e)))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PipelineConfig;
    use crate::mapping::occ_mapping;

    fn occ_source() -> SourceConfig {
        PipelineConfig::default().source("OCC").unwrap().clone()
    }

    #[test]
    fn test_clean_expressions() {
        let mapping = occ_mapping();
        assert_eq!(clean_expr(mapping.rule("DATASOURCE").unwrap()), "TRIM(datasource)");
        assert_eq!(
            clean_expr(mapping.rule("CALL_TYPE").unwrap()),
            "UPPER(TRIM(call_type))"
        );
        assert_eq!(
            clean_expr(mapping.rule("A_MSISDN").unwrap()),
            "regexp_replace(a_msisdn, '[\\r\\n\\t ]', '', 'g')"
        );
    }

    #[test]
    fn test_number_coercion_nulls_garbage() {
        let mapping = occ_mapping();
        let expr = select_expr(mapping.rule("EVENT_COUNT").unwrap(), TimestampUnit::Seconds);
        assert!(expr.contains("~ '^[+-]?[0-9]+(\\.[0-9]+)?$'"));
        assert!(expr.contains("ELSE NULL END"));
    }

    #[test]
    fn test_default_applies_to_optional_keyword() {
        let mapping = occ_mapping();
        let expr = select_expr(mapping.rule("KEYWORD").unwrap(), TimestampUnit::Seconds);
        assert!(expr.starts_with("COALESCE(NULLIF("));
        assert!(expr.ends_with("'_N')"));
    }

    #[test]
    fn test_timestamp_units() {
        assert_eq!(
            timestamp_expr("TRIM(orig_start_time)", TimestampUnit::Seconds),
            "to_timestamp((TRIM(orig_start_time))::bigint)"
        );
        assert!(
            timestamp_expr("x", TimestampUnit::Milliseconds).contains("/ 1000"),
        );
    }

    #[test]
    fn test_dedup_chain_order() {
        let expr = dedup_expr(&occ_mapping());
        assert_eq!(
            expr,
            "COALESCE(NULLIF(TRIM(charging_id), ''), NULLIF(TRIM(call_reference), ''), \
             NULLIF(TRIM(record_id), ''))"
        );
    }

    #[test]
    fn test_transform_sql_shape() {
        let sql = build_transform_sql(&occ_source(), TimestampUnit::Seconds);
        assert!(sql.starts_with("INSERT INTO ra_t_occ_cdr_detail ("));
        assert!(sql.contains("FROM ra_t_tmp_occ"));
        assert!(sql.ends_with("ON CONFLICT (charging_id) DO NOTHING"));
        // Start-time column yields three targets.
        assert!(sql.contains("start_date"));
        assert!(sql.contains("start_hour"));
        assert!(sql.contains("orig_start_time"));
        // Dedup-only columns never become detail targets.
        assert!(!sql.contains("call_reference,"));
        // Runtime values are bound, not spliced.
        assert!(sql.contains("source_file = $1"));
        assert!(sql.contains("source_dir = $2"));
    }

    #[test]
    fn test_row_filter_covers_required_and_dedup() {
        let clauses = row_filter(&occ_mapping());
        assert!(clauses.iter().any(|c| c == "TRIM(orig_start_time) ~ '^[0-9]+$'"));
        assert!(clauses
            .iter()
            .any(|c| c.contains("regexp_replace(a_msisdn") && c.ends_with("IS NOT NULL")));
        assert!(clauses.last().unwrap().starts_with("COALESCE("));
        // Optional columns impose no filter.
        assert!(!clauses.iter().any(|c| c.contains("b_msisdn")));
    }

    #[test]
    fn test_timestamp_filter_applies_to_optional_columns() {
        let mut mapping = occ_mapping();
        mapping.columns.push(ColumnRule {
            source: "END_TIME",
            detail_column: Some("END_DATE"),
            required: false,
            kind: ColumnType::Timestamp,
            clean: CleanRule::Trim,
            default: None,
        });
        let clauses = row_filter(&mapping);
        assert!(clauses.iter().any(|c| c == "TRIM(orig_start_time) ~ '^[0-9]+$'"));
        assert!(clauses.iter().any(|c| c == "TRIM(end_time) ~ '^[0-9]+$'"));
    }

    #[test]
    fn test_on_success_purge_runs_inside_transaction() {
        assert!(purge_with_transform(CleanupStrategy::OnSuccess));
        assert!(!purge_with_transform(CleanupStrategy::OnError));
        assert!(!purge_with_transform(CleanupStrategy::Never));
    }

    #[test]
    fn test_passing_count_uses_same_filter() {
        let source = occ_source();
        let count_sql = build_passing_count_sql(&source);
        let insert_sql = build_transform_sql(&source, TimestampUnit::Seconds);
        let filter = count_sql.split(" WHERE ").nth(1).unwrap();
        assert!(insert_sql.contains(filter));
    }
}
