//! Staging bulk loader
//!
//! Loads a validated CSV stream into the staging table in one transaction:
//! purge any rows from an earlier attempt at the same file, then multi-row
//! batched inserts. Validation and loading happen in the same pass over the
//! file, so the validated and loaded row counts are the same number by
//! construction.

use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, info};

use crate::error::FileError;
use crate::reader::StrictReader;

/// Postgres limit on bind parameters per statement.
pub const PG_BIND_LIMIT: usize = 65_535;

/// Emit a progress log line every this many rows.
const PROGRESS_EVERY: u64 = 50_000;

/// Largest usable batch for a row of `column_count` CSV fields. Each row
/// binds its fields plus SOURCE_FILE and SOURCE_DIR; LOAD_TS is server-side.
pub fn effective_batch_size(batch_size: usize, column_count: usize) -> usize {
    let params_per_row = column_count + 2;
    batch_size.min(PG_BIND_LIMIT / params_per_row).max(1)
}

pub struct StagingLoader {
    pool: PgPool,
    batch_size: usize,
}

impl StagingLoader {
    pub fn new(pool: PgPool, batch_size: usize) -> Self {
        Self { pool, batch_size }
    }

    /// Purge earlier rows for this file, then stream the remaining records
    /// of `reader` into `table`. `columns` are the sanitized header names in
    /// file order. Returns the number of rows loaded. Any failure rolls the
    /// whole file back.
    pub async fn load_file(
        &self,
        table: &str,
        columns: &[String],
        reader: &mut StrictReader,
        source_file: &str,
        source_dir: &str,
    ) -> Result<u64, FileError> {
        let batch_size = effective_batch_size(self.batch_size, columns.len());
        debug!(table, batch_size, "Loading into staging");

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| FileError::load(format!("Cannot begin transaction: {}", e)))?;

        // Rows from an earlier failed attempt must not survive a reload.
        let purged = sqlx::query(&format!(
            "DELETE FROM {} WHERE source_file = $1 AND source_dir = $2",
            table
        ))
        .bind(source_file)
        .bind(source_dir)
        .execute(&mut *tx)
        .await
        .map_err(|e| FileError::load(format!("Purge of {} failed: {}", table, e)))?
        .rows_affected();
        if purged > 0 {
            info!(table, source_file, purged, "Purged rows from earlier attempt");
        }

        let insert_prefix = format!(
            "INSERT INTO {} ({}, source_file, source_dir, load_ts) ",
            table,
            columns.join(", ")
        );

        let mut batch: Vec<Vec<String>> = Vec::with_capacity(batch_size);
        let mut loaded: u64 = 0;

        for row in reader.by_ref() {
            batch.push(row?);
            if batch.len() == batch_size {
                loaded += self
                    .flush(&mut tx, &insert_prefix, &mut batch, source_file, source_dir)
                    .await?;
                if loaded % PROGRESS_EVERY < batch_size as u64 && loaded >= PROGRESS_EVERY {
                    info!(table, source_file, loaded, "Staging load progress");
                }
            }
        }
        if !batch.is_empty() {
            loaded += self
                .flush(&mut tx, &insert_prefix, &mut batch, source_file, source_dir)
                .await?;
        }

        // Validation and loading share one pass, so the counts cannot drift.
        debug_assert_eq!(loaded, reader.rows_yielded());

        tx.commit()
            .await
            .map_err(|e| FileError::load(format!("Commit failed: {}", e)))?;

        info!(table, source_file, loaded, "Staging load complete");
        Ok(loaded)
    }

    async fn flush(
        &self,
        tx: &mut sqlx::Transaction<'_, Postgres>,
        insert_prefix: &str,
        batch: &mut Vec<Vec<String>>,
        source_file: &str,
        source_dir: &str,
    ) -> Result<u64, FileError> {
        let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(insert_prefix);
        builder.push_values(batch.drain(..), |mut b, row| {
            for value in row {
                b.push_bind(value);
            }
            b.push_bind(source_file.to_string());
            b.push_bind(source_dir.to_string());
            b.push("now()");
        });

        let inserted = builder
            .build()
            .execute(&mut **tx)
            .await
            .map_err(|e| FileError::load(format!("Batch insert failed: {}", e)))?
            .rows_affected();
        Ok(inserted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_effective_batch_size_clamps() {
        // 26 columns -> 28 params per row -> 2340 rows fit under the limit
        assert_eq!(effective_batch_size(2000, 26), 2000);
        assert_eq!(effective_batch_size(5000, 26), PG_BIND_LIMIT / 28);
        assert_eq!(effective_batch_size(1, 26), 1);
    }

    #[test]
    fn test_effective_batch_size_wide_rows() {
        // Pathologically wide rows still get at least one row per statement.
        assert_eq!(effective_batch_size(2000, PG_BIND_LIMIT), 1);
    }
}
