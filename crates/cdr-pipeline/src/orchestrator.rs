//! Sweep orchestrator
//!
//! Drives one sweep over all configured source categories: list the remote
//! drop area, skip files already processed, then walk each new file through
//! download, validation, staging load and transform. Files are independent
//! units of work; one bad file is recorded and moved aside while the sweep
//! continues. A listing failure aborts only that category.

use anyhow::{Context, Result};
use tracing::{debug, error, info, warn};

use crate::config::{PipelineConfig, SourceConfig};
use crate::error::FileError;
use crate::ftp::FtpClient;
use crate::ledger::{AuditStatus, Ledger};
use crate::loader::StagingLoader;
use crate::reader::StrictReader;
use crate::sanitize::sanitize_header;
use crate::store::LocalStore;
use crate::transform::{TransformEngine, TransformOutcome};
use crate::whitelist::{ColumnCache, Stage, WhitelistResolver};

/// Aggregate result of one sweep.
#[derive(Debug, Default)]
pub struct SweepSummary {
    pub files_seen: u64,
    pub succeeded: u64,
    pub failed: u64,
    pub skipped: u64,
    /// Categories whose remote listing failed entirely.
    pub failed_sources: Vec<String>,
}

impl SweepSummary {
    /// Whether the sweep as a whole counts as successful. Individual file
    /// failures are recorded on the ledger and do not fail the sweep.
    pub fn is_healthy(&self) -> bool {
        self.failed_sources.is_empty()
    }
}

struct FileReport {
    rows_staged: u64,
    outcome: TransformOutcome,
}

pub struct Pipeline {
    config: PipelineConfig,
    ftp: FtpClient,
    store: LocalStore,
    ledger: Ledger,
    whitelist: WhitelistResolver,
    loader: StagingLoader,
    transform: TransformEngine,
}

impl Pipeline {
    pub fn new(config: PipelineConfig, pool: sqlx::PgPool) -> Result<Self> {
        let store = LocalStore::new(config.local_root.clone());
        let sources: Vec<&str> = config.sources.iter().map(|s| s.name.as_str()).collect();
        store
            .ensure_layout(&sources)
            .context("Cannot create local working areas")?;

        let cache = ColumnCache::new(config.cache_path.clone());
        cache
            .init()
            .context("Cannot initialize column whitelist cache")?;

        Ok(Self {
            ftp: FtpClient::new(config.ftp.clone()),
            ledger: Ledger::new(pool.clone()),
            whitelist: WhitelistResolver::new(pool.clone(), config.whitelist_mode, cache),
            loader: StagingLoader::new(pool.clone(), config.batch_size),
            transform: TransformEngine::new(pool, config.timestamp_unit, config.cleanup),
            store,
            config,
        })
    }

    /// Run one full sweep over every configured source category.
    pub async fn run_sweep(&self) -> Result<SweepSummary> {
        self.ledger.ensure_schema().await?;

        let mut summary = SweepSummary::default();
        for source in &self.config.sources {
            if let Err(e) = self.sweep_source(source, &mut summary).await {
                error!(source = %source.name, error = %e, "Category sweep failed");
                summary.failed_sources.push(source.name.clone());
            }
        }

        info!(
            seen = summary.files_seen,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            "Sweep complete"
        );
        Ok(summary)
    }

    async fn sweep_source(
        &self,
        source: &SourceConfig,
        summary: &mut SweepSummary,
    ) -> Result<()> {
        info!(source = %source.name, path = %source.remote_base, "Sweeping source");

        let entries = self
            .ftp
            .list_files(&source.remote_base)
            .await
            .with_context(|| format!("Cannot list {}", source.remote_base))?;

        for entry in entries {
            if !entry.name.to_lowercase().ends_with(".csv") {
                debug!(name = %entry.name, "Skipping non-CSV entry");
                continue;
            }
            summary.files_seen += 1;

            let remote_path = format!("{}/{}", source.remote_base, entry.name);
            let size = match entry.size {
                Some(s) => Some(s),
                None => self.ftp.size(&remote_path).await.unwrap_or(None),
            };
            let Some(size) = size.filter(|&s| s > 0) else {
                warn!(name = %entry.name, "Skipping file with zero or unknown size");
                summary.skipped += 1;
                continue;
            };
            let size_i = size as i64;

            if self
                .ledger
                .already_succeeded(&source.name, &entry.name, size_i)
                .await?
            {
                debug!(name = %entry.name, size, "Already processed, skipping");
                summary.skipped += 1;
                continue;
            }

            self.ledger
                .record_seen(&source.name, &entry.name, size_i)
                .await?;

            match self
                .process_file(source, &entry.name, &remote_path, size)
                .await
            {
                Ok(report) => {
                    let message = format!(
                        "TMP:{} DETAIL:{} REJECTED:{}",
                        report.rows_staged, report.outcome.inserted, report.outcome.rejected
                    );
                    // Validated and staged counts are the same single-pass
                    // number; the message carries the detail-store counts.
                    self.ledger
                        .mark_success(
                            &source.name,
                            &entry.name,
                            size_i,
                            report.rows_staged as i64,
                            report.rows_staged as i64,
                            &message,
                        )
                        .await?;
                    self.store.move_to_out(&source.name, &entry.name)?;
                    if self.config.delete_after_success {
                        // The local OUT copy and the ledger row are the
                        // durable record; a failed remote delete only means
                        // the file gets skipped on the next sweep.
                        if let Err(e) = self.ftp.delete(&remote_path).await {
                            warn!(name = %entry.name, error = %e, "Remote delete failed");
                        }
                    }
                    info!(source = %source.name, name = %entry.name, %message, "File processed");
                    summary.succeeded += 1;
                },
                Err(file_err) => {
                    warn!(
                        source = %source.name,
                        name = %entry.name,
                        error = %file_err,
                        "File failed"
                    );
                    self.ledger
                        .mark_error(&source.name, &entry.name, size_i, &file_err.ledger_message())
                        .await?;
                    self.store.discard_tmp(&entry.name);
                    self.store.move_to_err(&source.name, &entry.name)?;
                    summary.failed += 1;
                },
            }
        }
        Ok(())
    }

    /// Walk one file through download, validation, load and transform.
    async fn process_file(
        &self,
        source: &SourceConfig,
        name: &str,
        remote_path: &str,
        size: u64,
    ) -> Result<FileReport, FileError> {
        // Download into TMP, verify, then promote atomically.
        let part = self.store.tmp_part(name);
        let bytes = self
            .ftp
            .download_to(remote_path, part.clone())
            .await
            .map_err(|e| FileError::download(format!("{:#}", e)))?;
        if bytes != size {
            self.store.discard_tmp(name);
            return Err(FileError::download(format!(
                "Size mismatch for {} expected={} got={}",
                name, size, bytes
            )));
        }
        let inbound = self.store.inbound(&source.name, name);
        self.store
            .promote(&part, &inbound)
            .map_err(|e| FileError::download(format!("{:#}", e)))?;

        let mut reader = StrictReader::open(&inbound, self.config.dialect)?;

        // Check the header as written against the whitelist, then resolve
        // the accepted names into staging identifiers.
        let check = self
            .whitelist
            .validate(reader.header(), source, Stage::Staging)
            .await;
        if !check.valid {
            return Err(FileError::whitelist(format!(
                "Unknown columns: {}",
                check.unknown_columns.join(", ")
            )));
        }

        let columns = sanitize_header(reader.header());
        if columns.iter().any(|c| c.is_empty()) {
            return Err(FileError::ddl("Header yielded an empty identifier"));
        }

        self.note_status(source, name, size, AuditStatus::Validated)
            .await;

        let rows_staged = self
            .loader
            .load_file(
                &source.staging_table,
                &columns,
                &mut reader,
                name,
                &source.name,
            )
            .await?;
        self.note_status(source, name, size, AuditStatus::Staged)
            .await;

        let outcome = self
            .transform
            .transform_file(source, name, &source.name)
            .await?;
        self.note_status(source, name, size, AuditStatus::Transformed)
            .await;

        Ok(FileReport {
            rows_staged,
            outcome,
        })
    }

    /// Intermediate transitions are best effort; the terminal state is what
    /// the restart logic depends on.
    async fn note_status(&self, source: &SourceConfig, name: &str, size: u64, status: AuditStatus) {
        if let Err(e) = self
            .ledger
            .mark_status(&source.name, name, size as i64, status)
            .await
        {
            warn!(name, status = status.as_str(), error = %e, "Audit update failed");
        }
    }
}
