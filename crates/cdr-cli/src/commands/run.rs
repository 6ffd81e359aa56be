//! `cdr run` - one full ingestion sweep

use anyhow::{bail, Result};
use cdr_pipeline::Pipeline;
use tracing::info;

pub async fn run() -> Result<()> {
    let config = super::load_config()?;
    let pool = super::connect_pool().await?;

    let pipeline = Pipeline::new(config, pool)?;
    let summary = pipeline.run_sweep().await?;

    println!(
        "Sweep finished: {} seen, {} succeeded, {} failed, {} skipped",
        summary.files_seen, summary.succeeded, summary.failed, summary.skipped
    );

    // Per-file failures are on the ledger; only a whole category going dark
    // fails the run.
    if !summary.is_healthy() {
        bail!(
            "Could not reach source categories: {}",
            summary.failed_sources.join(", ")
        );
    }

    info!("Sweep successful");
    Ok(())
}
