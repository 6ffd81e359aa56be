//! CLI command implementations

pub mod cache;
pub mod ftp_list;
pub mod run;

use anyhow::{Context, Result};
use cdr_pipeline::PipelineConfig;
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Load the pipeline configuration from the environment.
pub fn load_config() -> Result<PipelineConfig> {
    PipelineConfig::from_env().context("Invalid pipeline configuration")
}

/// Connect to the database named by `DATABASE_URL`.
pub async fn connect_pool() -> Result<PgPool> {
    let url = std::env::var("DATABASE_URL").context("DATABASE_URL is not set")?;
    PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .context("Cannot connect to database")
}
