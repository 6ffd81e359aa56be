//! CDR CLI - Main entry point

use cdr_cli::{Cli, Commands};
use cdr_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use clap::Parser;
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let log_config = if cli.verbose {
        LogConfig::builder()
            .level(LogLevel::Debug)
            .output(LogOutput::Console)
            .log_file_prefix("cdr".to_string())
            .build()
    } else {
        LogConfig::builder()
            .level(LogLevel::Info)
            .output(LogOutput::Both)
            .log_file_prefix("cdr".to_string())
            .build()
    };

    // Environment variables take precedence over the flag defaults.
    let log_config = log_config.overlay_env().unwrap_or_default();
    let _ = init_logging(&log_config);

    let result = match &cli.command {
        Commands::Run => cdr_cli::commands::run::run().await,
        Commands::CacheColumns { only, clear, show } => {
            cdr_cli::commands::cache::run(only.clone(), *clear, *show).await
        },
        Commands::FtpList { dir } => cdr_cli::commands::ftp_list::run(dir.clone()).await,
    };

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
