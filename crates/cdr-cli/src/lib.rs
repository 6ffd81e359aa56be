//! CDR CLI Library
//!
//! Command-line interface for the CDR ingestion pipeline:
//!
//! - **Sweep**: fetch, validate, stage and transform new remote files (`cdr run`)
//! - **Whitelist cache**: inspect or refresh staging column sets (`cdr cache-columns`)
//! - **Remote listing**: show the remote drop area (`cdr ftp-list`)

pub mod commands;

use clap::{Parser, Subcommand};

/// CDR - call detail record ingestion pipeline
#[derive(Parser, Debug)]
#[command(name = "cdr")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one sweep over all configured source categories
    Run,

    /// Inspect or refresh the staging column whitelist cache
    CacheColumns {
        /// Only this source category (e.g. OCC)
        #[arg(short, long)]
        only: Option<String>,

        /// Drop cached column sets instead of refreshing them
        #[arg(long)]
        clear: bool,

        /// Print the current column sets without touching the cache
        #[arg(long)]
        show: bool,
    },

    /// List the remote drop area of a source category
    FtpList {
        /// Source category whose drop area to list (e.g. OCC)
        #[arg(short, long, default_value = "OCC")]
        dir: String,
    },
}
