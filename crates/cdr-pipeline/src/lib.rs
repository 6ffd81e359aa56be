//! CDR ingestion and transform pipeline
//!
//! Moves call-detail-record files from a remote FTP drop area into a
//! relational staging table, then transforms and deduplicates them into the
//! canonical detail store. Every file is tracked through a restart-safe
//! lifecycle in the LOAD_AUDIT ledger:
//!
//! `SEEN -> DOWNLOADED -> VALIDATED -> STAGED -> TRANSFORMED -> SUCCESS`
//!
//! with a terminal `ERROR` state reachable from any step. Files are
//! independent units of work; a failure never stops the sweep.

pub mod config;
pub mod error;
pub mod ftp;
pub mod ledger;
pub mod loader;
pub mod mapping;
pub mod orchestrator;
pub mod reader;
pub mod sanitize;
pub mod store;
pub mod transform;
pub mod whitelist;

pub use config::PipelineConfig;
pub use error::{FileError, FileErrorKind};
pub use orchestrator::Pipeline;
