//! Shared foundation for the CDR pipeline crates.
//!
//! Provides the common error type and centralized logging initialization
//! used by both the pipeline library and the CLI.

pub mod error;
pub mod logging;

pub use error::{CdrError, Result};
