//! Pipeline configuration
//!
//! All knobs come from environment variables, validated at load time. Each
//! source category carries its remote base path, staging/detail table names
//! and its declarative column mapping.

use cdr_common::{CdrError, Result};
use std::path::PathBuf;

use crate::ftp::FtpConfig;
use crate::mapping::{mmg_mapping, occ_mapping, ColumnMapping};
use crate::reader::CsvDialect;

/// Unit of the epoch counts in the start-time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampUnit {
    #[default]
    Seconds,
    Milliseconds,
}

impl std::str::FromStr for TimestampUnit {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "seconds" => Ok(TimestampUnit::Seconds),
            "milliseconds" => Ok(TimestampUnit::Milliseconds),
            _ => Err(CdrError::Config(format!("Invalid timestamp unit: {}", s))),
        }
    }
}

/// When staged rows for a file are purged after the transform stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CleanupStrategy {
    /// Purge only after a successful transform (default); a failed transform
    /// leaves rows for inspection.
    #[default]
    OnSuccess,
    /// Purge also on failure, so a broken file never blocks the staging area.
    OnError,
    /// Manual cleanup only.
    Never,
}

impl std::str::FromStr for CleanupStrategy {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "on_success" => Ok(CleanupStrategy::OnSuccess),
            "on_error" => Ok(CleanupStrategy::OnError),
            "never" => Ok(CleanupStrategy::Never),
            _ => Err(CdrError::Config(format!("Invalid cleanup strategy: {}", s))),
        }
    }
}

/// How the staging whitelist is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WhitelistMode {
    /// Introspect the staging table's columns (cached); falls back to
    /// permissive when introspection fails.
    #[default]
    Dynamic,
    /// Accept every column.
    Permissive,
    /// Use the static column mapping.
    Strict,
}

impl std::str::FromStr for WhitelistMode {
    type Err = CdrError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "dynamic" => Ok(WhitelistMode::Dynamic),
            "permissive" => Ok(WhitelistMode::Permissive),
            "strict" => Ok(WhitelistMode::Strict),
            _ => Err(CdrError::Config(format!("Invalid whitelist mode: {}", s))),
        }
    }
}

/// One source category (remote drop area + staging/detail tables + mapping).
#[derive(Debug, Clone)]
pub struct SourceConfig {
    /// Category name as recorded on the ledger, e.g. "OCC".
    pub name: String,
    /// Remote base path listed for candidate files.
    pub remote_base: String,
    pub staging_table: String,
    pub detail_table: String,
    pub mapping: ColumnMapping,
}

/// Full pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub timestamp_unit: TimestampUnit,
    pub batch_size: usize,
    pub cleanup: CleanupStrategy,
    pub whitelist_mode: WhitelistMode,
    /// Delete the remote original after success (failure is non-fatal).
    pub delete_after_success: bool,
    pub dialect: CsvDialect,
    /// Root of the local IN/OUT/ERR/TMP areas.
    pub local_root: PathBuf,
    /// SQLite file backing the staging whitelist cache, shared between the
    /// sweep and the cache maintenance command.
    pub cache_path: PathBuf,
    pub ftp: FtpConfig,
    pub sources: Vec<SourceConfig>,
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_char(key: &str, default: char) -> char {
    std::env::var(key)
        .ok()
        .and_then(|s| s.chars().next())
        .unwrap_or(default)
}

impl PipelineConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let timestamp_unit = env_or("CDR_TIMESTAMP_UNIT", "seconds").parse()?;
        let cleanup = env_or("CDR_TMP_CLEANUP", "on_success").parse()?;
        let whitelist_mode = env_or("CDR_TMP_WHITELIST_MODE", "dynamic").parse()?;

        let batch_size = std::env::var("CDR_BATCH_SIZE")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(2000);

        let delete_after_success = std::env::var("FTP_DELETE_AFTER_SUCCESS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(true);

        let dialect = CsvDialect {
            delimiter: env_char("CSV_DELIMITER", ','),
            enclosure: env_char("CSV_ENCLOSURE", '"'),
        };

        let sources = vec![
            SourceConfig {
                name: "MMG".to_string(),
                remote_base: env_or("FTP_DIR_MMG", "/home/MMG"),
                staging_table: "ra_t_tmp_mmg".to_string(),
                detail_table: "ra_t_mmg_cdr_detail".to_string(),
                mapping: mmg_mapping(),
            },
            SourceConfig {
                name: "OCC".to_string(),
                remote_base: env_or("FTP_DIR_OCC", "/home/OCC"),
                staging_table: "ra_t_tmp_occ".to_string(),
                detail_table: "ra_t_occ_cdr_detail".to_string(),
                mapping: occ_mapping(),
            },
        ];

        let local_root = PathBuf::from(env_or("CDR_LOCAL_ROOT", "./cdr"));
        let cache_path = std::env::var("CDR_CACHE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| local_root.join("cache.db"));

        let config = Self {
            timestamp_unit,
            batch_size,
            cleanup,
            whitelist_mode,
            delete_after_success,
            dialect,
            local_root,
            cache_path,
            ftp: FtpConfig::from_env(),
            sources,
        };

        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, including every source mapping.
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(CdrError::Config(
                "CDR_BATCH_SIZE must be greater than 0".to_string(),
            ));
        }
        if self.dialect.delimiter == self.dialect.enclosure {
            return Err(CdrError::Config(
                "CSV delimiter and enclosure must differ".to_string(),
            ));
        }
        for source in &self.sources {
            if source.staging_table.is_empty() || source.name.is_empty() {
                return Err(CdrError::Config(format!(
                    "Incomplete source config: {}",
                    source.name
                )));
            }
            source.mapping.validate()?;
        }
        Ok(())
    }

    pub fn source(&self, name: &str) -> Option<&SourceConfig> {
        self.sources
            .iter()
            .find(|s| s.name.eq_ignore_ascii_case(name))
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timestamp_unit: TimestampUnit::Seconds,
            batch_size: 2000,
            cleanup: CleanupStrategy::OnSuccess,
            whitelist_mode: WhitelistMode::Dynamic,
            delete_after_success: true,
            dialect: CsvDialect::default(),
            local_root: PathBuf::from("./cdr"),
            cache_path: PathBuf::from("./cdr/cache.db"),
            ftp: FtpConfig::default(),
            sources: vec![
                SourceConfig {
                    name: "MMG".to_string(),
                    remote_base: "/home/MMG".to_string(),
                    staging_table: "ra_t_tmp_mmg".to_string(),
                    detail_table: "ra_t_mmg_cdr_detail".to_string(),
                    mapping: mmg_mapping(),
                },
                SourceConfig {
                    name: "OCC".to_string(),
                    remote_base: "/home/OCC".to_string(),
                    staging_table: "ra_t_tmp_occ".to_string(),
                    detail_table: "ra_t_occ_cdr_detail".to_string(),
                    mapping: occ_mapping(),
                },
            ],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validates() {
        PipelineConfig::default().validate().unwrap();
    }

    #[test]
    fn test_timestamp_unit_parse() {
        assert_eq!(
            "seconds".parse::<TimestampUnit>().unwrap(),
            TimestampUnit::Seconds
        );
        assert_eq!(
            "MILLISECONDS".parse::<TimestampUnit>().unwrap(),
            TimestampUnit::Milliseconds
        );
        assert!("hours".parse::<TimestampUnit>().is_err());
    }

    #[test]
    fn test_cleanup_strategy_parse() {
        assert_eq!(
            "on_success".parse::<CleanupStrategy>().unwrap(),
            CleanupStrategy::OnSuccess
        );
        assert_eq!(
            "never".parse::<CleanupStrategy>().unwrap(),
            CleanupStrategy::Never
        );
        assert!("sometimes".parse::<CleanupStrategy>().is_err());
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = PipelineConfig::default();
        config.batch_size = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_delimiter_enclosure_clash_rejected() {
        let mut config = PipelineConfig::default();
        config.dialect.enclosure = ',';
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_source_lookup_case_insensitive() {
        let config = PipelineConfig::default();
        assert!(config.source("occ").is_some());
        assert!(config.source("OCC").is_some());
        assert!(config.source("xyz").is_none());
    }
}
