//! Remote file transport over FTP
//!
//! Wraps the blocking `suppaftp` client in `spawn_blocking` with retry
//! logic. All operations use Extended Passive Mode for better NAT/firewall
//! compatibility.

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::time::Duration;
use suppaftp::FtpStream;
use tracing::{debug, info, warn};

/// Maximum number of retry attempts for FTP operations
pub const MAX_RETRIES: u32 = 3;

/// Base delay between retry attempts (seconds); multiplied by the attempt
/// number.
pub const RETRY_DELAY_SECS: u64 = 5;

/// Configuration for the FTP connection
#[derive(Debug, Clone)]
pub struct FtpConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
}

impl Default for FtpConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 21,
            username: "anonymous".to_string(),
            password: "user@example.com".to_string(),
        }
    }
}

impl FtpConfig {
    /// Load connection settings from `FTP_HOST`, `FTP_PORT`, `FTP_USERNAME`,
    /// `FTP_PASSWORD`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            host: std::env::var("FTP_HOST").unwrap_or(defaults.host),
            port: std::env::var("FTP_PORT")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.port),
            username: std::env::var("FTP_USERNAME").unwrap_or(defaults.username),
            password: std::env::var("FTP_PASSWORD").unwrap_or(defaults.password),
        }
    }
}

/// Parsed remote directory entry
#[derive(Debug, Clone)]
pub struct RemoteEntry {
    pub name: String,
    pub is_directory: bool,
    pub size: Option<u64>,
}

impl RemoteEntry {
    /// Parse a Unix-style FTP LIST line:
    /// `-rw-r--r--   1 ftp ftp  1234 Jan 15 12:00 filename.csv`
    ///
    /// The name is everything after the three mtime fields, so names
    /// containing spaces survive.
    pub fn parse(line: &str) -> Option<Self> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() < 4 {
            return None;
        }

        let is_directory = parts[0].starts_with('d');
        let name = if parts.len() >= 9 {
            parts[8..].join(" ")
        } else {
            parts.last()?.to_string()
        };
        let size = if parts.len() >= 5 {
            parts[4].parse().ok()
        } else {
            None
        };

        Some(Self {
            name,
            is_directory,
            size,
        })
    }
}

/// FTP client with retry logic
pub struct FtpClient {
    config: FtpConfig,
}

impl FtpClient {
    pub fn new(config: FtpConfig) -> Self {
        Self { config }
    }

    /// List the files (not directories) under a remote path.
    pub async fn list_files(&self, path: &str) -> Result<Vec<RemoteEntry>> {
        let path = path.to_string();
        let entries = self
            .with_retry("LIST", move |config| Self::list_sync(config, &path))
            .await?;
        Ok(entries.into_iter().filter(|e| !e.is_directory).collect())
    }

    /// Remote size in bytes, if the server can report it.
    pub async fn size(&self, path: &str) -> Result<Option<u64>> {
        let path = path.to_string();
        self.with_retry("SIZE", move |config| {
            let mut ftp = Self::connect(config)?;
            let size = ftp.size(&path).ok().map(|s| s as u64);
            Self::quit(ftp);
            Ok(size)
        })
        .await
    }

    /// Remote modification time as reported by MDTM, if available.
    pub async fn modified_time(&self, path: &str) -> Result<Option<String>> {
        let path = path.to_string();
        self.with_retry("MDTM", move |config| {
            let mut ftp = Self::connect(config)?;
            let mtime = ftp.mdtm(&path).ok().map(|dt| dt.to_string());
            Self::quit(ftp);
            Ok(mtime)
        })
        .await
    }

    /// Stream a remote file into a local path, returning the byte count
    /// written. The transfer is not retried once bytes start flowing; the
    /// caller verifies the size and re-runs the whole file on mismatch.
    pub async fn download_to(&self, remote_path: &str, local_path: PathBuf) -> Result<u64> {
        let remote = remote_path.to_string();
        let config = self.config.clone();

        let bytes = tokio::task::spawn_blocking(move || -> Result<u64> {
            let mut ftp = Self::connect(&config)?;
            let mut out = std::fs::File::create(&local_path)
                .with_context(|| format!("Cannot create {}", local_path.display()))?;

            debug!("Downloading file: {}", remote);
            let written = ftp
                .retr(&remote, |reader| {
                    std::io::copy(reader, &mut out).map_err(suppaftp::FtpError::ConnectionError)
                })
                .with_context(|| format!("Failed to download {}", remote))?;

            Self::quit(ftp);
            Ok(written)
        })
        .await
        .map_err(|e| anyhow::anyhow!("FTP download task panicked: {}", e))??;

        info!("Downloaded {} ({} bytes)", remote_path, bytes);
        Ok(bytes)
    }

    /// Delete a remote file.
    pub async fn delete(&self, path: &str) -> Result<()> {
        let path = path.to_string();
        self.with_retry("DELE", move |config| {
            let mut ftp = Self::connect(config)?;
            ftp.rm(&path)
                .with_context(|| format!("Failed to delete {}", path))?;
            Self::quit(ftp);
            Ok(())
        })
        .await
    }

    /// Run a blocking FTP operation on the blocking pool, retrying with
    /// linear backoff.
    async fn with_retry<T, F>(&self, op: &str, f: F) -> Result<T>
    where
        T: Send + 'static,
        F: Fn(&FtpConfig) -> Result<T> + Clone + Send + 'static,
    {
        for attempt in 1..=MAX_RETRIES {
            debug!("{} attempt {}/{}", op, attempt, MAX_RETRIES);

            let config = self.config.clone();
            let f = f.clone();
            match tokio::task::spawn_blocking(move || f(&config)).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    if attempt < MAX_RETRIES {
                        let delay = RETRY_DELAY_SECS * attempt as u64;
                        warn!(
                            "{} attempt {}/{} failed: {}. Retrying in {}s...",
                            op, attempt, MAX_RETRIES, e, delay
                        );
                        tokio::time::sleep(Duration::from_secs(delay)).await;
                    } else {
                        return Err(e).with_context(|| {
                            format!("{} failed after {} attempts", op, MAX_RETRIES)
                        });
                    }
                },
                Err(e) => {
                    return Err(anyhow::anyhow!("FTP {} task panicked: {}", op, e));
                },
            }
        }

        unreachable!("Retry loop should always return")
    }

    fn connect(config: &FtpConfig) -> Result<FtpStream> {
        debug!("Connecting to FTP server: {}:{}", config.host, config.port);

        let mut ftp = FtpStream::connect(format!("{}:{}", config.host, config.port))
            .context("Failed to connect to FTP server")?;

        ftp.set_mode(suppaftp::Mode::ExtendedPassive);

        ftp.login(&config.username, &config.password)
            .context("FTP login failed")?;

        ftp.transfer_type(suppaftp::types::FileType::Binary)
            .context("Failed to set binary mode")?;

        Ok(ftp)
    }

    fn quit(mut ftp: FtpStream) {
        if let Err(e) = ftp.quit() {
            warn!("Failed to quit FTP session gracefully: {}", e);
        }
    }

    fn list_sync(config: &FtpConfig, path: &str) -> Result<Vec<RemoteEntry>> {
        let mut ftp = Self::connect(config)?;

        debug!("Listing directory: {}", path);
        let lines = ftp
            .list(Some(path))
            .with_context(|| format!("Failed to list directory: {}", path))?;

        Self::quit(ftp);

        Ok(lines.iter().filter_map(|l| RemoteEntry::parse(l)).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_file_entry() {
        let entry =
            RemoteEntry::parse("-rw-r--r--   1 ftp ftp  123456 Jan 15 12:00 cdr_001.csv").unwrap();
        assert_eq!(entry.name, "cdr_001.csv");
        assert!(!entry.is_directory);
        assert_eq!(entry.size, Some(123456));
    }

    #[test]
    fn test_parse_directory_entry() {
        let entry = RemoteEntry::parse("drwxr-xr-x   2 ftp ftp  4096 Jan 15 12:00 OCC").unwrap();
        assert_eq!(entry.name, "OCC");
        assert!(entry.is_directory);
    }

    #[test]
    fn test_parse_name_with_spaces() {
        let entry =
            RemoteEntry::parse("-rw-r--r--   1 ftp ftp  987 Jan 15 12:00 occ export 01.csv")
                .unwrap();
        assert_eq!(entry.name, "occ export 01.csv");
        assert_eq!(entry.size, Some(987));
    }

    #[test]
    fn test_parse_garbage_line() {
        assert!(RemoteEntry::parse("").is_none());
        assert!(RemoteEntry::parse("   ").is_none());
    }

    #[test]
    fn test_config_from_defaults() {
        let config = FtpConfig::default();
        assert_eq!(config.port, 21);
        assert_eq!(config.username, "anonymous");
    }
}
