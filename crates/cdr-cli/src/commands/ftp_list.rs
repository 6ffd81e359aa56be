//! `cdr ftp-list` - show the remote drop area of a source category

use anyhow::{bail, Result};
use cdr_pipeline::ftp::FtpClient;

pub async fn run(dir: String) -> Result<()> {
    let config = super::load_config()?;
    let Some(source) = config.source(&dir) else {
        bail!("Unknown source category: {}", dir);
    };

    let client = FtpClient::new(config.ftp.clone());
    let entries = client.list_files(&source.remote_base).await?;

    println!("{} ({}):", source.name, source.remote_base);
    if entries.is_empty() {
        println!("  (empty)");
        return Ok(());
    }
    for entry in entries {
        let remote_path = format!("{}/{}", source.remote_base, entry.name);
        let mtime = client
            .modified_time(&remote_path)
            .await
            .unwrap_or(None)
            .unwrap_or_else(|| "-".to_string());
        let size = entry
            .size
            .map(|s| s.to_string())
            .unwrap_or_else(|| "-".to_string());
        println!("  {:>12}  {:<20}  {}", size, mtime, entry.name);
    }

    Ok(())
}
