//! Local durable file store
//!
//! Manages the working areas under one root directory:
//!
//! - `TMP/` — in-flight downloads (`<name>.part`)
//! - `IN/<SOURCE>/` — verified inbound files awaiting load
//! - `OUT/<SOURCE>/` — successfully processed files
//! - `ERR/<SOURCE>/` — files that failed any stage
//!
//! Promotion between areas is a rename, so a file is never visible in an
//! area in a half-written state.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct LocalStore {
    root: PathBuf,
}

impl LocalStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create the working areas for the given source categories.
    pub fn ensure_layout(&self, sources: &[&str]) -> Result<()> {
        fs::create_dir_all(self.root.join("TMP"))
            .with_context(|| format!("Cannot create {}", self.root.join("TMP").display()))?;
        for area in ["IN", "OUT", "ERR"] {
            for source in sources {
                let dir = self.root.join(area).join(source);
                fs::create_dir_all(&dir)
                    .with_context(|| format!("Cannot create {}", dir.display()))?;
            }
        }
        Ok(())
    }

    /// Temporary path for an in-flight download.
    pub fn tmp_part(&self, file_name: &str) -> PathBuf {
        self.root.join("TMP").join(format!("{}.part", file_name))
    }

    pub fn inbound(&self, source: &str, file_name: &str) -> PathBuf {
        self.root.join("IN").join(source).join(file_name)
    }

    pub fn outbound(&self, source: &str, file_name: &str) -> PathBuf {
        self.root.join("OUT").join(source).join(file_name)
    }

    pub fn error_area(&self, source: &str, file_name: &str) -> PathBuf {
        self.root.join("ERR").join(source).join(file_name)
    }

    /// Rename a verified temp file into the inbound area.
    pub fn promote(&self, from: &Path, to: &Path) -> Result<()> {
        fs::rename(from, to)
            .with_context(|| format!("Cannot move {} to {}", from.display(), to.display()))?;
        debug!("Promoted {} -> {}", from.display(), to.display());
        Ok(())
    }

    /// Move an inbound file to OUT after success.
    pub fn move_to_out(&self, source: &str, file_name: &str) -> Result<()> {
        let from = self.inbound(source, file_name);
        let to = self.outbound(source, file_name);
        self.promote(&from, &to)
    }

    /// Move an inbound file to ERR if it exists. A file that never reached
    /// the inbound area (download failure) has nothing to move.
    pub fn move_to_err(&self, source: &str, file_name: &str) -> Result<bool> {
        let from = self.inbound(source, file_name);
        if !from.exists() {
            return Ok(false);
        }
        let to = self.error_area(source, file_name);
        self.promote(&from, &to)?;
        Ok(true)
    }

    /// Remove a leftover temp part, ignoring a missing file.
    pub fn discard_tmp(&self, file_name: &str) {
        let path = self.tmp_part(file_name);
        if let Err(e) = fs::remove_file(&path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!("Could not remove {}: {}", path.display(), e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_layout_and_paths() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.ensure_layout(&["OCC", "MMG"]).unwrap();

        assert!(dir.path().join("TMP").is_dir());
        assert!(dir.path().join("IN/OCC").is_dir());
        assert!(dir.path().join("ERR/MMG").is_dir());
        assert_eq!(
            store.tmp_part("a.csv"),
            dir.path().join("TMP").join("a.csv.part")
        );
    }

    #[test]
    fn test_promote_and_move_to_out() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.ensure_layout(&["OCC"]).unwrap();

        let part = store.tmp_part("a.csv");
        std::fs::write(&part, b"data").unwrap();
        let inbound = store.inbound("OCC", "a.csv");
        store.promote(&part, &inbound).unwrap();
        assert!(inbound.exists());
        assert!(!part.exists());

        store.move_to_out("OCC", "a.csv").unwrap();
        assert!(store.outbound("OCC", "a.csv").exists());
    }

    #[test]
    fn test_move_to_err_missing_file() {
        let dir = tempdir().unwrap();
        let store = LocalStore::new(dir.path());
        store.ensure_layout(&["OCC"]).unwrap();

        assert!(!store.move_to_err("OCC", "missing.csv").unwrap());

        std::fs::write(store.inbound("OCC", "a.csv"), b"x").unwrap();
        assert!(store.move_to_err("OCC", "a.csv").unwrap());
        assert!(store.error_area("OCC", "a.csv").exists());
    }
}
