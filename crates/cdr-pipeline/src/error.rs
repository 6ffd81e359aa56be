//! File-scoped failure taxonomy
//!
//! Every failure while processing one file maps to exactly one of these
//! kinds. The kind prefixes the diagnostic message recorded on the ledger;
//! none of them abort the overall sweep.

use thiserror::Error;

/// Classification of a per-file failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileErrorKind {
    /// Transfer or size-verification failure; remote file left for retry.
    Download,
    /// Record-contract violation in the CSV file.
    CsvInvalid,
    /// Header contains columns the staging whitelist does not accept.
    Whitelist,
    /// Identifier resolution for the staging target failed.
    Ddl,
    /// Staging insert failed; transaction rolled back.
    Load,
    /// Transform/dedup into the detail store failed.
    Transform,
}

impl FileErrorKind {
    /// Ledger message prefix for this kind.
    pub fn as_str(self) -> &'static str {
        match self {
            FileErrorKind::Download => "DOWNLOAD_ERROR",
            FileErrorKind::CsvInvalid => "CSV_INVALID",
            FileErrorKind::Whitelist => "WHITELIST_ERROR",
            FileErrorKind::Ddl => "DDL_ERROR",
            FileErrorKind::Load => "LOAD_ERROR",
            FileErrorKind::Transform => "TRANSFORM_ERROR",
        }
    }
}

impl std::fmt::Display for FileErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A terminal, file-scoped error.
#[derive(Error, Debug)]
#[error("{kind}: {message}")]
pub struct FileError {
    pub kind: FileErrorKind,
    pub message: String,
}

impl FileError {
    pub fn new(kind: FileErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn download(message: impl Into<String>) -> Self {
        Self::new(FileErrorKind::Download, message)
    }

    pub fn csv(message: impl Into<String>) -> Self {
        Self::new(FileErrorKind::CsvInvalid, message)
    }

    pub fn whitelist(message: impl Into<String>) -> Self {
        Self::new(FileErrorKind::Whitelist, message)
    }

    pub fn ddl(message: impl Into<String>) -> Self {
        Self::new(FileErrorKind::Ddl, message)
    }

    pub fn load(message: impl Into<String>) -> Self {
        Self::new(FileErrorKind::Load, message)
    }

    pub fn transform(message: impl Into<String>) -> Self {
        Self::new(FileErrorKind::Transform, message)
    }

    /// Full message as written to the ledger.
    pub fn ledger_message(&self) -> String {
        format!("{}: {}", self.kind, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_prefixes() {
        assert_eq!(FileErrorKind::Download.as_str(), "DOWNLOAD_ERROR");
        assert_eq!(FileErrorKind::CsvInvalid.as_str(), "CSV_INVALID");
        assert_eq!(FileErrorKind::Whitelist.as_str(), "WHITELIST_ERROR");
        assert_eq!(FileErrorKind::Ddl.as_str(), "DDL_ERROR");
        assert_eq!(FileErrorKind::Load.as_str(), "LOAD_ERROR");
        assert_eq!(FileErrorKind::Transform.as_str(), "TRANSFORM_ERROR");
    }

    #[test]
    fn test_ledger_message() {
        let err = FileError::csv("Broken line (unbalanced quotes) at data line 4");
        assert_eq!(
            err.ledger_message(),
            "CSV_INVALID: Broken line (unbalanced quotes) at data line 4"
        );
    }
}
