//! Error types for the ag-index crate.

use camino::Utf8PathBuf;

/// Errors that can occur while walking or scanning a tree.
///
/// # Error Recovery Strategy
///
/// - **Root not found / not a directory**: Fatal for the scan that asked
/// - **Walker errors** ([`IndexError::Walk`]): Log warning, skip entry, continue
/// - **Non-UTF-8 paths** ([`IndexError::NonUtf8Path`]): Log warning, skip entry, continue
///
/// Per-entry errors never escape a scan; they are counted in
/// [`ScanSummary::skipped`](crate::ScanSummary::skipped).
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    /// The scan root does not exist.
    #[error("scan root does not exist: {0}")]
    RootNotFound(Utf8PathBuf),

    /// The scan root is not a directory.
    #[error("scan root is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// Failed to read a directory entry.
    #[error("failed to walk directory: {0}")]
    Walk(#[from] ignore::Error),

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),
}

impl IndexError {
    /// Returns `true` if the error concerns a single entry and the walk can
    /// continue past it.
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        matches!(self, Self::Walk(_) | Self::NonUtf8Path(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_not_found_is_fatal() {
        let err = IndexError::RootNotFound(Utf8PathBuf::from("/nope"));
        assert!(!err.is_recoverable());
        assert_eq!(err.to_string(), "scan root does not exist: /nope");
    }

    #[test]
    fn test_non_utf8_is_recoverable() {
        let err = IndexError::NonUtf8Path(std::path::PathBuf::from("x"));
        assert!(err.is_recoverable());
        assert!(err.to_string().contains("not valid UTF-8"));
    }
}
