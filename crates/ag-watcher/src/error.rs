//! Error types for the ag-watcher crate.
//!
//! This module provides the [`WatchError`] type for errors that can occur
//! while starting, running or stopping a watcher.

use ag_core::{BackendKind, ConfigError};
use ag_index::IndexError;
use camino::Utf8PathBuf;

/// Errors that can occur during watching operations.
///
/// # Error Recovery Strategy
///
/// - **Root not found / not a directory**: Fatal - nothing is spawned
/// - **Root watch failure** ([`WatchError::Io`]): Fatal - the root must be monitored
/// - **Backend errors** ([`WatchError::Backend`], [`WatchError::Notify`]): Fatal
/// - **Unsupported backend**: Fatal - pick another backend
/// - **Non-UTF-8 path** ([`WatchError::NonUtf8Path`]): Recoverable - skip and continue
/// - **Thread panicked**: Reported by [`stop`](crate::RecursiveWatcher::stop)
///
/// Failures to watch a single subdirectory are not errors: they are logged,
/// counted in [`WatcherStats::watch_failures`](crate::WatcherStats), and the
/// subtree is left unmonitored.
///
/// # Examples
///
/// ```
/// use ag_watcher::WatchError;
///
/// fn handle_watch_error(err: &WatchError) {
///     if err.is_fatal() {
///         eprintln!("watcher failed: {err}");
///     } else {
///         eprintln!("warning: {err}");
///     }
/// }
/// ```
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The watched root does not exist.
    #[error("watch root does not exist: {0}")]
    RootNotFound(Utf8PathBuf),

    /// The watched root is not a directory.
    #[error("watch root is not a directory: {0}")]
    NotADirectory(Utf8PathBuf),

    /// An I/O operation on a specific path failed.
    #[error("I/O error on {path}: {source}")]
    Io {
        /// The path involved.
        path: Utf8PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The OS notification facility failed.
    #[error("watch backend error: {0}")]
    Backend(#[source] std::io::Error),

    /// The portable `notify` watcher failed to initialize.
    #[error("notify watcher error: {0}")]
    Notify(#[from] notify::Error),

    /// The requested backend is not available on this platform.
    #[error("backend `{0}` is not supported on this platform")]
    UnsupportedBackend(BackendKind),

    /// The monitoring thread could not be spawned.
    #[error("failed to spawn monitoring thread: {0}")]
    Spawn(#[source] std::io::Error),

    /// The monitoring thread panicked.
    #[error("monitoring thread panicked")]
    ThreadPanicked,

    /// A path is not valid UTF-8.
    #[error("path is not valid UTF-8: {}", _0.display())]
    NonUtf8Path(std::path::PathBuf),

    /// The initial scan failed.
    #[error(transparent)]
    Index(#[from] IndexError),

    /// The configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl WatchError {
    /// Creates a new [`WatchError::Io`] error.
    #[inline]
    pub fn io(path: impl Into<Utf8PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Returns `true` if this error is recoverable (watching can continue).
    #[inline]
    #[must_use]
    pub const fn is_recoverable(&self) -> bool {
        match self {
            Self::NonUtf8Path(_) => true,
            Self::Index(err) => err.is_recoverable(),
            _ => false,
        }
    }

    /// Returns `true` if this error is fatal (watching should stop).
    #[inline]
    #[must_use]
    pub const fn is_fatal(&self) -> bool {
        !self.is_recoverable()
    }
}
