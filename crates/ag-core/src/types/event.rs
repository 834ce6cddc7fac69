//! Normalized change notifications.
//!
//! # Event Flow
//!
//! ```text
//! OS raw record(s)
//!        │
//!        ▼
//! RecursiveWatcher (watch table + rename pairing)
//!        │
//!        ▼
//!   FileEvent created
//!        │
//!        ├──► AssetIndex::on_file_event
//!        │
//!        ▼
//!   EventBus::publish
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

/// The kind of logical change a [`FileEvent`] describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileEventKind {
    /// A file or directory appeared.
    Added,
    /// A file's contents changed.
    Modified,
    /// A file or directory disappeared.
    Removed,
    /// A file or directory moved within the watched tree.
    Renamed,
}

impl FileEventKind {
    /// Returns a short lowercase label.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Added => "added",
            Self::Modified => "modified",
            Self::Removed => "removed",
            Self::Renamed => "renamed",
        }
    }
}

/// One normalized change notification.
///
/// `old_path` is populated only for [`FileEventKind::Renamed`].
///
/// # Examples
///
/// ```
/// use ag_core::{FileEvent, FileEventKind};
///
/// let event = FileEvent::renamed("/root/a.txt", "/root/b.txt", false);
/// assert_eq!(event.kind, FileEventKind::Renamed);
/// assert_eq!(event.old_path.as_deref().map(|p| p.as_str()), Some("/root/a.txt"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEvent {
    /// What happened.
    #[serde(rename = "type")]
    pub kind: FileEventKind,

    /// Current path; the destination for renames.
    pub path: Utf8PathBuf,

    /// Pre-rename path.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_path: Option<Utf8PathBuf>,

    /// Whether the entry is a directory.
    pub is_directory: bool,
}

impl FileEvent {
    fn new(kind: FileEventKind, path: Utf8PathBuf, is_directory: bool) -> Self {
        Self {
            kind,
            path,
            old_path: None,
            is_directory,
        }
    }

    /// Creates an [`FileEventKind::Added`] event.
    #[must_use]
    pub fn added(path: impl Into<Utf8PathBuf>, is_directory: bool) -> Self {
        Self::new(FileEventKind::Added, path.into(), is_directory)
    }

    /// Creates a [`FileEventKind::Modified`] event.
    #[must_use]
    pub fn modified(path: impl Into<Utf8PathBuf>, is_directory: bool) -> Self {
        Self::new(FileEventKind::Modified, path.into(), is_directory)
    }

    /// Creates a [`FileEventKind::Removed`] event.
    #[must_use]
    pub fn removed(path: impl Into<Utf8PathBuf>, is_directory: bool) -> Self {
        Self::new(FileEventKind::Removed, path.into(), is_directory)
    }

    /// Creates a [`FileEventKind::Renamed`] event from `old_path` to `path`.
    #[must_use]
    pub fn renamed(
        old_path: impl Into<Utf8PathBuf>,
        path: impl Into<Utf8PathBuf>,
        is_directory: bool,
    ) -> Self {
        Self {
            kind: FileEventKind::Renamed,
            path: path.into(),
            old_path: Some(old_path.into()),
            is_directory,
        }
    }

    /// Returns the pre-rename path, if any.
    #[inline]
    #[must_use]
    pub fn old_path(&self) -> Option<&Utf8Path> {
        self.old_path.as_deref()
    }
}
