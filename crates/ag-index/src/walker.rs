//! Directory traversal for initial scans and watch installation.
//!
//! [`TreeWalker`] uses the `ignore` crate with every standard filter turned
//! off: hidden files and gitignored paths are still assets, and hidden
//! directories still need watches.
//!
//! # Examples
//!
//! ```no_run
//! use ag_index::TreeWalker;
//! use camino::Utf8Path;
//!
//! let walker = TreeWalker::new(Utf8Path::new("/srv/assets"))?;
//! let files = walker.files();
//! println!("{} files, {} entries skipped", files.paths.len(), files.skipped());
//! # Ok::<(), ag_index::IndexError>(())
//! ```

use camino::{Utf8Path, Utf8PathBuf};
use ignore::WalkBuilder;
use tracing::warn;

use crate::error::IndexError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
}

/// Paths collected by a walk, plus the per-entry errors that were skipped.
#[derive(Debug, Default)]
pub struct WalkOutput {
    /// Matching paths in walk order.
    pub paths: Vec<Utf8PathBuf>,
    /// Entries skipped because they could not be read or converted.
    pub errors: Vec<IndexError>,
}

impl WalkOutput {
    /// Returns the number of skipped entries.
    #[inline]
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.errors.len()
    }
}

/// Walks a directory tree and collects regular files or directories.
#[derive(Debug, Clone)]
pub struct TreeWalker {
    root: Utf8PathBuf,
    follow_links: bool,
}

impl TreeWalker {
    /// Creates a walker rooted at `root`.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RootNotFound`] if `root` does not exist and
    /// [`IndexError::NotADirectory`] if it is not a directory.
    pub fn new(root: &Utf8Path) -> Result<Self, IndexError> {
        if !root.exists() {
            return Err(IndexError::RootNotFound(root.to_owned()));
        }
        if !root.is_dir() {
            return Err(IndexError::NotADirectory(root.to_owned()));
        }

        Ok(Self {
            root: root.to_owned(),
            follow_links: false,
        })
    }

    /// Configures whether to follow symbolic links. Off by default.
    #[must_use]
    pub const fn with_follow_links(mut self, follow: bool) -> Self {
        self.follow_links = follow;
        self
    }

    /// Returns the root being walked.
    #[inline]
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Collects every regular file beneath the root.
    #[must_use]
    pub fn files(&self) -> WalkOutput {
        self.collect(EntryKind::File)
    }

    /// Collects the root and every directory beneath it, parents first.
    #[must_use]
    pub fn directories(&self) -> WalkOutput {
        self.collect(EntryKind::Directory)
    }

    fn collect(&self, kind: EntryKind) -> WalkOutput {
        let mut output = WalkOutput::default();

        for result in self.build_walker() {
            let entry = match result {
                Ok(entry) => entry,
                Err(error) => {
                    warn!(root = %self.root, error = %error, "Skipping unreadable entry");
                    output.errors.push(IndexError::Walk(error));
                    continue;
                }
            };

            let matches = entry.file_type().is_some_and(|ft| match kind {
                EntryKind::File => ft.is_file(),
                EntryKind::Directory => ft.is_dir(),
            });
            if !matches {
                continue;
            }

            match Utf8Path::from_path(entry.path()) {
                Some(path) => output.paths.push(path.to_owned()),
                None => {
                    warn!(path = %entry.path().display(), "Skipping non-UTF-8 path");
                    output.errors.push(IndexError::NonUtf8Path(entry.path().to_owned()));
                }
            }
        }

        output
    }

    fn build_walker(&self) -> ignore::Walk {
        WalkBuilder::new(&self.root)
            .standard_filters(false)
            .follow_links(self.follow_links)
            .threads(1)
            .build()
    }
}
