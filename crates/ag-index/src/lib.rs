//! In-memory asset index fed by normalized file events.
//!
//! # Overview
//!
//! [`AssetIndex`] owns the canonical `AssetId → Asset` map. It is populated
//! once by [`AssetIndex::initial_scan`] and then kept current by
//! [`AssetIndex::on_file_event`], which the watcher calls for every
//! normalized event before the event is published.
//!
//! ```text
//! TreeWalker (initial scan, directory-level events)
//!     │
//!     ▼
//! AssetIndex ── Mutex<FxHashMap<AssetId, Asset>>
//!     ▲
//!     │ on_file_event
//! RecursiveWatcher
//! ```
//!
//! # Consistency
//!
//! Every read and every mutation takes one exclusive lock, and the stat
//! that materializes an asset runs while that lock is held. A scan upsert
//! racing with a removal therefore either lands before the removal or finds
//! the file gone; it never resurrects a deleted file.
//!
//! # Example
//!
//! ```no_run
//! use ag_core::{AssetId, FileEvent};
//! use ag_index::AssetIndex;
//! use camino::Utf8Path;
//!
//! let index = AssetIndex::new();
//! index.initial_scan(Utf8Path::new("/srv/assets"))?;
//!
//! index.on_file_event(&FileEvent::added("/srv/assets/new.png", false));
//! let asset = index.get_asset(AssetId::of_path(Utf8Path::new("/srv/assets/new.png")));
//! # Ok::<(), ag_index::IndexError>(())
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

mod error;
mod walker;

pub use error::IndexError;
pub use walker::{TreeWalker, WalkOutput};

use std::time::Instant;

use ag_core::{Asset, AssetId, FileEvent, FileEventKind, FxHashMap};
use camino::Utf8Path;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

/// Outcome of a full-tree scan.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSummary {
    /// Regular files found by the walk that were upserted.
    pub indexed: usize,
    /// Entries the walk could not read.
    pub skipped: usize,
    /// Assets held by the index after the scan.
    pub total: usize,
    /// Wall time spent, in milliseconds.
    pub elapsed_ms: u64,
}

/// The canonical map of indexed assets.
///
/// `AssetIndex` is `Send + Sync`; share it behind an `Arc` between the
/// watcher thread and query threads.
#[derive(Debug, Default)]
pub struct AssetIndex {
    assets: Mutex<FxHashMap<AssetId, Asset>>,
    follow_links: bool,
}

impl AssetIndex {
    /// Creates an empty index.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty index whose tree walks follow symbolic links.
    #[must_use]
    pub fn with_follow_links(follow_links: bool) -> Self {
        Self {
            assets: Mutex::default(),
            follow_links,
        }
    }

    /// Applies one normalized event.
    ///
    /// File-level events:
    ///
    /// - `Added`/`Modified` re-stat `event.path` and upsert it
    /// - `Removed` erases the asset keyed by `event.path`
    /// - `Renamed` erases the asset keyed by `event.old_path`, then upserts
    ///   `event.path`
    ///
    /// Directory-level events re-index or erase every asset beneath the
    /// affected directory. A stat failure means the file vanished before the
    /// event was consumed; the event is dropped without touching the index.
    pub fn on_file_event(&self, event: &FileEvent) {
        if event.is_directory {
            self.apply_directory_event(event);
            return;
        }

        match event.kind {
            FileEventKind::Added | FileEventKind::Modified => {
                self.upsert(&event.path);
            }
            FileEventKind::Removed => {
                self.assets.lock().remove(&AssetId::of_path(&event.path));
                debug!(path = %event.path, "Removed asset");
            }
            FileEventKind::Renamed => {
                let mut assets = self.assets.lock();
                if let Some(old_path) = event.old_path() {
                    assets.remove(&AssetId::of_path(old_path));
                }
                upsert_locked(&mut assets, &event.path);
            }
        }
    }

    /// Walks `root` once and upserts every regular file found.
    ///
    /// Intended to run once at startup, after the watcher has installed its
    /// watches. Files that change during the scan may be upserted twice;
    /// upserts are idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`IndexError::RootNotFound`] or [`IndexError::NotADirectory`]
    /// if `root` cannot be walked at all. Per-entry failures are logged and
    /// counted in [`ScanSummary::skipped`].
    pub fn initial_scan(&self, root: &Utf8Path) -> Result<ScanSummary, IndexError> {
        let started = Instant::now();
        info!(root = %root, "Starting initial asset scan");

        let walk = TreeWalker::new(root)?
            .with_follow_links(self.follow_links)
            .files();
        let indexed = walk.paths.iter().filter(|path| self.upsert(path)).count();

        let summary = ScanSummary {
            indexed,
            skipped: walk.skipped(),
            total: self.len(),
            elapsed_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        };
        info!(
            indexed = summary.indexed,
            skipped = summary.skipped,
            total = summary.total,
            elapsed_ms = summary.elapsed_ms,
            "Initial scan complete"
        );

        Ok(summary)
    }

    /// Returns a point-in-time copy of every asset, in no particular order.
    #[must_use]
    pub fn list_assets(&self) -> Vec<Asset> {
        self.assets.lock().values().cloned().collect()
    }

    /// Returns the asset with the given id, if indexed.
    #[must_use]
    pub fn get_asset(&self, id: AssetId) -> Option<Asset> {
        self.assets.lock().get(&id).cloned()
    }

    /// Returns `true` if an asset with the given id is indexed.
    #[must_use]
    pub fn contains(&self, id: AssetId) -> bool {
        self.assets.lock().contains_key(&id)
    }

    /// Returns the number of indexed assets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.assets.lock().len()
    }

    /// Returns `true` if no assets are indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.assets.lock().is_empty()
    }

    fn upsert(&self, path: &Utf8Path) -> bool {
        upsert_locked(&mut self.assets.lock(), path)
    }

    fn apply_directory_event(&self, event: &FileEvent) {
        match event.kind {
            FileEventKind::Added => {
                self.index_tree(&event.path);
            }
            FileEventKind::Removed => {
                let removed = remove_under_locked(&mut self.assets.lock(), &event.path);
                debug!(dir = %event.path, removed, "Removed directory assets");
            }
            FileEventKind::Renamed => {
                if let Some(old_path) = event.old_path() {
                    let removed = remove_under_locked(&mut self.assets.lock(), old_path);
                    debug!(from = %old_path, to = %event.path, removed, "Re-keying moved directory");
                }
                self.index_tree(&event.path);
            }
            FileEventKind::Modified => {}
        }
    }

    fn index_tree(&self, dir: &Utf8Path) {
        // The directory may already be gone again; nothing to index then.
        let Ok(walker) = TreeWalker::new(dir) else {
            trace!(dir = %dir, "Directory vanished before indexing");
            return;
        };
        let walk = walker.with_follow_links(self.follow_links).files();
        let indexed = walk.paths.iter().filter(|path| self.upsert(path)).count();
        debug!(dir = %dir, indexed, "Indexed directory contents");
    }
}

fn upsert_locked(assets: &mut FxHashMap<AssetId, Asset>, path: &Utf8Path) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        trace!(path = %path, "File vanished before indexing");
        return false;
    };
    let Some(asset) = Asset::from_metadata(path, &metadata) else {
        return false;
    };

    debug!(path = %path, size = asset.size, "Indexed asset");
    assets.insert(asset.id, asset);
    true
}

fn remove_under_locked(assets: &mut FxHashMap<AssetId, Asset>, dir: &Utf8Path) -> usize {
    let before = assets.len();
    assets.retain(|_, asset| !asset.is_under(dir));
    before - assets.len()
}
