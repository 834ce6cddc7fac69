//! Correlation of move-out and move-in records into renames.
//!
//! Pending move-outs are keyed by the OS cookie. A move-in pairs only with
//! the move-out of the same cookie; anything left unpaired past the timeout
//! is handed back to the caller to degrade into a removal.

use std::time::{Duration, Instant};

use ag_core::{FxHashMap, fx_hash_map};
use camino::Utf8PathBuf;
use smallvec::SmallVec;

/// A move-out waiting for its move-in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingMove {
    /// Absolute path the entry moved out of.
    pub path: Utf8PathBuf,
    /// Whether the entry is a directory.
    pub is_directory: bool,
    /// When the move-out was observed.
    pub stashed_at: Instant,
}

/// Cookie-keyed table of pending move-outs.
#[derive(Debug)]
pub struct RenamePairer {
    pending: FxHashMap<u32, PendingMove>,
    timeout: Duration,
}

impl RenamePairer {
    /// Creates a pairer whose entries expire after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            pending: fx_hash_map(),
            timeout,
        }
    }

    /// Stashes a move-out. Returns the entry it displaced, if the cookie was
    /// already pending.
    pub fn stash(
        &mut self,
        cookie: u32,
        path: Utf8PathBuf,
        is_directory: bool,
        now: Instant,
    ) -> Option<PendingMove> {
        self.pending.insert(
            cookie,
            PendingMove {
                path,
                is_directory,
                stashed_at: now,
            },
        )
    }

    /// Claims the move-out for `cookie`.
    pub fn take(&mut self, cookie: u32) -> Option<PendingMove> {
        self.pending.remove(&cookie)
    }

    /// Removes and returns every entry older than the timeout, oldest first.
    pub fn expire(&mut self, now: Instant) -> SmallVec<[PendingMove; 4]> {
        if self.pending.is_empty() {
            return SmallVec::new();
        }

        let timeout = self.timeout;
        let stale: SmallVec<[u32; 4]> = self
            .pending
            .iter()
            .filter(|(_, entry)| now.saturating_duration_since(entry.stashed_at) >= timeout)
            .map(|(cookie, _)| *cookie)
            .collect();

        let mut expired: SmallVec<[PendingMove; 4]> = stale
            .into_iter()
            .filter_map(|cookie| self.pending.remove(&cookie))
            .collect();
        expired.sort_by_key(|entry| entry.stashed_at);
        expired
    }

    /// Removes every pending entry.
    pub fn drain(&mut self) -> Vec<PendingMove> {
        self.pending.drain().map(|(_, entry)| entry).collect()
    }

    /// Returns the number of pending entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    /// Returns `true` if nothing is pending.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
