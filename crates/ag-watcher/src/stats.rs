//! Watcher counters shared between the monitoring thread and its owner.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::{Deserialize, Serialize};

/// Live counters, updated by the monitoring thread.
#[derive(Debug, Default)]
pub(crate) struct WatchCounters {
    raw_records: AtomicU64,
    emitted: AtomicU64,
    unresolved: AtomicU64,
    watch_failures: AtomicU64,
    overflows: AtomicU64,
    degraded_renames: AtomicU64,
    watches: AtomicUsize,
}

impl WatchCounters {
    pub(crate) fn record_raw(&self) {
        self.raw_records.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_emitted(&self) {
        self.emitted.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_unresolved(&self) {
        self.unresolved.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_watch_failure(&self) {
        self.watch_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_overflow(&self) {
        self.overflows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_degraded_rename(&self) {
        self.degraded_renames.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_watches(&self, count: usize) {
        self.watches.store(count, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> WatcherStats {
        WatcherStats {
            raw_records: self.raw_records.load(Ordering::Relaxed),
            emitted: self.emitted.load(Ordering::Relaxed),
            unresolved: self.unresolved.load(Ordering::Relaxed),
            watch_failures: self.watch_failures.load(Ordering::Relaxed),
            overflows: self.overflows.load(Ordering::Relaxed),
            degraded_renames: self.degraded_renames.load(Ordering::Relaxed),
            watches: self.watches.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time watcher statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherStats {
    /// Raw records decoded from the backend.
    pub raw_records: u64,
    /// Normalized events handed to the sink.
    pub emitted: u64,
    /// Records dropped because their handle was not in the watch table.
    pub unresolved: u64,
    /// Directories that could not be watched.
    pub watch_failures: u64,
    /// Kernel queue overflows reported.
    pub overflows: u64,
    /// Move-outs that never paired and degraded to removals.
    pub degraded_renames: u64,
    /// Watches currently installed.
    pub watches: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let counters = WatchCounters::default();
        counters.record_raw();
        counters.record_raw();
        counters.record_emitted();
        counters.record_degraded_rename();
        counters.set_watches(3);

        let stats = counters.snapshot();
        assert_eq!(stats.raw_records, 2);
        assert_eq!(stats.emitted, 1);
        assert_eq!(stats.degraded_renames, 1);
        assert_eq!(stats.watches, 3);
        assert_eq!(stats.unresolved, 0);
    }

    #[test]
    fn test_stats_json_shape() {
        let counters = WatchCounters::default();
        counters.record_overflow();
        counters.record_watch_failure();
        counters.record_unresolved();
        insta::assert_json_snapshot!(counters.snapshot(), @r###"
        {
          "raw_records": 0,
          "emitted": 0,
          "unresolved": 1,
          "watch_failures": 1,
          "overflows": 1,
          "degraded_renames": 0,
          "watches": 0
        }
        "###);
    }
}
