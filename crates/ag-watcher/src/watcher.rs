//! The recursive watcher and its monitoring loop.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── monitoring thread ────────────────────────┐
//! │                                                                    │
//! │  RawEventSource ──► WatchTable lookup ──► RenamePairer ──► sink    │
//! │  (non-blocking)     (handle → dir)        (cookie-keyed)   (emit)  │
//! │        ▲                   │                                       │
//! │        └── add/remove ◄────┘ directory created/removed/moved       │
//! └────────────────────────────────────────────────────────────────────┘
//!            ▲ stop flag                         │ stats
//! RecursiveWatcher (owner side) ─────────────────┘
//! ```
//!
//! The table, pairer and backend are owned by the monitoring thread; the
//! owner only shares the stop flag and the counters with it.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use ag_core::{BackendKind, FileEvent, WatchConfig};
use ag_index::TreeWalker;
use camino::{Utf8Path, Utf8PathBuf};
use smallvec::SmallVec;
use tracing::{debug, error, info, trace, warn};

use crate::backend::{NotifySource, RawEventSource};
use crate::error::WatchError;
use crate::pairer::{PendingMove, RenamePairer};
use crate::raw::{RawEvent, RawEventKind};
use crate::stats::{WatchCounters, WatcherStats};
use crate::table::WatchTable;

const THREAD_NAME: &str = "asset-watcher";

/// Receives every normalized event, on the monitoring thread.
///
/// Implemented for any `FnMut(FileEvent) + Send + 'static` closure.
pub trait EventSink: Send + 'static {
    /// Handles one event. Must not block for long; the loop waits on it.
    fn emit(&mut self, event: FileEvent);
}

impl<F> EventSink for F
where
    F: FnMut(FileEvent) + Send + 'static,
{
    fn emit(&mut self, event: FileEvent) {
        self(event);
    }
}

/// A running recursive watcher.
///
/// Dropping the watcher stops it; call [`stop`](Self::stop) to observe
/// errors from the monitoring thread.
///
/// # Examples
///
/// ```no_run
/// use ag_core::{FileEvent, WatchConfig};
/// use ag_watcher::RecursiveWatcher;
///
/// # fn example() -> Result<(), ag_watcher::WatchError> {
/// let config = WatchConfig::new("/srv/assets");
/// let watcher = RecursiveWatcher::start(&config, |event: FileEvent| {
///     println!("{} {}", event.kind.label(), event.path);
/// })?;
///
/// // ... later
/// watcher.stop()?;
/// # Ok(())
/// # }
/// ```
pub struct RecursiveWatcher {
    root: Utf8PathBuf,
    backend: &'static str,
    stop: Arc<AtomicBool>,
    counters: Arc<WatchCounters>,
    thread: Option<JoinHandle<Result<(), WatchError>>>,
}

impl std::fmt::Debug for RecursiveWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecursiveWatcher")
            .field("root", &self.root)
            .field("backend", &self.backend)
            .field("is_running", &self.is_running())
            .finish_non_exhaustive()
    }
}

impl RecursiveWatcher {
    /// Starts watching `config.root` with the configured backend.
    ///
    /// Watches are installed on the root and every directory beneath it
    /// before this returns, then the monitoring thread is spawned.
    ///
    /// # Errors
    ///
    /// - [`WatchError::RootNotFound`] / [`WatchError::NotADirectory`] if the
    ///   root is unusable; nothing is spawned
    /// - [`WatchError::UnsupportedBackend`] if `inotify` is requested off Linux
    /// - [`WatchError::Io`] if the root itself cannot be watched
    pub fn start<K: EventSink>(config: &WatchConfig, sink: K) -> Result<Self, WatchError> {
        let root = resolve_root(&config.root)?;
        match config.backend {
            BackendKind::Notify => Self::spawn(NotifySource::new()?, root, config, sink),
            BackendKind::Inotify | BackendKind::Auto => start_native(root, config, sink),
        }
    }

    /// Starts watching `config.root` with an explicit backend.
    ///
    /// `config.backend` is ignored.
    pub fn start_with_source<S, K>(source: S, config: &WatchConfig, sink: K) -> Result<Self, WatchError>
    where
        S: RawEventSource,
        K: EventSink,
    {
        let root = resolve_root(&config.root)?;
        Self::spawn(source, root, config, sink)
    }

    fn spawn<S, K>(
        source: S,
        root: Utf8PathBuf,
        config: &WatchConfig,
        sink: K,
    ) -> Result<Self, WatchError>
    where
        S: RawEventSource,
        K: EventSink,
    {
        let backend = source.name();
        let counters = Arc::new(WatchCounters::default());
        let mut watch_loop = WatchLoop::new(source, sink, config, Arc::clone(&counters));
        watch_loop.install_root(&root)?;

        let stop = Arc::new(AtomicBool::new(false));
        let thread_stop = Arc::clone(&stop);
        let poll_interval = config.poll_interval();
        let thread = std::thread::Builder::new()
            .name(THREAD_NAME.to_owned())
            .spawn(move || watch_loop.run(&thread_stop, poll_interval))
            .map_err(WatchError::Spawn)?;

        info!(
            root = %root,
            backend,
            watches = counters.snapshot().watches,
            "Watcher started"
        );

        Ok(Self {
            root,
            backend,
            stop,
            counters,
            thread: Some(thread),
        })
    }

    /// Returns the canonical watched root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Returns the backend name.
    #[must_use]
    pub const fn backend(&self) -> &'static str {
        self.backend
    }

    /// Returns a snapshot of the watcher counters.
    #[must_use]
    pub fn stats(&self) -> WatcherStats {
        self.counters.snapshot()
    }

    /// Returns `true` while the monitoring thread is alive.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stops the monitoring thread and waits for it.
    ///
    /// The backend, with all of its watches, is released before this
    /// returns. Pending move-outs are discarded.
    ///
    /// # Errors
    ///
    /// Returns the error that ended the loop early, or
    /// [`WatchError::ThreadPanicked`].
    pub fn stop(mut self) -> Result<(), WatchError> {
        self.shutdown()
    }

    fn shutdown(&mut self) -> Result<(), WatchError> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };

        self.stop.store(true, Ordering::Release);
        let result = thread.join().map_err(|_| WatchError::ThreadPanicked)?;

        let stats = self.counters.snapshot();
        info!(
            root = %self.root,
            emitted = stats.emitted,
            raw_records = stats.raw_records,
            "Watcher stopped"
        );
        result
    }
}

impl Drop for RecursiveWatcher {
    fn drop(&mut self) {
        if let Err(error) = self.shutdown() {
            warn!(error = %error, "Watcher stopped with an error");
        }
    }
}

#[cfg(target_os = "linux")]
fn start_native<K: EventSink>(
    root: Utf8PathBuf,
    config: &WatchConfig,
    sink: K,
) -> Result<RecursiveWatcher, WatchError> {
    let source = crate::backend::InotifySource::new().map_err(WatchError::Backend)?;
    RecursiveWatcher::spawn(source, root, config, sink)
}

#[cfg(not(target_os = "linux"))]
fn start_native<K: EventSink>(
    root: Utf8PathBuf,
    config: &WatchConfig,
    sink: K,
) -> Result<RecursiveWatcher, WatchError> {
    if config.backend == BackendKind::Inotify {
        return Err(WatchError::UnsupportedBackend(BackendKind::Inotify));
    }
    RecursiveWatcher::spawn(NotifySource::new()?, root, config, sink)
}

fn resolve_root(root: &Utf8Path) -> Result<Utf8PathBuf, WatchError> {
    if !root.exists() {
        return Err(WatchError::RootNotFound(root.to_owned()));
    }
    if !root.is_dir() {
        return Err(WatchError::NotADirectory(root.to_owned()));
    }
    root.canonicalize_utf8().map_err(|e| WatchError::io(root, e))
}

/// State owned by the monitoring thread.
struct WatchLoop<S: RawEventSource, K> {
    source: S,
    sink: K,
    table: WatchTable<S::Handle>,
    pairer: RenamePairer,
    counters: Arc<WatchCounters>,
    follow_links: bool,
}

impl<S: RawEventSource, K: EventSink> WatchLoop<S, K> {
    fn new(source: S, sink: K, config: &WatchConfig, counters: Arc<WatchCounters>) -> Self {
        Self {
            source,
            sink,
            table: WatchTable::new(),
            pairer: RenamePairer::new(config.rename_timeout()),
            counters,
            follow_links: config.follow_links,
        }
    }

    fn run(mut self, stop: &AtomicBool, poll_interval: Duration) -> Result<(), WatchError> {
        debug!(backend = self.source.name(), "Monitoring loop running");
        let mut buffer = Vec::new();

        let result = loop {
            if stop.load(Ordering::Acquire) {
                break Ok(());
            }
            match self.poll_once(&mut buffer, Instant::now()) {
                Ok(0) => std::thread::sleep(poll_interval),
                Ok(_) => {}
                Err(error) => {
                    error!(error = %error, "Watch backend failed, stopping monitoring loop");
                    break Err(error);
                }
            }
        };

        let discarded = self.pairer.drain();
        if !discarded.is_empty() {
            debug!(count = discarded.len(), "Discarding pending renames");
        }
        self.table.drain();
        self.counters.set_watches(0);
        result
    }

    /// Reads whatever the backend has queued, processes it, then degrades
    /// expired move-outs. Returns the number of raw records read.
    fn poll_once(
        &mut self,
        buffer: &mut Vec<RawEvent<S::Handle>>,
        now: Instant,
    ) -> Result<usize, WatchError> {
        buffer.clear();
        self.source
            .read_available(buffer)
            .map_err(WatchError::Backend)?;
        let count = buffer.len();

        for raw in buffer.drain(..) {
            for event in self.process(raw, now) {
                self.emit(event);
            }
        }
        for pending in self.pairer.expire(now) {
            let event = self.degrade(pending);
            self.emit(event);
        }

        Ok(count)
    }

    fn process(&mut self, raw: RawEvent<S::Handle>, now: Instant) -> SmallVec<[FileEvent; 2]> {
        self.counters.record_raw();
        let mut events = SmallVec::new();

        match raw.kind {
            RawEventKind::Overflow => {
                warn!("Kernel event queue overflowed, changes may have been missed");
                self.counters.record_overflow();
                return events;
            }
            RawEventKind::Ignored => {
                if let Some(dir) = self.table.remove_handle(&raw.handle) {
                    debug!(dir = %dir, "Watch dropped by the OS");
                    self.sync_watch_count();
                }
                return events;
            }
            _ => {}
        }

        let Some(dir) = self.table.path_of(&raw.handle) else {
            trace!(handle = ?raw.handle, kind = ?raw.kind, "Record for unknown watch");
            self.counters.record_unresolved();
            return events;
        };
        let Some(name) = raw.name.as_deref() else {
            trace!(dir = %dir, kind = ?raw.kind, "Record about a watched directory itself");
            return events;
        };
        let path = dir.join(name);
        let is_dir = raw.is_directory;

        match raw.kind {
            RawEventKind::Create => {
                if is_dir {
                    self.reinstall_tree(&path);
                }
                events.push(FileEvent::added(path, is_dir));
            }
            RawEventKind::Delete => {
                if is_dir {
                    self.uninstall_tree(&path);
                }
                events.push(FileEvent::removed(path, is_dir));
            }
            RawEventKind::Modify => {
                if !is_dir {
                    events.push(FileEvent::modified(path, false));
                }
            }
            RawEventKind::MovedFrom => {
                if raw.cookie == 0 {
                    let pending = PendingMove {
                        path,
                        is_directory: is_dir,
                        stashed_at: now,
                    };
                    events.push(self.degrade(pending));
                } else if let Some(displaced) = self.pairer.stash(raw.cookie, path, is_dir, now) {
                    events.push(self.degrade(displaced));
                }
            }
            RawEventKind::MovedTo => {
                let source = if raw.cookie == 0 {
                    None
                } else {
                    self.pairer.take(raw.cookie)
                };
                match source {
                    Some(source) => {
                        if is_dir {
                            self.rehome_tree(&source.path, &path);
                        }
                        events.push(FileEvent::renamed(source.path, path, is_dir));
                    }
                    None => {
                        if is_dir {
                            self.reinstall_tree(&path);
                        }
                        events.push(FileEvent::added(path, is_dir));
                    }
                }
            }
            RawEventKind::Overflow | RawEventKind::Ignored => {}
        }

        events
    }

    fn degrade(&mut self, pending: PendingMove) -> FileEvent {
        self.counters.record_degraded_rename();
        debug!(path = %pending.path, "Unpaired move-out treated as removal");
        if pending.is_directory {
            self.uninstall_tree(&pending.path);
        }
        FileEvent::removed(pending.path, pending.is_directory)
    }

    fn emit(&mut self, event: FileEvent) {
        self.counters.record_emitted();
        debug!(
            kind = event.kind.label(),
            path = %event.path,
            is_directory = event.is_directory,
            "Emitting event"
        );
        self.sink.emit(event);
    }

    fn install_root(&mut self, root: &Utf8Path) -> Result<(), WatchError> {
        let handle = self
            .source
            .add_watch(root)
            .map_err(|e| WatchError::io(root, e))?;
        self.table.insert(handle, root.to_owned());
        self.install_tree(root);
        Ok(())
    }

    /// Watches `dir` and every directory beneath it that is not yet watched.
    /// A directory that cannot be watched leaves its subtree unmonitored.
    fn install_tree(&mut self, dir: &Utf8Path) {
        let walk = match TreeWalker::new(dir) {
            Ok(walker) => walker.with_follow_links(self.follow_links).directories(),
            Err(error) => {
                debug!(dir = %dir, error = %error, "Directory gone before it could be watched");
                return;
            }
        };
        for _ in &walk.errors {
            self.counters.record_watch_failure();
        }

        let mut failed: Vec<Utf8PathBuf> = Vec::new();
        for path in walk.paths {
            if self.table.handle_of(&path).is_some() || failed.iter().any(|f| path.starts_with(f)) {
                continue;
            }
            match self.source.add_watch(&path) {
                Ok(handle) => {
                    if let Some(previous) = self.table.insert(handle, path.clone()) {
                        debug!(from = %previous, to = %path, "Watch re-homed");
                    }
                }
                Err(error) => {
                    warn!(dir = %path, error = %error, "Failed to watch directory, subtree left unmonitored");
                    self.counters.record_watch_failure();
                    failed.push(path);
                }
            }
        }
        self.sync_watch_count();
    }

    fn uninstall_tree(&mut self, dir: &Utf8Path) {
        for (handle, path) in self.table.remove_subtree(dir) {
            self.release(&handle, &path);
        }
        self.sync_watch_count();
    }

    /// Moves the watches of `from` and its descendants to `to`.
    ///
    /// Entries already under `to` belong to a directory the move replaced
    /// and are dropped with the old ones. New watches go in before stale
    /// ones are released, so a backend that hands back the moved inode's
    /// existing handle keeps it.
    fn rehome_tree(&mut self, from: &Utf8Path, to: &Utf8Path) {
        let mut stale = self.table.remove_subtree(from);
        stale.extend(self.table.remove_subtree(to));
        self.install_tree(to);
        self.release_stale(stale);
    }

    /// Watches a directory that appeared at `dir`, replacing whatever the
    /// table still holds for that path.
    fn reinstall_tree(&mut self, dir: &Utf8Path) {
        let stale = self.table.remove_subtree(dir);
        self.install_tree(dir);
        self.release_stale(stale);
    }

    fn release_stale(&mut self, stale: Vec<(S::Handle, Utf8PathBuf)>) {
        for (handle, path) in stale {
            if !self.table.contains_handle(&handle) {
                self.release(&handle, &path);
            }
        }
        self.sync_watch_count();
    }

    fn release(&mut self, handle: &S::Handle, path: &Utf8Path) {
        if let Err(error) = self.source.remove_watch(handle) {
            trace!(dir = %path, error = %error, "Watch already released");
        }
    }

    fn sync_watch_count(&self) {
        self.counters.set_watches(self.table.len());
    }
}
