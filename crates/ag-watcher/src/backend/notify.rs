//! Portable backend on top of the `notify` crate.
//!
//! Each directory gets its own non-recursive watch so the watcher can keep
//! its own table in sync exactly as it does for inotify. Full event paths
//! are split back into `(parent handle, name)` records.
//!
//! Rename halves are correlated through the event tracker when the platform
//! provides one. `RenameMode::Both` events without a tracker are split into
//! a synthetic move-out/move-in pair. `RenameMode::Any` events carry no
//! correlation at all and surface as an unpaired move-out or move-in.
//!
//! On Linux a watched directory also reports its own move as an untracked
//! `RenameMode::From` on the old path, after the parent's tracked pair.
//! That record is dropped; the parent's pair already describes the move.

use std::io;
use std::path::PathBuf;
use std::sync::mpsc::{self, Receiver, TryRecvError};

use ag_core::{FxHashSet, fx_hash_set};
use camino::{Utf8Path, Utf8PathBuf};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{trace, warn};

use super::RawEventSource;
use crate::error::WatchError;
use crate::raw::{RawEvent, RawEventKind};
use crate::table::WatchTable;

/// Handle reported on records that are not tied to any watch.
const NO_HANDLE: u64 = 0;

/// Cookies synthesized locally start in the upper half of the range.
const SYNTHETIC_COOKIE_BASE: u32 = 1 << 31;

/// The platform's recommended `notify` watcher, drained non-blockingly.
pub struct NotifySource {
    watcher: RecommendedWatcher,
    rx: Receiver<notify::Result<Event>>,
    watches: WatchTable<u64>,
    // Directories whose removal was already reported. A watched directory's
    // deletion arrives both from its parent and from its own watch.
    removed_dirs: FxHashSet<Utf8PathBuf>,
    // Watched directories whose tracked move-out was reported and whose own
    // move notice is still due.
    moved_dirs: FxHashSet<Utf8PathBuf>,
    next_handle: u64,
    next_cookie: u32,
}

impl std::fmt::Debug for NotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotifySource")
            .field("watches", &self.watches.len())
            .finish_non_exhaustive()
    }
}

impl NotifySource {
    /// Creates the platform's recommended watcher.
    pub fn new() -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel();
        let watcher = notify::recommended_watcher(tx)?;

        Ok(Self {
            watcher,
            rx,
            watches: WatchTable::new(),
            removed_dirs: fx_hash_set(),
            moved_dirs: fx_hash_set(),
            next_handle: NO_HANDLE + 1,
            next_cookie: SYNTHETIC_COOKIE_BASE,
        })
    }

    fn synthetic_cookie(&mut self) -> u32 {
        let cookie = self.next_cookie;
        self.next_cookie = self.next_cookie.wrapping_add(1).max(SYNTHETIC_COOKIE_BASE);
        cookie
    }

    fn decode(&mut self, event: Event, out: &mut Vec<RawEvent<u64>>) {
        if event.need_rescan() {
            out.push(RawEvent::new(NO_HANDLE, RawEventKind::Overflow));
            return;
        }

        let tracker = event.attrs.tracker().and_then(|t| u32::try_from(t).ok());

        match event.kind {
            EventKind::Create(kind) => {
                for path in event.paths {
                    let Some(path) = utf8(path) else { continue };
                    self.removed_dirs.remove(&path);
                    let is_dir = match kind {
                        CreateKind::Folder => true,
                        CreateKind::File => false,
                        _ => path.is_dir(),
                    };
                    self.push(out, &path, RawEventKind::Create, 0, is_dir);
                }
            }
            EventKind::Remove(kind) => {
                for path in event.paths {
                    let Some(path) = utf8(path) else { continue };
                    if self.removed_dirs.contains(&path) {
                        trace!(path = %path, "Skipping repeated directory removal");
                        continue;
                    }
                    let is_dir = match kind {
                        RemoveKind::Folder => true,
                        RemoveKind::File => false,
                        _ => self.watches.handle_of(&path).is_some(),
                    };
                    // A directory replaced by a move reports its deletion
                    // under a path that now holds the moved directory.
                    if is_dir && path.is_dir() {
                        trace!(path = %path, "Skipping removal of a replaced directory");
                        continue;
                    }
                    if is_dir {
                        self.removed_dirs.insert(path.clone());
                    }
                    self.push(out, &path, RawEventKind::Delete, 0, is_dir);
                }
            }
            EventKind::Modify(ModifyKind::Name(mode)) => {
                self.decode_rename(mode, event.paths, tracker, out);
            }
            EventKind::Modify(ModifyKind::Metadata(_)) => {}
            EventKind::Modify(_) => {
                for path in event.paths {
                    let Some(path) = utf8(path) else { continue };
                    let is_dir = path.is_dir();
                    self.push(out, &path, RawEventKind::Modify, 0, is_dir);
                }
            }
            EventKind::Access(_) | EventKind::Any | EventKind::Other => {}
        }
    }

    fn decode_rename(
        &mut self,
        mode: RenameMode,
        paths: Vec<PathBuf>,
        tracker: Option<u32>,
        out: &mut Vec<RawEvent<u64>>,
    ) {
        let mut paths = paths.into_iter().filter_map(utf8);

        match mode {
            RenameMode::From => {
                let Some(from) = paths.next() else { return };
                if tracker.is_none() && self.moved_dirs.remove(&from) {
                    trace!(path = %from, "Skipping a moved directory's own rename record");
                    return;
                }
                let is_dir = self.watches.handle_of(&from).is_some();
                if is_dir && tracker.is_some() {
                    self.moved_dirs.insert(from.clone());
                }
                self.push(out, &from, RawEventKind::MovedFrom, tracker.unwrap_or(0), is_dir);
            }
            RenameMode::To => {
                if let Some(to) = paths.next() {
                    let is_dir = to.is_dir();
                    self.push(out, &to, RawEventKind::MovedTo, tracker.unwrap_or(0), is_dir);
                }
            }
            // Already reported as a tracked From/To pair.
            RenameMode::Both if tracker.is_some() => {}
            RenameMode::Both => {
                let (Some(from), Some(to)) = (paths.next(), paths.next()) else {
                    return;
                };
                let cookie = self.synthetic_cookie();
                let is_dir = to.is_dir();
                self.push(out, &from, RawEventKind::MovedFrom, cookie, is_dir);
                self.push(out, &to, RawEventKind::MovedTo, cookie, is_dir);
            }
            RenameMode::Any => {
                for path in paths {
                    // A watched directory reporting its own move; the parent
                    // reports the entry move.
                    if self.watches.handle_of(&path).is_some() && !path.exists() {
                        continue;
                    }
                    let cookie = tracker.unwrap_or(0);
                    if path.exists() {
                        let is_dir = path.is_dir();
                        self.push(out, &path, RawEventKind::MovedTo, cookie, is_dir);
                    } else {
                        self.push(out, &path, RawEventKind::MovedFrom, cookie, false);
                    }
                }
            }
            RenameMode::Other => {}
        }
    }

    fn push(
        &self,
        out: &mut Vec<RawEvent<u64>>,
        path: &Utf8Path,
        kind: RawEventKind,
        cookie: u32,
        is_directory: bool,
    ) {
        let (Some(parent), Some(name)) = (path.parent(), path.file_name()) else {
            return;
        };
        let Some(&handle) = self.watches.handle_of(parent) else {
            trace!(path = %path, "Record outside watched directories");
            return;
        };

        out.push(
            RawEvent::new(handle, kind)
                .named(name)
                .with_cookie(cookie)
                .directory(is_directory),
        );
    }
}

fn utf8(path: PathBuf) -> Option<Utf8PathBuf> {
    match Utf8PathBuf::from_path_buf(path) {
        Ok(path) => Some(path),
        Err(path) => {
            let error = WatchError::NonUtf8Path(path);
            warn!(error = %error, "Skipping record");
            None
        }
    }
}

impl RawEventSource for NotifySource {
    type Handle = u64;

    fn add_watch(&mut self, dir: &Utf8Path) -> io::Result<u64> {
        // Re-watching a known path re-arms it: the directory there may be a
        // different one than when it was first watched.
        self.watcher
            .watch(dir.as_std_path(), RecursiveMode::NonRecursive)
            .map_err(io::Error::other)?;
        self.removed_dirs.remove(dir);

        if let Some(&handle) = self.watches.handle_of(dir) {
            return Ok(handle);
        }
        let handle = self.next_handle;
        self.next_handle += 1;
        self.watches.insert(handle, dir.to_owned());
        Ok(handle)
    }

    fn remove_watch(&mut self, handle: &u64) -> io::Result<()> {
        let Some(dir) = self.watches.remove_handle(handle) else {
            return Ok(());
        };
        // A directory no longer at its path was deleted or moved. Its OS
        // watch is gone or now serves the new location.
        if !dir.exists() {
            return Ok(());
        }
        self.watcher
            .unwatch(dir.as_std_path())
            .map_err(io::Error::other)
    }

    fn read_available(&mut self, out: &mut Vec<RawEvent<u64>>) -> io::Result<()> {
        loop {
            match self.rx.try_recv() {
                Ok(Ok(event)) => self.decode(event, out),
                Ok(Err(error)) => warn!(error = %error, "notify backend error"),
                Err(TryRecvError::Empty) => return Ok(()),
                Err(TryRecvError::Disconnected) => {
                    return Err(io::Error::new(
                        io::ErrorKind::BrokenPipe,
                        "notify event channel disconnected",
                    ));
                }
            }
        }
    }

    fn name(&self) -> &'static str {
        "notify"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::time::{Duration, Instant};

    fn utf8_temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("Invalid path");
        (dir, path)
    }

    fn source_watching(root: &Utf8Path) -> (NotifySource, u64) {
        let mut source = NotifySource::new().unwrap();
        let handle = source.add_watch(root).unwrap();
        (source, handle)
    }

    #[test]
    fn test_add_watch_is_idempotent() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, handle) = source_watching(&root);
        assert_eq!(source.add_watch(&root).unwrap(), handle);
        assert_ne!(handle, NO_HANDLE);
    }

    #[test]
    fn test_decode_create_splits_parent_and_name() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, handle) = source_watching(&root);

        let mut out = Vec::new();
        let event = Event::new(EventKind::Create(CreateKind::Folder))
            .add_path(root.join("textures").into_std_path_buf());
        source.decode(event, &mut out);

        assert_eq!(
            out,
            vec![
                RawEvent::new(handle, RawEventKind::Create)
                    .named("textures")
                    .directory(true)
            ]
        );
    }

    #[test]
    fn test_decode_skips_unwatched_parent() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, _) = source_watching(&root);

        let mut out = Vec::new();
        let event = Event::new(EventKind::Create(CreateKind::File))
            .add_path(root.join("elsewhere/file.txt").into_std_path_buf());
        source.decode(event, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_tracked_rename_halves() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, handle) = source_watching(&root);

        let mut out = Vec::new();
        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(root.join("a.txt").into_std_path_buf())
            .set_tracker(9);
        let to = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::To)))
            .add_path(root.join("b.txt").into_std_path_buf())
            .set_tracker(9);
        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("a.txt").into_std_path_buf())
            .add_path(root.join("b.txt").into_std_path_buf())
            .set_tracker(9);
        source.decode(from, &mut out);
        source.decode(to, &mut out);
        source.decode(both, &mut out);

        assert_eq!(
            out,
            vec![
                RawEvent::new(handle, RawEventKind::MovedFrom)
                    .named("a.txt")
                    .with_cookie(9),
                RawEvent::new(handle, RawEventKind::MovedTo)
                    .named("b.txt")
                    .with_cookie(9),
            ]
        );
    }

    #[test]
    fn test_decode_untracked_both_synthesizes_cookie() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, _) = source_watching(&root);

        let mut out = Vec::new();
        let both = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(root.join("a.txt").into_std_path_buf())
            .add_path(root.join("b.txt").into_std_path_buf());
        source.decode(both, &mut out);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0].kind, RawEventKind::MovedFrom);
        assert_eq!(out[1].kind, RawEventKind::MovedTo);
        assert_eq!(out[0].cookie, out[1].cookie);
        assert!(out[0].cookie >= SYNTHETIC_COOKIE_BASE);
    }

    #[test]
    fn test_decode_directory_removal_once() {
        let (_guard, root) = utf8_temp_dir();
        let sub = root.join("sub");
        fs::create_dir(&sub).unwrap();
        let (mut source, _) = source_watching(&root);
        source.add_watch(&sub).unwrap();
        fs::remove_dir(&sub).unwrap();

        let mut out = Vec::new();
        for _ in 0..2 {
            let event = Event::new(EventKind::Remove(RemoveKind::Any))
                .add_path(sub.clone().into_std_path_buf());
            source.decode(event, &mut out);
        }

        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, RawEventKind::Delete);
        assert!(out[0].is_directory);
    }

    #[test]
    fn test_decode_skips_removal_of_replaced_directory() {
        let (_guard, root) = utf8_temp_dir();
        let dst = root.join("dst");
        fs::create_dir(&dst).unwrap();
        let (mut source, _) = source_watching(&root);
        source.add_watch(&dst).unwrap();

        let mut out = Vec::new();
        let event = Event::new(EventKind::Remove(RemoveKind::Folder))
            .add_path(dst.clone().into_std_path_buf());
        source.decode(event, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_decode_drops_directory_self_move_after_tracked_move_out() {
        let (_guard, root) = utf8_temp_dir();
        let dir = root.join("dir");
        fs::create_dir(&dir).unwrap();
        let (mut source, handle) = source_watching(&root);
        source.add_watch(&dir).unwrap();

        let mut out = Vec::new();
        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(dir.clone().into_std_path_buf())
            .set_tracker(4);
        let own_move = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(dir.clone().into_std_path_buf());
        source.decode(from, &mut out);
        source.decode(own_move, &mut out);

        assert_eq!(
            out,
            vec![
                RawEvent::new(handle, RawEventKind::MovedFrom)
                    .named("dir")
                    .with_cookie(4)
                    .directory(true)
            ]
        );
        assert!(source.moved_dirs.is_empty());
    }

    #[test]
    fn test_decode_keeps_untracked_move_out_without_prior_report() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, handle) = source_watching(&root);

        let mut out = Vec::new();
        let from = Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::From)))
            .add_path(root.join("a.txt").into_std_path_buf());
        source.decode(from, &mut out);

        assert_eq!(
            out,
            vec![RawEvent::new(handle, RawEventKind::MovedFrom).named("a.txt")]
        );
    }

    #[test]
    fn test_decode_rescan_is_overflow() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, _) = source_watching(&root);

        let mut out = Vec::new();
        let event = Event::new(EventKind::Other).set_flag(notify::event::Flag::Rescan);
        source.decode(event, &mut out);

        assert_eq!(out, vec![RawEvent::new(NO_HANDLE, RawEventKind::Overflow)]);
    }

    #[test]
    fn test_live_file_creation() {
        let (_guard, root) = utf8_temp_dir();
        let (mut source, handle) = source_watching(&root);

        fs::write(root.join("new.txt"), "x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(2);
        let mut out = Vec::new();
        while Instant::now() < deadline
            && !out.iter().any(|r: &RawEvent<u64>| r.kind == RawEventKind::Create)
        {
            source.read_available(&mut out).unwrap();
            std::thread::sleep(Duration::from_millis(10));
        }

        let create = out
            .iter()
            .find(|r| r.kind == RawEventKind::Create)
            .expect("create record");
        assert_eq!(create.handle, handle);
        assert_eq!(create.name.as_deref(), Some("new.txt"));
    }
}
