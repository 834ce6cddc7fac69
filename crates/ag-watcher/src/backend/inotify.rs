//! Native Linux backend on top of the `inotify` crate.

use std::ffi::OsStr;
use std::io;

use camino::Utf8Path;
use inotify::{Event, EventMask, Inotify, WatchDescriptor, WatchMask};
use tracing::warn;

use super::RawEventSource;
use crate::raw::{RawEvent, RawEventKind};

const BUFFER_SIZE: usize = 64 * 1024;

fn watch_mask() -> WatchMask {
    WatchMask::CREATE
        | WatchMask::DELETE
        | WatchMask::MODIFY
        | WatchMask::MOVED_FROM
        | WatchMask::MOVED_TO
        | WatchMask::ONLYDIR
}

/// An inotify instance in non-blocking mode.
pub struct InotifySource {
    inotify: Inotify,
    buffer: Box<[u8]>,
}

impl std::fmt::Debug for InotifySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InotifySource")
            .field("buffer_size", &self.buffer.len())
            .finish_non_exhaustive()
    }
}

impl InotifySource {
    /// Opens a new inotify instance.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            inotify: Inotify::init()?,
            buffer: vec![0; BUFFER_SIZE].into_boxed_slice(),
        })
    }
}

impl RawEventSource for InotifySource {
    type Handle = WatchDescriptor;

    fn add_watch(&mut self, dir: &Utf8Path) -> io::Result<WatchDescriptor> {
        self.inotify.watches().add(dir.as_std_path(), watch_mask())
    }

    fn remove_watch(&mut self, handle: &WatchDescriptor) -> io::Result<()> {
        self.inotify.watches().remove(handle.clone())
    }

    fn read_available(&mut self, out: &mut Vec<RawEvent<WatchDescriptor>>) -> io::Result<()> {
        loop {
            let events = match self.inotify.read_events(&mut self.buffer) {
                Ok(events) => events,
                Err(error) if error.kind() == io::ErrorKind::WouldBlock => return Ok(()),
                Err(error) => return Err(error),
            };

            let before = out.len();
            let mut read_any = false;
            for event in events {
                read_any = true;
                if let Some(raw) = decode(event) {
                    out.push(raw);
                }
            }

            if !read_any {
                return Ok(());
            }
            tracing::trace!(decoded = out.len() - before, "Drained inotify buffer");
        }
    }

    fn name(&self) -> &'static str {
        "inotify"
    }
}

fn decode(event: Event<&OsStr>) -> Option<RawEvent<WatchDescriptor>> {
    let mask = event.mask;
    let kind = if mask.contains(EventMask::Q_OVERFLOW) {
        RawEventKind::Overflow
    } else if mask.contains(EventMask::IGNORED) {
        RawEventKind::Ignored
    } else if mask.contains(EventMask::CREATE) {
        RawEventKind::Create
    } else if mask.contains(EventMask::DELETE) {
        RawEventKind::Delete
    } else if mask.contains(EventMask::MODIFY) {
        RawEventKind::Modify
    } else if mask.contains(EventMask::MOVED_FROM) {
        RawEventKind::MovedFrom
    } else if mask.contains(EventMask::MOVED_TO) {
        RawEventKind::MovedTo
    } else {
        return None;
    };

    let name = match event.name {
        None => None,
        Some(name) => {
            let Some(name) = name.to_str() else {
                warn!(name = %name.to_string_lossy(), "Skipping record with non-UTF-8 name");
                return None;
            };
            Some(name.to_owned())
        }
    };

    Some(RawEvent {
        handle: event.wd,
        kind,
        cookie: event.cookie,
        name,
        is_directory: mask.contains(EventMask::ISDIR),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use camino::Utf8PathBuf;
    use std::fs;
    use std::time::{Duration, Instant};

    fn utf8_temp_dir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().expect("Failed to create temp directory");
        let path = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("Invalid path");
        (dir, path)
    }

    fn read_until(
        source: &mut InotifySource,
        done: impl Fn(&[RawEvent<WatchDescriptor>]) -> bool,
    ) -> Vec<RawEvent<WatchDescriptor>> {
        let deadline = Instant::now() + Duration::from_secs(2);
        let mut out = Vec::new();
        while Instant::now() < deadline && !done(&out) {
            source.read_available(&mut out).unwrap();
            std::thread::sleep(Duration::from_millis(5));
        }
        out
    }

    #[test]
    fn test_empty_read_does_not_block() {
        let (_guard, root) = utf8_temp_dir();
        let mut source = InotifySource::new().unwrap();
        source.add_watch(&root).unwrap();

        let mut out = Vec::new();
        source.read_available(&mut out).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_create_and_rename_records() {
        let (_guard, root) = utf8_temp_dir();
        let mut source = InotifySource::new().unwrap();
        let wd = source.add_watch(&root).unwrap();

        fs::create_dir(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), "a").unwrap();
        fs::rename(root.join("a.txt"), root.join("b.txt")).unwrap();

        let records = read_until(&mut source, |out| {
            out.iter().any(|r| r.kind == RawEventKind::MovedTo)
        });

        let dir_create = records
            .iter()
            .find(|r| r.kind == RawEventKind::Create && r.name.as_deref() == Some("sub"))
            .expect("directory create record");
        assert!(dir_create.is_directory);
        assert_eq!(dir_create.handle, wd);

        let from = records
            .iter()
            .find(|r| r.kind == RawEventKind::MovedFrom)
            .expect("moved-from record");
        let to = records
            .iter()
            .find(|r| r.kind == RawEventKind::MovedTo)
            .expect("moved-to record");
        assert_eq!(from.name.as_deref(), Some("a.txt"));
        assert_eq!(to.name.as_deref(), Some("b.txt"));
        assert_ne!(from.cookie, 0);
        assert_eq!(from.cookie, to.cookie);
    }

    #[test]
    fn test_rewatching_same_directory_returns_same_handle() {
        let (_guard, root) = utf8_temp_dir();
        let mut source = InotifySource::new().unwrap();
        let first = source.add_watch(&root).unwrap();
        let second = source.add_watch(&root).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_add_watch_on_file_fails() {
        let (_guard, root) = utf8_temp_dir();
        let file = root.join("plain.txt");
        fs::write(&file, "x").unwrap();

        let mut source = InotifySource::new().unwrap();
        assert!(source.add_watch(&file).is_err());
    }
}
