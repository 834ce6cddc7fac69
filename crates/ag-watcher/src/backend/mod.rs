//! OS notification backends.
//!
//! Every backend implements [`RawEventSource`]: non-recursive watches keyed
//! by an opaque handle, and a non-blocking read that decodes whatever
//! records are currently queued.
//!
//! | backend            | platforms        | handle                 |
//! |--------------------|------------------|------------------------|
//! | [`InotifySource`]  | Linux            | `inotify::WatchDescriptor` |
//! | [`NotifySource`]   | everywhere       | `u64` issued locally   |

#[cfg(target_os = "linux")]
mod inotify;
mod notify;

#[cfg(target_os = "linux")]
pub use self::inotify::InotifySource;
pub use self::notify::NotifySource;

use std::fmt::Debug;
use std::hash::Hash;
use std::io;

use camino::Utf8Path;

use crate::raw::RawEvent;

/// A non-blocking source of raw change records.
pub trait RawEventSource: Send + 'static {
    /// Opaque identifier of one installed watch.
    type Handle: Clone + Eq + Hash + Debug + Send + 'static;

    /// Installs a non-recursive watch on `dir`.
    ///
    /// Watching a directory that is already watched returns its existing
    /// handle when the facility tracks watches per inode.
    fn add_watch(&mut self, dir: &Utf8Path) -> io::Result<Self::Handle>;

    /// Removes a watch. Errors for watches the OS already dropped are
    /// expected and may be ignored by the caller.
    fn remove_watch(&mut self, handle: &Self::Handle) -> io::Result<()>;

    /// Appends every currently queued record to `out` without blocking.
    ///
    /// An empty `out` means no data was available.
    fn read_available(&mut self, out: &mut Vec<RawEvent<Self::Handle>>) -> io::Result<()>;

    /// Short backend name for logs.
    fn name(&self) -> &'static str;
}
