//! Recursive filesystem watcher with rename pairing.
//!
//! This crate installs one non-recursive OS watch per directory of a tree,
//! keeps that watch set in sync as directories come and go, and turns raw
//! OS records into normalized [`FileEvent`](ag_core::FileEvent)s.
//!
//! # Overview
//!
//! - [`WatchTable`] - handle ↔ directory bijection
//! - [`RawEventSource`] - non-blocking raw record reader, one per backend
//!   ([`InotifySource`] on Linux, [`NotifySource`] everywhere)
//! - [`RenamePairer`] - cookie-keyed move-out/move-in correlation
//! - [`RecursiveWatcher`] - owns all three on a dedicated thread
//! - [`AgentSession`] - index + bus + watcher for one root
//!
//! # Crate Dependencies
//!
//! ```text
//! ag-cli ──► ag-watcher ──► ag-index ──► ag-core
//!                      └──► ag-bus ─────►
//! ```
//!
//! # Event Normalization
//!
//! | raw record            | emitted event        | watch maintenance              |
//! |-----------------------|----------------------|--------------------------------|
//! | create                | `Added`              | directory: watch its tree      |
//! | delete                | `Removed`            | directory: drop its subtree    |
//! | modify                | `Modified`           | directories are filtered       |
//! | move-out + move-in    | `Renamed`            | directory: re-home the subtree |
//! | move-in, unpaired     | `Added`              | directory: watch its tree      |
//! | move-out, unpaired    | `Removed` on timeout | directory: drop its subtree    |
//! | ignored               | -                    | forget the handle              |
//! | overflow              | -                    | logged and counted             |
//!
//! # Usage
//!
//! ```no_run
//! use ag_core::{Config, WatchConfig};
//! use ag_watcher::AgentSession;
//!
//! # async fn example() -> Result<(), ag_watcher::WatchError> {
//! let config = Config {
//!     watch: WatchConfig::new("/srv/assets"),
//!     ..Config::default()
//! };
//! let session = AgentSession::start(&config)?;
//! let mut events = session.subscribe();
//!
//! while let Some(event) = events.recv().await {
//!     println!("{} {}", event.kind.label(), event.path);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Error Handling
//!
//! ```
//! use ag_watcher::WatchError;
//!
//! fn report(err: &WatchError) {
//!     if err.is_fatal() {
//!         eprintln!("Fatal watcher error: {err}");
//!     } else {
//!         eprintln!("Warning: {err}");
//!     }
//! }
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod backend;
pub mod error;
pub mod pairer;
pub mod raw;
pub mod session;
pub mod stats;
pub mod table;
pub mod watcher;

pub use backend::{NotifySource, RawEventSource};
#[cfg(target_os = "linux")]
pub use backend::InotifySource;
pub use error::WatchError;
pub use pairer::{PendingMove, RenamePairer};
pub use raw::{RawEvent, RawEventKind};
pub use session::AgentSession;
pub use stats::WatcherStats;
pub use table::WatchTable;
pub use watcher::{EventSink, RecursiveWatcher};
