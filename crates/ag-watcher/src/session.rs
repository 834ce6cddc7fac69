//! One watched root: index, bus and watcher wired together.
//!
//! ```text
//! RecursiveWatcher ──► sink ──► AssetIndex::on_file_event
//!                          └──► EventBus::publish   (after the index update)
//! ```

use std::sync::Arc;

use ag_bus::{BusStats, EventBus, Subscription};
use ag_core::{Config, FileEvent};
use ag_index::{AssetIndex, ScanSummary};
use camino::Utf8Path;
use tracing::info;

use crate::backend::RawEventSource;
use crate::error::WatchError;
use crate::stats::WatcherStats;
use crate::watcher::RecursiveWatcher;

/// A running agent for one root.
///
/// # Examples
///
/// ```no_run
/// use ag_core::{Config, WatchConfig};
/// use ag_watcher::AgentSession;
///
/// # fn example() -> Result<(), ag_watcher::WatchError> {
/// let config = Config {
///     watch: WatchConfig::new("/srv/assets"),
///     ..Config::default()
/// };
/// let session = AgentSession::start(&config)?;
/// let mut events = session.subscribe();
///
/// println!("{} assets indexed", session.index().len());
/// while let Some(event) = events.blocking_recv() {
///     println!("{} {}", event.kind.label(), event.path);
/// }
/// session.stop()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct AgentSession {
    index: Arc<AssetIndex>,
    bus: EventBus,
    watcher: RecursiveWatcher,
    scan: ScanSummary,
}

impl AgentSession {
    /// Validates `config`, starts the watcher, then runs the initial scan.
    ///
    /// The scan runs after the watches are live, so nothing created during
    /// the scan is missed.
    pub fn start(config: &Config) -> Result<Self, WatchError> {
        config.validate()?;
        let (index, bus) = Self::parts(config);
        let watcher = RecursiveWatcher::start(&config.watch, Self::sink(&index, &bus))?;
        Self::finish(index, bus, watcher)
    }

    /// Like [`start`](Self::start), with an explicit backend.
    pub fn start_with_source<S: RawEventSource>(
        config: &Config,
        source: S,
    ) -> Result<Self, WatchError> {
        config.validate()?;
        let (index, bus) = Self::parts(config);
        let watcher =
            RecursiveWatcher::start_with_source(source, &config.watch, Self::sink(&index, &bus))?;
        Self::finish(index, bus, watcher)
    }

    fn parts(config: &Config) -> (Arc<AssetIndex>, EventBus) {
        (
            Arc::new(AssetIndex::with_follow_links(config.watch.follow_links)),
            EventBus::new(&config.bus),
        )
    }

    fn sink(index: &Arc<AssetIndex>, bus: &EventBus) -> impl FnMut(FileEvent) + Send + 'static {
        let index = Arc::clone(index);
        let bus = bus.clone();
        move |event: FileEvent| {
            index.on_file_event(&event);
            bus.publish(&event);
        }
    }

    fn finish(
        index: Arc<AssetIndex>,
        bus: EventBus,
        watcher: RecursiveWatcher,
    ) -> Result<Self, WatchError> {
        let scan = index.initial_scan(watcher.root())?;
        info!(
            root = %watcher.root(),
            backend = watcher.backend(),
            assets = scan.total,
            "Agent session started"
        );

        Ok(Self {
            index,
            bus,
            watcher,
            scan,
        })
    }

    /// Returns the asset index.
    #[must_use]
    pub fn index(&self) -> &Arc<AssetIndex> {
        &self.index
    }

    /// Returns the event bus.
    #[must_use]
    pub const fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Registers a new event subscriber.
    pub fn subscribe(&self) -> Subscription {
        self.bus.subscribe()
    }

    /// Returns the canonical watched root.
    #[must_use]
    pub fn root(&self) -> &Utf8Path {
        self.watcher.root()
    }

    /// Returns the outcome of the initial scan.
    #[must_use]
    pub const fn initial_scan(&self) -> ScanSummary {
        self.scan
    }

    /// Returns a snapshot of the watcher counters.
    #[must_use]
    pub fn watcher_stats(&self) -> WatcherStats {
        self.watcher.stats()
    }

    /// Returns a snapshot of the bus counters.
    #[must_use]
    pub fn bus_stats(&self) -> BusStats {
        self.bus.stats()
    }

    /// Stops the watcher. The index stays queryable through any clones of
    /// [`index`](Self::index).
    pub fn stop(self) -> Result<(), WatchError> {
        let stats = self.watcher.stats();
        let bus = self.bus.stats();
        self.watcher.stop()?;
        info!(
            emitted = stats.emitted,
            published = bus.published,
            dropped = bus.dropped,
            assets = self.index.len(),
            "Agent session stopped"
        );
        Ok(())
    }
}
