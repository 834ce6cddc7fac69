//! CLI entry point for the asset-agent watcher.
//!
//! This binary watches one asset folder, keeps an in-memory index of its
//! files, and streams every change as a JSON line on stdout.
//!
//! # Usage
//!
//! ```bash
//! asset-agent [OPTIONS] <COMMAND>
//!
//! # Stream change events until Ctrl-C
//! asset-agent --root ./assets watch
//!
//! # One-shot scan, assets printed as a JSON array
//! asset-agent --root ./assets scan --pretty
//!
//! # Settings from a file, root overridden by the environment
//! ASSET_AGENT_ROOT=/srv/assets asset-agent --config agent.json watch
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

use std::io::Write;

use ag_core::{BackendKind, Config};
use ag_index::AssetIndex;
use ag_watcher::AgentSession;
use camino::Utf8PathBuf;
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::eyre::{WrapErr, eyre};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// CLI ARGUMENT TYPES
// =============================================================================

/// Watches an asset folder and streams its changes.
#[derive(Parser)]
#[command(name = "asset-agent", version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Command to execute.
    #[command(subcommand)]
    command: Commands,

    /// Directory tree to watch.
    ///
    /// Overrides `watch.root` from the configuration file.
    #[arg(short, long, global = true, env = "ASSET_AGENT_ROOT")]
    root: Option<Utf8PathBuf>,

    /// JSON configuration file.
    #[arg(short, long, global = true, env = "ASSET_AGENT_CONFIG")]
    config: Option<Utf8PathBuf>,

    /// Notification backend.
    #[arg(long, global = true, value_enum)]
    backend: Option<BackendArg>,

    /// Idle sleep between backend polls, in milliseconds.
    #[arg(long, global = true)]
    poll_interval_ms: Option<u64>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Disable colored output.
    #[arg(long, global = true)]
    no_color: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Watch the root and print each change as one JSON line.
    Watch,

    /// Scan the root once and print every asset.
    Scan {
        /// Pretty-print the JSON output.
        #[arg(long)]
        pretty: bool,
    },
}

/// Backend choice on the command line.
#[derive(Clone, Copy, ValueEnum)]
enum BackendArg {
    /// inotify on Linux, `notify` elsewhere.
    Auto,
    /// Linux inotify.
    Inotify,
    /// The portable `notify` crate.
    Notify,
}

impl From<BackendArg> for BackendKind {
    fn from(arg: BackendArg) -> Self {
        match arg {
            BackendArg::Auto => Self::Auto,
            BackendArg::Inotify => Self::Inotify,
            BackendArg::Notify => Self::Notify,
        }
    }
}

// =============================================================================
// INITIALIZATION FUNCTIONS
// =============================================================================

/// Initializes the tracing subscriber for logging.
///
/// Respects the `RUST_LOG` environment variable if set. Otherwise, uses
/// `debug` level if `--verbose` is set, or `info` level by default.
/// Logs go to stderr so stdout carries only JSON.
fn init_tracing(verbose: bool, no_color: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = if verbose { "debug" } else { "info" };
        EnvFilter::new(format!("{level},notify=warn,mio=warn"))
    });

    // Check if colors should be disabled (flag or NO_COLOR env var)
    let use_ansi = !no_color && std::env::var("NO_COLOR").is_err();

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(use_ansi)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}

/// Builds a [`Config`] from the optional file plus CLI overrides.
///
/// # Errors
///
/// Returns an error if the file cannot be loaded or the result is invalid.
fn build_config(cli: &Cli) -> color_eyre::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .wrap_err_with(|| format!("Failed to load configuration from {path}"))?,
        None => Config::default(),
    };

    if let Some(root) = &cli.root {
        config.watch.root.clone_from(root);
    }
    if let Some(backend) = cli.backend {
        config.watch.backend = backend.into();
    }
    if let Some(poll_interval_ms) = cli.poll_interval_ms {
        config.watch.poll_interval_ms = poll_interval_ms;
    }

    config.validate()?;
    Ok(config)
}

// =============================================================================
// COMMAND IMPLEMENTATIONS
// =============================================================================

/// Runs a one-shot scan and prints the assets as a JSON array.
///
/// # Errors
///
/// Returns an error if the root cannot be scanned or stdout fails.
fn run_scan(config: &Config, pretty: bool) -> color_eyre::Result<()> {
    let root = &config.watch.root;
    if !root.is_dir() {
        return Err(eyre!("Root is not a directory: {root}"));
    }
    let root = root
        .canonicalize_utf8()
        .wrap_err_with(|| format!("Failed to resolve {root}"))?;

    let index = AssetIndex::with_follow_links(config.watch.follow_links);
    let summary = index.initial_scan(&root)?;

    let mut assets = index.list_assets();
    assets.sort_by(|a, b| a.path.cmp(&b.path));

    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    if pretty {
        serde_json::to_writer_pretty(&mut handle, &assets)?;
    } else {
        serde_json::to_writer(&mut handle, &assets)?;
    }
    writeln!(handle)?;

    info!(
        indexed = summary.indexed,
        skipped = summary.skipped,
        elapsed_ms = summary.elapsed_ms,
        "Scan finished"
    );
    Ok(())
}

/// Runs a watch session, printing events until interrupted.
///
/// # Errors
///
/// Returns an error if the session cannot start, stdout fails, or the
/// watcher stops with an error.
async fn run_watch(config: Config) -> color_eyre::Result<()> {
    let session = AgentSession::start(&config)?;
    let mut events = session.subscribe();
    info!(
        root = %session.root(),
        assets = session.index().len(),
        "Watching for changes (Ctrl-C to stop)"
    );

    let stdout = std::io::stdout();

    // Handle SIGTERM for graceful shutdown on Unix
    #[cfg(unix)]
    let mut sigterm = {
        use tokio::signal::unix::{SignalKind, signal};
        signal(SignalKind::terminate())?
    };

    loop {
        #[cfg(unix)]
        let terminate = sigterm.recv();
        #[cfg(not(unix))]
        let terminate = std::future::pending::<Option<()>>();

        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                let mut handle = stdout.lock();
                serde_json::to_writer(&mut handle, &event)?;
                writeln!(handle)?;
                handle.flush()?;
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl-C, shutting down");
                break;
            }
            _ = terminate => {
                info!("Received SIGTERM, shutting down");
                break;
            }
        }
    }

    let watcher = session.watcher_stats();
    let bus = session.bus_stats();
    drop(events);
    session.stop()?;

    info!(
        emitted = watcher.emitted,
        unresolved = watcher.unresolved,
        watch_failures = watcher.watch_failures,
        overflows = watcher.overflows,
        degraded_renames = watcher.degraded_renames,
        dropped = bus.dropped,
        "Session statistics"
    );
    Ok(())
}

// =============================================================================
// MAIN ENTRY POINT
// =============================================================================

/// Application entry point.
#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    // 1. Install color-eyre FIRST (before any potential panics)
    color_eyre::install()?;

    // 2. Parse CLI arguments
    let cli = Cli::parse();

    // 3. Initialize tracing (handles --no-color for log output)
    init_tracing(cli.verbose, cli.no_color);

    // 4. Route to appropriate command
    let config = build_config(&cli)?;
    match &cli.command {
        Commands::Watch => run_watch(config).await,
        Commands::Scan { pretty } => run_scan(&config, *pretty),
    }
}
