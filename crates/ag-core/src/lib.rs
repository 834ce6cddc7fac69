//! Core types, errors, and utilities for asset-agent.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - [`Asset`] and [`AssetId`] - indexed regular files and their stable ids
//! - [`FileEvent`] and [`FileEventKind`] - normalized change notifications
//! - [`Config`] and its sections - watcher, backend and bus settings
//! - [`ConfigError`] - configuration loading and validation failures
//! - Type aliases for `FxHashMap`/`FxHashSet`
//!
//! # Crate Dependencies
//!
//! ```text
//! ag-cli ──► ag-watcher ──► ag-index ──► ag-core
//!                      └──► ag-bus ────►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod error;
pub mod hash;
pub mod types;

pub use config::{BackendKind, BusConfig, Config, WatchConfig};
pub use error::ConfigError;
pub use hash::{FxHashMap, FxHashSet, fx_hash_map, fx_hash_set, path_hash};
pub use types::{Asset, AssetId, FileEvent, FileEventKind, ParseAssetIdError};
