//! Domain types for asset-agent.
//!
//! - [`asset`] - indexed files and their identifiers
//! - [`event`] - normalized change notifications
//!
//! All public types are re-exported at the crate root:
//!
//! ```
//! use ag_core::{Asset, AssetId, FileEvent, FileEventKind};
//! ```

mod asset;
mod event;

pub use asset::{Asset, AssetId, ParseAssetIdError};
pub use event::{FileEvent, FileEventKind};
