//! Asset types for tracking indexed files.

use std::fmt;
use std::fs::Metadata;
use std::str::FromStr;
use std::time::UNIX_EPOCH;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::hash::path_hash;

/// A stable identifier for an indexed file.
///
/// Derived from the Fx hash of the absolute path, so the same path always
/// maps to the same id. Collisions are not detected. Serialized as a decimal
/// string so that JavaScript consumers do not lose precision.
///
/// # Examples
///
/// ```
/// use ag_core::AssetId;
/// use camino::Utf8Path;
///
/// let id = AssetId::of_path(Utf8Path::new("/assets/rock.png"));
/// let parsed: AssetId = id.to_string().parse().unwrap();
/// assert_eq!(id, parsed);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct AssetId(u64);

impl AssetId {
    /// Creates an id from its raw value.
    #[inline]
    #[must_use]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// Derives the id for an absolute path.
    #[inline]
    #[must_use]
    pub fn of_path(path: &Utf8Path) -> Self {
        Self(path_hash(path))
    }

    /// Returns the raw hash value.
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Error returned when an asset id string is not a decimal `u64`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid asset id '{0}'")]
pub struct ParseAssetIdError(String);

impl FromStr for AssetId {
    type Err = ParseAssetIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| ParseAssetIdError(s.to_owned()))
    }
}

impl From<AssetId> for String {
    fn from(id: AssetId) -> Self {
        id.to_string()
    }
}

impl TryFrom<String> for AssetId {
    type Error = ParseAssetIdError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One indexed regular file and its cached metadata.
///
/// Metadata always comes from a filesystem stat taken when the asset was
/// indexed, never from the event that triggered indexing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Stable identifier derived from `path`.
    pub id: AssetId,

    /// Absolute path of the file.
    pub path: Utf8PathBuf,

    /// Extension including the leading dot (`".png"`), empty if none.
    #[serde(rename = "type")]
    pub file_type: String,

    /// Size in bytes.
    pub size: u64,

    /// Last write time in seconds since the Unix epoch.
    pub modified: u64,
}

impl Asset {
    /// Builds an asset from a path and its stat result.
    ///
    /// Returns `None` when the metadata does not describe a regular file;
    /// directories are never assets.
    #[must_use]
    pub fn from_metadata(path: &Utf8Path, metadata: &Metadata) -> Option<Self> {
        if !metadata.is_file() {
            return None;
        }

        let modified = metadata
            .modified()
            .ok()
            .and_then(|time| time.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |elapsed| elapsed.as_secs());

        Some(Self {
            id: AssetId::of_path(path),
            path: path.to_owned(),
            file_type: extension_label(path),
            size: metadata.len(),
            modified,
        })
    }

    /// Returns `true` if this asset lives at or beneath `dir`.
    #[inline]
    #[must_use]
    pub fn is_under(&self, dir: &Utf8Path) -> bool {
        self.path.starts_with(dir)
    }
}

fn extension_label(path: &Utf8Path) -> String {
    path.extension().map(|ext| format!(".{ext}")).unwrap_or_default()
}
