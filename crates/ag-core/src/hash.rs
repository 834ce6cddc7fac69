//! Fx hash map aliases and path hashing.
//!
//! The Fx hash function is unseeded, so it produces the same value for the
//! same input in every process. That makes it suitable both for internal maps
//! and for deriving [`AssetId`](crate::AssetId)s that stay stable across
//! restarts.
//!
//! # Examples
//!
//! ```
//! use ag_core::{FxHashMap, fx_hash_map, path_hash};
//! use camino::Utf8Path;
//!
//! let mut map: FxHashMap<&str, i32> = fx_hash_map();
//! map.insert("key", 42);
//!
//! let a = path_hash(Utf8Path::new("/assets/a.png"));
//! assert_eq!(a, path_hash(Utf8Path::new("/assets/a.png")));
//! ```

use std::hash::{Hash, Hasher};

use camino::Utf8Path;

/// A [`HashMap`](std::collections::HashMap) using the Fx hash algorithm.
pub type FxHashMap<K, V> = rustc_hash::FxHashMap<K, V>;

/// A [`HashSet`](std::collections::HashSet) using the Fx hash algorithm.
pub type FxHashSet<V> = rustc_hash::FxHashSet<V>;

/// Creates a new empty [`FxHashMap`].
#[inline]
#[must_use]
pub fn fx_hash_map<K, V>() -> FxHashMap<K, V> {
    FxHashMap::default()
}

/// Creates a new empty [`FxHashSet`].
#[inline]
#[must_use]
pub fn fx_hash_set<V>() -> FxHashSet<V> {
    FxHashSet::default()
}

/// Hashes a path's UTF-8 representation with [`rustc_hash::FxHasher`].
///
/// Two spellings of the same file (`/a/./b` and `/a/b`) hash differently;
/// callers are expected to pass the absolute paths produced by the watcher
/// and the walker, which are already normalized.
#[must_use]
pub fn path_hash(path: &Utf8Path) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    path.as_str().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fx_hash_map_operations() {
        let mut map: FxHashMap<&str, i32> = fx_hash_map();
        map.insert("one", 1);
        map.insert("two", 2);
        assert_eq!(map.get("one"), Some(&1));
        assert_eq!(map.get("three"), None);
    }

    #[test]
    fn test_fx_hash_set_operations() {
        let mut set: FxHashSet<&str> = fx_hash_set();
        set.insert("one");
        assert!(set.contains("one"));
        assert!(!set.contains("two"));
    }

    #[test]
    fn test_path_hash_is_deterministic() {
        let path = Utf8Path::new("/home/user/Assets/tree.fbx");
        assert_eq!(path_hash(path), path_hash(path));
    }

    #[test]
    fn test_path_hash_distinguishes_paths() {
        let a = path_hash(Utf8Path::new("/root/a.txt"));
        let b = path_hash(Utf8Path::new("/root/b.txt"));
        assert_ne!(a, b);
    }
}
