//! Bidirectional mapping between watch handles and directory paths.
//!
//! [`WatchTable`] is a bijection: every handle maps to exactly one path and
//! every path to exactly one handle. Inserting a pair evicts any stale
//! pairing of either side, which is what re-homes a handle when the OS
//! re-issues it for a directory that moved.

use std::hash::Hash;

use ag_core::{FxHashMap, fx_hash_map};
use camino::{Utf8Path, Utf8PathBuf};

/// Handle ↔ path bijection for installed watches.
#[derive(Debug, Clone)]
pub struct WatchTable<H> {
    by_handle: FxHashMap<H, Utf8PathBuf>,
    by_path: FxHashMap<Utf8PathBuf, H>,
}

impl<H> Default for WatchTable<H> {
    fn default() -> Self {
        Self {
            by_handle: fx_hash_map(),
            by_path: fx_hash_map(),
        }
    }
}

impl<H: Clone + Eq + Hash> WatchTable<H> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records that `handle` watches `path`.
    ///
    /// Returns the path `handle` previously watched, if it differed.
    pub fn insert(&mut self, handle: H, path: Utf8PathBuf) -> Option<Utf8PathBuf> {
        let previous = self.by_handle.remove(&handle);
        if let Some(old_path) = &previous {
            self.by_path.remove(old_path);
        }
        if let Some(old_handle) = self.by_path.remove(&path) {
            self.by_handle.remove(&old_handle);
        }

        self.by_path.insert(path.clone(), handle.clone());
        self.by_handle.insert(handle, path.clone());
        previous.filter(|old| *old != path)
    }

    /// Returns the directory watched by `handle`.
    #[must_use]
    pub fn path_of(&self, handle: &H) -> Option<&Utf8Path> {
        self.by_handle.get(handle).map(Utf8PathBuf::as_path)
    }

    /// Returns the handle watching `path`.
    #[must_use]
    pub fn handle_of(&self, path: &Utf8Path) -> Option<&H> {
        self.by_path.get(path)
    }

    /// Returns `true` if `handle` is installed.
    #[must_use]
    pub fn contains_handle(&self, handle: &H) -> bool {
        self.by_handle.contains_key(handle)
    }

    /// Removes the entry for `handle`, returning its path.
    pub fn remove_handle(&mut self, handle: &H) -> Option<Utf8PathBuf> {
        let path = self.by_handle.remove(handle)?;
        self.by_path.remove(&path);
        Some(path)
    }

    /// Removes `prefix` and every entry beneath it.
    ///
    /// Matching is component-wise: removing `/a/b` leaves `/a/bc`.
    pub fn remove_subtree(&mut self, prefix: &Utf8Path) -> Vec<(H, Utf8PathBuf)> {
        let doomed: Vec<Utf8PathBuf> = self
            .by_path
            .keys()
            .filter(|path| path.starts_with(prefix))
            .cloned()
            .collect();

        doomed
            .into_iter()
            .filter_map(|path| {
                let handle = self.by_path.remove(&path)?;
                self.by_handle.remove(&handle);
                Some((handle, path))
            })
            .collect()
    }

    /// Iterates over all `(handle, path)` pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&H, &Utf8Path)> {
        self.by_handle.iter().map(|(h, p)| (h, p.as_path()))
    }

    /// Returns the number of installed watches.
    #[must_use]
    pub fn len(&self) -> usize {
        self.by_handle.len()
    }

    /// Returns `true` if no watches are installed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_handle.is_empty()
    }

    /// Removes every entry, returning the handles.
    pub fn drain(&mut self) -> Vec<H> {
        self.by_path.clear();
        self.by_handle.drain().map(|(h, _)| h).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_bijective(table: &WatchTable<u32>) {
        assert_eq!(table.by_handle.len(), table.by_path.len());
        for (handle, path) in table.iter() {
            assert_eq!(table.handle_of(path), Some(handle));
        }
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut table = WatchTable::new();
        assert!(table.insert(1, Utf8PathBuf::from("/r")).is_none());
        table.insert(2, Utf8PathBuf::from("/r/a"));

        assert_eq!(table.path_of(&2), Some(Utf8Path::new("/r/a")));
        assert_eq!(table.handle_of(Utf8Path::new("/r")), Some(&1));
        assert_eq!(table.len(), 2);
        assert_bijective(&table);
    }

    #[test]
    fn test_reinsert_handle_rehomes() {
        let mut table = WatchTable::new();
        table.insert(5, Utf8PathBuf::from("/r/dir"));

        let previous = table.insert(5, Utf8PathBuf::from("/r/dir2"));

        assert_eq!(previous.as_deref(), Some(Utf8Path::new("/r/dir")));
        assert!(table.handle_of(Utf8Path::new("/r/dir")).is_none());
        assert_eq!(table.path_of(&5), Some(Utf8Path::new("/r/dir2")));
        assert_eq!(table.len(), 1);
        assert_bijective(&table);
    }

    #[test]
    fn test_reinsert_path_evicts_old_handle() {
        let mut table = WatchTable::new();
        table.insert(1, Utf8PathBuf::from("/r/x"));
        table.insert(2, Utf8PathBuf::from("/r/x"));

        assert!(!table.contains_handle(&1));
        assert_eq!(table.handle_of(Utf8Path::new("/r/x")), Some(&2));
        assert_bijective(&table);
    }

    #[test]
    fn test_same_pair_is_not_reported_as_previous() {
        let mut table = WatchTable::new();
        table.insert(1, Utf8PathBuf::from("/r"));
        assert!(table.insert(1, Utf8PathBuf::from("/r")).is_none());
    }

    #[test]
    fn test_remove_subtree_is_component_wise() {
        let mut table = WatchTable::new();
        table.insert(1, Utf8PathBuf::from("/r"));
        table.insert(2, Utf8PathBuf::from("/r/a"));
        table.insert(3, Utf8PathBuf::from("/r/a/b"));
        table.insert(4, Utf8PathBuf::from("/r/ab"));

        let mut removed = table.remove_subtree(Utf8Path::new("/r/a"));
        removed.sort();

        assert_eq!(
            removed,
            vec![
                (2, Utf8PathBuf::from("/r/a")),
                (3, Utf8PathBuf::from("/r/a/b")),
            ]
        );
        assert!(table.contains_handle(&4));
        assert_eq!(table.len(), 2);
        assert_bijective(&table);
    }

    #[test]
    fn test_remove_handle() {
        let mut table = WatchTable::new();
        table.insert(1, Utf8PathBuf::from("/r"));
        table.insert(2, Utf8PathBuf::from("/r/a"));

        assert_eq!(table.remove_handle(&1).as_deref(), Some(Utf8Path::new("/r")));
        assert!(table.remove_handle(&1).is_none());
        assert!(table.handle_of(Utf8Path::new("/r")).is_none());
        assert_eq!(table.len(), 1);
        assert_bijective(&table);
    }

    #[test]
    fn test_drain() {
        let mut table = WatchTable::new();
        table.insert(1, Utf8PathBuf::from("/r"));
        table.insert(2, Utf8PathBuf::from("/r/a"));

        let mut handles = table.drain();
        handles.sort_unstable();
        assert_eq!(handles, vec![1, 2]);
        assert!(table.is_empty());
    }
}
