//! The destination fingerprint index (C4): a multimap from fingerprint to
//! the set of destination paths currently holding that content.
//!
//! Only built under strong hashing — see the rationale on
//! [`crate::driver`]'s index-build step. With fast hashing the move detector
//! never consults an index at all.

use crate::fingerprint::Fingerprint;
use crate::path;
use ahash::AHashMap;
use std::path::{Path, PathBuf};

#[derive(Default)]
pub struct DestinationIndex {
    // Keyed on the byte-identity of the fingerprint (never `Absent`, which
    // is filtered out at insertion).
    by_fingerprint: AHashMap<Fingerprint, Vec<PathBuf>>,
}

impl DestinationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Absent fingerprints are never indexed — an absent fingerprint must
    /// never equal another absent one, so indexing it would make every
    /// unreadable/empty file a spurious move candidate for every other one.
    pub fn insert(&mut self, fp: Fingerprint, path: PathBuf) {
        if !fp.is_present() {
            return;
        }
        self.by_fingerprint.entry(fp).or_default().push(path);
    }

    pub fn find(&self, fp: &Fingerprint) -> impl Iterator<Item = &PathBuf> {
        self.by_fingerprint
            .get(fp)
            .into_iter()
            .flat_map(|v| v.iter())
    }

    pub fn remove(&mut self, fp: &Fingerprint, path: &Path) {
        if let Some(paths) = self.by_fingerprint.get_mut(fp) {
            let norm = path::normalize(path);
            paths.retain(|p| path::normalize(p) != norm);
            if paths.is_empty() {
                self.by_fingerprint.remove(fp);
            }
        }
    }

    /// Remove every entry whose path is under `dir`, used after a
    /// directory-level move consumes an entire subtree at once.
    pub fn remove_subtree(&mut self, dir: &Path) {
        let dir_norm = path::normalize(dir);
        self.by_fingerprint.retain(|_, paths| {
            paths.retain(|p| !path::is_under(Path::new(&dir_norm), p));
            !paths.is_empty()
        });
    }

    pub fn len(&self) -> usize {
        self.by_fingerprint.values().map(|v| v.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.by_fingerprint.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fp(n: u64) -> Fingerprint {
        Fingerprint::Fast(n)
    }

    #[test]
    fn absent_fingerprints_are_not_indexed() {
        let mut idx = DestinationIndex::new();
        idx.insert(Fingerprint::Absent, PathBuf::from("/d/a"));
        assert!(idx.is_empty());
    }

    #[test]
    fn find_returns_all_paths_for_a_fingerprint() {
        let mut idx = DestinationIndex::new();
        idx.insert(fp(1), PathBuf::from("/d/a"));
        idx.insert(fp(1), PathBuf::from("/d/b"));
        let found: Vec<_> = idx.find(&fp(1)).cloned().collect();
        assert_eq!(found.len(), 2);
    }

    #[test]
    fn remove_drops_single_entry() {
        let mut idx = DestinationIndex::new();
        idx.insert(fp(1), PathBuf::from("/d/a"));
        idx.insert(fp(1), PathBuf::from("/d/b"));
        idx.remove(&fp(1), Path::new("/d/a"));
        let found: Vec<_> = idx.find(&fp(1)).cloned().collect();
        assert_eq!(found, vec![PathBuf::from("/d/b")]);
    }

    #[test]
    fn remove_subtree_clears_nested_entries() {
        let mut idx = DestinationIndex::new();
        idx.insert(fp(1), PathBuf::from("/d/sub/a"));
        idx.insert(fp(2), PathBuf::from("/d/other/b"));
        idx.remove_subtree(Path::new("/d/sub"));
        assert!(idx.find(&fp(1)).next().is_none());
        assert!(idx.find(&fp(2)).next().is_some());
    }

    #[test]
    fn len_counts_all_paths_not_just_keys() {
        let mut idx = DestinationIndex::new();
        idx.insert(fp(1), PathBuf::from("/d/a"));
        idx.insert(fp(1), PathBuf::from("/d/b"));
        idx.insert(fp(2), PathBuf::from("/d/c"));
        assert_eq!(idx.len(), 3);
    }
}
