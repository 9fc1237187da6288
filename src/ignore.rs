//! Source-side ignore list and its projection onto the destination (C3).

use crate::path;
use std::path::{Path, PathBuf};

/// An ordered list of source-side paths. Order doesn't affect matching (any
/// entry containing the candidate is sufficient) but is kept because the
/// configuration record preserves the order the user supplied it in.
pub struct IgnoreMatcher {
    entries: Vec<String>,
}

impl IgnoreMatcher {
    pub fn new(entries: &[PathBuf]) -> Self {
        IgnoreMatcher {
            entries: entries.iter().map(|p| path::normalize(p)).collect(),
        }
    }

    /// `p` is under any ignore entry.
    pub fn source_ignored(&self, p: &Path) -> bool {
        let norm = path::normalize(p);
        self.entries
            .iter()
            .any(|e| path::is_under_normalized(e, &norm))
    }

    /// Project an ignore decision from the destination side: compute `rel =
    /// relative(dst_root, dst_entry)` and test `source_ignored(src_root /
    /// rel)`.
    pub fn dest_equivalent_ignored(&self, dst_root: &Path, dst_entry: &Path, src_root: &Path) -> bool {
        match path::relative(dst_root, dst_entry) {
            Some(rel) => self.source_ignored(&src_root.join(rel)),
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_exact_and_nested() {
        let m = IgnoreMatcher::new(&[PathBuf::from("/src/secrets")]);
        assert!(m.source_ignored(Path::new("/src/secrets")));
        assert!(m.source_ignored(Path::new("/src/secrets/pw")));
        assert!(!m.source_ignored(Path::new("/src/secretsbutnotreally")));
        assert!(!m.source_ignored(Path::new("/src/public")));
    }

    #[test]
    fn dest_projection() {
        let m = IgnoreMatcher::new(&[PathBuf::from("/src/secrets")]);
        assert!(m.dest_equivalent_ignored(
            Path::new("/dst"),
            Path::new("/dst/secrets/pw"),
            Path::new("/src"),
        ));
        assert!(!m.dest_equivalent_ignored(
            Path::new("/dst"),
            Path::new("/dst/public/a.txt"),
            Path::new("/src"),
        ));
    }

    #[test]
    fn empty_ignore_list_ignores_nothing() {
        let m = IgnoreMatcher::new(&[]);
        assert!(!m.source_ignored(Path::new("/anything")));
    }
}
