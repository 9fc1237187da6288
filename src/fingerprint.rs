//! Content fingerprinting (component C2).
//!
//! A fingerprint is a pure function of file content at the moment of
//! reading — it never consults mtime or size. Two variants exist and only
//! one is active per run, selected by [`crate::config::HashMode`].

use sha2::{Digest, Sha256};
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const FAST_WHOLE_FILE_LIMIT: u64 = 256 * 1024;
const FAST_EDGE_SIZE: usize = 128 * 1024;
const STRONG_CHUNK_SIZE: usize = 64 * 1024;

const FNV_OFFSET_BASIS: u64 = 0xcbf29ce484222325;
const FNV_PRIME: u64 = 0x100000001b3;

/// A content fingerprint, or the absent value described in §3: an absent
/// fingerprint never compares equal to anything, including another absent
/// fingerprint, so it is not representable as plain byte equality — callers
/// must check [`Fingerprint::is_present`] before relying on `==`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Fingerprint {
    Fast(u64),
    Strong([u8; 32]),
    Absent,
}

impl Fingerprint {
    pub fn is_present(&self) -> bool {
        !matches!(self, Fingerprint::Absent)
    }

    /// Identity comparison that honors absent-never-equals-absent, unlike
    /// the derived `PartialEq` (kept for map keys where exact variant match
    /// is what's wanted, e.g. indexing).
    pub fn matches(&self, other: &Fingerprint) -> bool {
        match (self, other) {
            (Fingerprint::Absent, _) | (_, Fingerprint::Absent) => false,
            (a, b) => a == b,
        }
    }

    pub fn to_hex(&self) -> String {
        match self {
            Fingerprint::Fast(v) => format!("{:016x}", v),
            Fingerprint::Strong(bytes) => bytes.iter().map(|b| format!("{:02x}", b)).collect(),
            Fingerprint::Absent => String::from("-"),
        }
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hash = FNV_OFFSET_BASIS;
    for &byte in data {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(FNV_PRIME);
    }
    hash
}

/// Compute the fingerprint of `path` under `mode`. I/O errors, empty files,
/// and (for fast mode on a file that happens to be empty) degenerate
/// content all collapse to [`Fingerprint::Absent`] — fingerprint-unavailable
/// is not an error in itself, it just removes the file from move
/// consideration.
pub fn fingerprint(path: &Path, mode: crate::config::HashMode) -> Fingerprint {
    match mode {
        crate::config::HashMode::Fast => fingerprint_fast(path).unwrap_or(Fingerprint::Absent),
        crate::config::HashMode::Strong => {
            fingerprint_strong(path).unwrap_or(Fingerprint::Absent)
        }
    }
}

fn fingerprint_fast(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(Fingerprint::Absent);
    }
    if len <= FAST_WHOLE_FILE_LIMIT {
        let mut buf = Vec::with_capacity(len as usize);
        file.read_to_end(&mut buf)?;
        return Ok(Fingerprint::Fast(fnv1a(&buf)));
    }

    let mut head = vec![0u8; FAST_EDGE_SIZE];
    file.read_exact(&mut head)?;

    use std::io::{Seek, SeekFrom};
    file.seek(SeekFrom::End(-(FAST_EDGE_SIZE as i64)))?;
    let mut tail = vec![0u8; FAST_EDGE_SIZE];
    file.read_exact(&mut tail)?;

    let mut combined = head;
    combined.extend_from_slice(&tail);
    Ok(Fingerprint::Fast(fnv1a(&combined)))
}

fn fingerprint_strong(path: &Path) -> io::Result<Fingerprint> {
    let mut file = File::open(path)?;
    if file.metadata()?.len() == 0 {
        return Ok(Fingerprint::Absent);
    }
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; STRONG_CHUNK_SIZE];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    let digest = hasher.finalize();
    let mut out = [0u8; 32];
    out.copy_from_slice(&digest);
    Ok(Fingerprint::Strong(out))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HashMode;
    use std::io::Write;

    fn write_tmp(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(contents).unwrap();
        f.flush().unwrap();
        f
    }

    #[test]
    fn empty_file_is_absent_in_both_modes() {
        let f = write_tmp(b"");
        assert_eq!(fingerprint(f.path(), HashMode::Fast), Fingerprint::Absent);
        assert_eq!(fingerprint(f.path(), HashMode::Strong), Fingerprint::Absent);
    }

    #[test]
    fn absent_never_matches_absent() {
        assert!(!Fingerprint::Absent.matches(&Fingerprint::Absent));
    }

    #[test]
    fn identical_content_same_fingerprint_strong() {
        let a = write_tmp(b"hello world");
        let b = write_tmp(b"hello world");
        let fa = fingerprint(a.path(), HashMode::Strong);
        let fb = fingerprint(b.path(), HashMode::Strong);
        assert!(fa.matches(&fb));
    }

    #[test]
    fn different_content_different_fingerprint_fast() {
        let a = write_tmp(b"hello world");
        let b = write_tmp(b"goodbye world");
        let fa = fingerprint(a.path(), HashMode::Fast);
        let fb = fingerprint(b.path(), HashMode::Fast);
        assert!(!fa.matches(&fb));
    }

    #[test]
    fn large_file_uses_head_and_tail() {
        let mut contents = vec![0u8; (FAST_WHOLE_FILE_LIMIT as usize) + 1024];
        contents[0] = 1;
        *contents.last_mut().unwrap() = 2;
        let f = write_tmp(&contents);
        let fp = fingerprint(f.path(), HashMode::Fast);
        assert!(fp.is_present());

        let mut middle_changed = contents.clone();
        let mid = middle_changed.len() / 2;
        middle_changed[mid] = middle_changed[mid].wrapping_add(1);
        let g = write_tmp(&middle_changed);
        let fp2 = fingerprint(g.path(), HashMode::Fast);
        assert!(fp.matches(&fp2), "fast mode ignores middle-byte changes on large files");
    }

    #[test]
    fn missing_file_is_absent() {
        let fp = fingerprint(Path::new("/nonexistent/does/not/exist"), HashMode::Strong);
        assert_eq!(fp, Fingerprint::Absent);
    }
}
