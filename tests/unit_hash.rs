//! Unit tests for content fingerprinting.

use driftsync::config::HashMode;
use driftsync::fingerprint::{fingerprint, Fingerprint};
use std::io::Write;
use tempfile::NamedTempFile;

fn write_temp(data: &[u8]) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(data).unwrap();
    f.flush().unwrap();
    f
}

#[test]
fn fast_mode_is_consistent_across_calls() {
    let f = write_temp(b"The quick brown fox jumps over the lazy dog");
    let a = fingerprint(f.path(), HashMode::Fast);
    let b = fingerprint(f.path(), HashMode::Fast);
    assert_eq!(a, b);
}

#[test]
fn strong_mode_is_consistent_across_calls() {
    let f = write_temp(b"The quick brown fox jumps over the lazy dog");
    let a = fingerprint(f.path(), HashMode::Strong);
    let b = fingerprint(f.path(), HashMode::Strong);
    assert_eq!(a, b);
}

#[test]
fn different_content_yields_different_fingerprints() {
    let a = write_temp(b"foo");
    let b = write_temp(b"bar");
    assert_ne!(
        fingerprint(a.path(), HashMode::Strong),
        fingerprint(b.path(), HashMode::Strong)
    );
    assert_ne!(
        fingerprint(a.path(), HashMode::Fast),
        fingerprint(b.path(), HashMode::Fast)
    );
}

#[test]
fn single_byte_difference_changes_the_fingerprint() {
    let a = write_temp(b"test");
    let b = write_temp(b"Test");
    let c = write_temp(b"test ");
    assert_ne!(fingerprint(a.path(), HashMode::Strong), fingerprint(b.path(), HashMode::Strong));
    assert_ne!(fingerprint(a.path(), HashMode::Strong), fingerprint(c.path(), HashMode::Strong));
}

#[test]
fn missing_file_is_absent_and_never_matches() {
    let fp = fingerprint(std::path::Path::new("/nonexistent/path/does-not-exist"), HashMode::Strong);
    assert!(matches!(fp, Fingerprint::Absent));
    assert!(!fp.matches(&fp));
}

#[test]
fn empty_file_is_absent_in_both_modes() {
    let f = NamedTempFile::new().unwrap();
    assert!(matches!(fingerprint(f.path(), HashMode::Fast), Fingerprint::Absent));
    assert!(matches!(fingerprint(f.path(), HashMode::Strong), Fingerprint::Absent));
}

#[test]
fn strong_fingerprint_is_32_bytes_of_hex() {
    let f = write_temp(b"test data");
    let fp = fingerprint(f.path(), HashMode::Strong);
    let hex = fp.to_hex();
    assert_eq!(hex.len(), 64);
    assert!(hex.chars().all(|c| c.is_ascii_hexdigit() && !c.is_uppercase()));
}

#[test]
fn large_file_still_fingerprints_consistently_in_fast_mode() {
    let mut f = NamedTempFile::new().unwrap();
    let chunk = vec![0x42u8; 1024 * 1024];
    for _ in 0..2 {
        f.write_all(&chunk).unwrap();
    }
    f.flush().unwrap();

    let a = fingerprint(f.path(), HashMode::Fast);
    let b = fingerprint(f.path(), HashMode::Fast);
    assert_eq!(a, b);
}

#[test]
fn head_and_tail_change_detected_in_fast_mode() {
    // A large file where only a middle byte changes should still fingerprint
    // identically in fast mode (only head/tail are sampled), while strong
    // mode catches the difference.
    let base = vec![0xABu8; 512 * 1024];
    let mut modified = base.clone();
    modified[256 * 1024] ^= 0xFF;

    let mut f1 = NamedTempFile::new().unwrap();
    f1.write_all(&base).unwrap();
    f1.flush().unwrap();

    let mut f2 = NamedTempFile::new().unwrap();
    f2.write_all(&modified).unwrap();
    f2.flush().unwrap();

    assert_eq!(fingerprint(f1.path(), HashMode::Fast), fingerprint(f2.path(), HashMode::Fast));
    assert_ne!(fingerprint(f1.path(), HashMode::Strong), fingerprint(f2.path(), HashMode::Strong));
}
