//! Crash-safe file I/O: streaming copy, atomic replace, and the write-ahead
//! journal that lets an interrupted run clean up after itself.

use crate::fingerprint::Fingerprint;
use sha2::{Digest, Sha256};
use std::fs::{self, File, Metadata};
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::SystemTime;
use thiserror::Error;

const COPY_BUFFER_SIZE: usize = 256 * 1024;

/// Temp directory name, nested inside the destination root.
pub const DRIFT_TEMP_DIR: &str = ".drift-tmp";

/// Write-ahead journal file name, nested inside the destination root.
pub const DRIFT_JOURNAL_FILE: &str = ".drift-journal";

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

#[derive(Error, Debug)]
pub enum IoError {
    #[error("failed to copy file: {0}")]
    CopyFailed(String),
    #[error("failed to set metadata: {0}")]
    MetadataFailed(String),
    #[error("failed to remove file: {0}")]
    RemoveFailed(String),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

fn copy_file_streaming(source: &Path, dest: &Path) -> io::Result<()> {
    let source_file = File::open(source)?;
    let dest_file = File::create(dest)?;

    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, source_file);
    let mut writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, dest_file);

    io::copy(&mut reader, &mut writer)?;

    writer.flush()?;
    writer.into_inner()?.sync_all()?;

    Ok(())
}

pub fn copy_file_with_metadata(source: &Path, dest: &Path, preserve_timestamps: bool) -> io::Result<()> {
    let metadata = fs::metadata(source)?;

    copy_file_streaming(source, dest)?;

    if preserve_timestamps {
        set_file_mtime(dest, metadata.modified()?)?;
    }

    #[cfg(unix)]
    {
        set_file_permissions(dest, &metadata)?;
    }

    Ok(())
}

pub fn set_file_mtime(path: &Path, mtime: SystemTime) -> io::Result<()> {
    let file = File::open(path)?;
    file.set_modified(mtime)?;
    Ok(())
}

#[cfg(unix)]
pub fn set_file_permissions(path: &Path, metadata: &Metadata) -> io::Result<()> {
    let permissions = metadata.permissions();
    fs::set_permissions(path, permissions)?;
    Ok(())
}

/// Remove a file, treating "already gone" as success.
pub fn remove_file_safe(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

pub fn remove_dir_recursive(path: &Path) -> io::Result<()> {
    if !path.exists() {
        return Ok(());
    }
    fs::remove_dir_all(path)
}

/// Recursively copy a directory tree, used as the cross-device fallback for
/// a directory-level move (rename fails, so copy then delete the source).
pub fn copy_dir_recursive(source: &Path, dest: &Path) -> io::Result<()> {
    ensure_directory(dest)?;
    for entry in fs::read_dir(source)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let src_path = entry.path();
        let dst_path = dest.join(entry.file_name());

        if file_type.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
        } else if file_type.is_symlink() {
            recreate_symlink(&src_path, &dst_path)?;
        } else {
            copy_file_with_metadata(&src_path, &dst_path, true)?;
        }
    }
    Ok(())
}

/// Rename `source` to `dest`, falling back to a recursive copy-then-delete
/// when the rename fails (typically a cross-device move). Cross-device
/// rename failure is not treated as an error by the caller — it's a
/// transparent downgrade.
pub fn rename_or_copy(source: &Path, dest: &Path) -> io::Result<()> {
    match fs::rename(source, dest) {
        Ok(()) => Ok(()),
        Err(_) => {
            if source.is_dir() {
                copy_dir_recursive(source, dest)?;
                remove_dir_recursive(source)?;
            } else {
                copy_file_with_metadata(source, dest, true)?;
                remove_file_safe(source)?;
            }
            Ok(())
        }
    }
}

/// Recreate a symlink at `dest` pointing at the same target as `source`.
/// Symlinks are opaque: their target's content is never read or copied.
pub fn recreate_symlink(source: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(source)?;
    if let Some(parent) = dest.parent() {
        ensure_directory(parent)?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(&target, dest)
    }
    #[cfg(windows)]
    {
        if target.is_dir() {
            std::os::windows::fs::symlink_dir(&target, dest)
        } else {
            std::os::windows::fs::symlink_file(&target, dest)
        }
    }
}

pub fn verify_files_identical(path1: &Path, path2: &Path) -> io::Result<bool> {
    let meta1 = fs::metadata(path1)?;
    let meta2 = fs::metadata(path2)?;

    if meta1.len() != meta2.len() {
        return Ok(false);
    }

    let file1 = File::open(path1)?;
    let file2 = File::open(path2)?;

    let mut reader1 = BufReader::with_capacity(COPY_BUFFER_SIZE, file1);
    let mut reader2 = BufReader::with_capacity(COPY_BUFFER_SIZE, file2);

    let mut buffer1 = vec![0u8; COPY_BUFFER_SIZE];
    let mut buffer2 = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let bytes_read1 = reader1.read(&mut buffer1)?;
        let bytes_read2 = reader2.read(&mut buffer2)?;

        if bytes_read1 != bytes_read2 {
            return Ok(false);
        }
        if bytes_read1 == 0 {
            break;
        }
        if buffer1[..bytes_read1] != buffer2[..bytes_read2] {
            return Ok(false);
        }
    }

    Ok(true)
}

pub fn directory_size(path: &Path) -> io::Result<u64> {
    let mut total = 0u64;

    if path.is_file() {
        return Ok(fs::metadata(path)?.len());
    }

    for entry in fs::read_dir(path)? {
        let entry = entry?;
        let metadata = entry.metadata()?;

        if metadata.is_file() {
            total += metadata.len();
        } else if metadata.is_dir() {
            total += directory_size(&entry.path())?;
        }
    }

    Ok(total)
}

pub fn ensure_directory(path: &Path) -> io::Result<()> {
    if path.exists() {
        if !path.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                format!("path exists but is not a directory: {}", path.display()),
            ));
        }
        return Ok(());
    }

    fs::create_dir_all(path)
}

/// Generate a unique temp file path within `temp_dir`: `{pid}-{counter}.tmp`.
pub fn generate_temp_path(temp_dir: &Path) -> PathBuf {
    let pid = std::process::id();
    let counter = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    temp_dir.join(format!("{pid}-{counter}.tmp"))
}

/// Crash-safe atomic file writer: writes to a temp file, fsyncs, then
/// atomically renames onto the destination. Dropped without commit, the
/// temp file is cleaned up.
pub struct AtomicWriter {
    temp_path: PathBuf,
    final_path: PathBuf,
    writer: BufWriter<File>,
    hasher: Option<Sha256>,
    committed: bool,
}

impl AtomicWriter {
    pub fn new(temp_path: PathBuf, final_path: PathBuf, verify: bool) -> io::Result<Self> {
        let file = File::create(&temp_path)?;
        let writer = BufWriter::with_capacity(COPY_BUFFER_SIZE, file);
        let hasher = if verify { Some(Sha256::new()) } else { None };

        Ok(Self {
            temp_path,
            final_path,
            writer,
            hasher,
            committed: false,
        })
    }

    pub fn write(&mut self, buf: &[u8]) -> io::Result<()> {
        self.writer.write_all(buf)?;
        if let Some(ref mut hasher) = self.hasher {
            hasher.update(buf);
        }
        Ok(())
    }

    /// Flush, fsync, optionally verify against `expected`, then rename. On
    /// hash mismatch the temp file is left for `Drop` to clean up and an
    /// error is returned.
    pub fn commit(mut self, expected: Option<&Fingerprint>) -> io::Result<()> {
        self.writer.flush()?;
        self.writer.get_ref().sync_all()?;

        if let (Some(hasher), Some(expected)) = (self.hasher.take(), expected) {
            let digest = hasher.finalize();
            let mut computed = [0u8; 32];
            computed.copy_from_slice(&digest);
            let computed = Fingerprint::Strong(computed);
            if !computed.matches(expected) {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!(
                        "hash verification failed for {}: expected {}, got {}",
                        self.final_path.display(),
                        expected.to_hex(),
                        computed.to_hex(),
                    ),
                ));
            }
        }

        fs::rename(&self.temp_path, &self.final_path)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for AtomicWriter {
    fn drop(&mut self) {
        if !self.committed {
            let _ = fs::remove_file(&self.temp_path);
        }
    }
}

/// Copy a file atomically: write to a temp file, fsync, rename onto `dest`.
/// The destination is never observed in a partial state.
pub fn atomic_copy_file_with_metadata(
    source: &Path,
    dest: &Path,
    temp_path: &Path,
    preserve_timestamps: bool,
    verify: bool,
    expected: Option<&Fingerprint>,
) -> io::Result<()> {
    let metadata = fs::metadata(source)?;

    let mut writer = AtomicWriter::new(temp_path.to_path_buf(), dest.to_path_buf(), verify)?;

    let source_file = File::open(source)?;
    let mut reader = BufReader::with_capacity(COPY_BUFFER_SIZE, source_file);
    let mut buffer = vec![0u8; COPY_BUFFER_SIZE];

    loop {
        let bytes_read = reader.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        writer.write(&buffer[..bytes_read])?;
    }

    writer.commit(expected)?;

    if preserve_timestamps {
        set_file_mtime(dest, metadata.modified()?)?;
    }

    #[cfg(unix)]
    {
        set_file_permissions(dest, &metadata)?;
    }

    Ok(())
}

/// Flush directory metadata to disk so a rename is durable across a crash.
/// No-op on Windows, where directory fsync is not supported.
pub fn fsync_directory(path: &Path) -> io::Result<()> {
    #[cfg(unix)]
    File::open(path)?.sync_all()?;
    #[cfg(not(unix))]
    let _ = path;
    Ok(())
}

/// Append-only journal for crash recovery: a `P` line records an operation
/// about to begin, a matching `C` line records its completion. On recovery,
/// any `P` without a matching `C` has its temp file removed.
pub struct SyncJournal {
    file: Mutex<BufWriter<File>>,
    path: PathBuf,
}

impl SyncJournal {
    pub fn create(path: PathBuf) -> io::Result<Self> {
        let file = File::create(&path)?;
        let writer = BufWriter::new(file);
        Ok(Self {
            file: Mutex::new(writer),
            path,
        })
    }

    pub fn record_pending(&self, op: &str, temp_path: &Path, final_path: &Path) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        writeln!(file, "P\t{op}\t{}\t{}", temp_path.display(), final_path.display())?;
        file.flush()?;
        Ok(())
    }

    pub fn record_committed(&self, op: &str, temp_path: &Path, final_path: &Path) -> io::Result<()> {
        let mut file = self.file.lock().unwrap();
        writeln!(file, "C\t{op}\t{}\t{}", temp_path.display(), final_path.display())?;
        file.flush()?;
        Ok(())
    }

    pub fn remove(self) -> io::Result<()> {
        drop(self.file);
        remove_file_safe(&self.path)
    }

    /// Clean up after a previous interrupted run: any pending operation
    /// with no matching commit has its temp file removed, then the journal
    /// and temp directory are swept.
    pub fn recover(journal_path: &Path, temp_dir: &Path) -> io::Result<()> {
        if !journal_path.exists() {
            if temp_dir.exists() {
                cleanup_temp_dir(temp_dir)?;
            }
            return Ok(());
        }

        let file = File::open(journal_path)?;
        let reader = BufReader::new(file);

        let mut pending: Vec<(String, PathBuf, PathBuf)> = Vec::new();
        let mut committed: Vec<(String, PathBuf, PathBuf)> = Vec::new();

        for line in reader.lines() {
            let line = match line {
                Ok(l) => l,
                Err(_) => break,
            };

            let parts: Vec<&str> = line.split('\t').collect();
            if parts.len() < 4 {
                continue;
            }

            let entry = (parts[1].to_string(), PathBuf::from(parts[2]), PathBuf::from(parts[3]));

            match parts[0] {
                "P" => pending.push(entry),
                "C" => committed.push(entry),
                _ => continue,
            }
        }

        for (op, temp, final_path) in &pending {
            let is_committed = committed
                .iter()
                .any(|(cop, ctemp, cfinal)| cop == op && ctemp == temp && cfinal == final_path);

            if !is_committed {
                let _ = fs::remove_file(temp);
            }
        }

        remove_file_safe(journal_path)?;

        if temp_dir.exists() {
            cleanup_temp_dir(temp_dir)?;
        }

        Ok(())
    }
}

fn cleanup_temp_dir(temp_dir: &Path) -> io::Result<()> {
    if let Ok(entries) = fs::read_dir(temp_dir) {
        for entry in entries.flatten() {
            let _ = fs::remove_file(entry.path());
        }
    }
    Ok(())
}
