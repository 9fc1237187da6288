//! The configuration record consumed by the reconciliation core.
//!
//! Everything the driver needs to run a single reconciliation is collected
//! here. Nothing in this module touches a settings file or argv — those are
//! the job of [`crate::settings`] and [`crate::cli`]; this module only
//! defines the shape they both eventually have to produce.

use std::path::PathBuf;
use thiserror::Error;

/// Whether the run targets a single file pair or a directory tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Dir,
    File,
}

/// Which fingerprinting tier the fingerprinter and destination index use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashMode {
    Fast,
    Strong,
}

impl Default for HashMode {
    fn default() -> Self {
        HashMode::Fast
    }
}

/// Configuration errors are always fatal and always caught before any
/// filesystem mutation happens.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("source path does not exist: {0}")]
    SourceMissing(PathBuf),
    #[error("destination parent does not exist: {0}")]
    DestParentMissing(PathBuf),
    #[error("source and destination resolve to the same path: {0}")]
    SourceEqualsDest(PathBuf),
    #[error("max_copy_workers must be at least 1")]
    ZeroWorkers,
    #[error("--file source is a directory, not a file: {0}")]
    FileModeSourceIsDirectory(PathBuf),
    #[error("--file destination is a directory, not a file: {0}")]
    FileModeDestIsDirectory(PathBuf),
}

/// The sole interface between the external collaborators (CLI, settings
/// file) and the reconciliation core.
#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub src: PathBuf,
    pub dst: PathBuf,
    pub ignore: Vec<PathBuf>,
    pub mirror: bool,
    pub dry_run: bool,
    pub verbose: bool,
    pub hash_mode: HashMode,
    pub max_copy_workers: usize,
    /// Size hint for the global rayon pool used by the destination-index
    /// build and directory-fingerprint-set hashing. `None` leaves rayon's
    /// own default (one thread per core) in place.
    pub threads: Option<usize>,
}

impl Config {
    /// Validate the record before the driver is allowed to see it. Must be
    /// called, and must fail closed, before any filesystem mutation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.src.exists() {
            return Err(ConfigError::SourceMissing(self.src.clone()));
        }
        if let Some(parent) = self.dst.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(ConfigError::DestParentMissing(self.dst.clone()));
            }
        }
        if crate::path::normalize(&self.src) == crate::path::normalize(&self.dst) {
            return Err(ConfigError::SourceEqualsDest(self.src.clone()));
        }
        if self.max_copy_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if self.mode == Mode::File {
            if self.src.is_dir() {
                return Err(ConfigError::FileModeSourceIsDirectory(self.src.clone()));
            }
            if self.dst.is_dir() {
                return Err(ConfigError::FileModeDestIsDirectory(self.dst.clone()));
            }
        }
        Ok(())
    }
}
