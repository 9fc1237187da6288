//! Command-line flag surface, mapped one-to-one onto [`crate::config::Config`].

use crate::config::{Config, HashMode, Mode};
use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "drift", version, about = "Content-aware one-way directory synchronizer")]
pub struct Cli {
    /// Synchronize a directory tree: `--dir <src> <dst>`.
    #[arg(long, num_args = 2, value_names = ["SRC", "DST"], conflicts_with = "file")]
    pub dir: Option<Vec<PathBuf>>,

    /// Synchronize a single file: `--file <src> <dst>`.
    #[arg(long, num_args = 2, value_names = ["SRC", "DST"], conflicts_with = "dir")]
    pub file: Option<Vec<PathBuf>>,

    /// Source-side path to exclude from the sync. Repeatable.
    #[arg(long = "ignore", value_name = "PATH")]
    pub ignore: Vec<PathBuf>,

    /// Delete destination entries with no source equivalent (mirror mode).
    #[arg(short = 'd', long = "delete")]
    pub delete: bool,

    /// Compute and report the plan without touching the filesystem.
    #[arg(short = 'n', long = "dry-run")]
    pub dry_run: bool,

    /// Log every decision, not just actions.
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    /// Use the strong (SHA-256) fingerprint instead of the fast partial hash.
    #[arg(long = "sha256")]
    pub sha256: bool,

    /// Number of concurrent copy workers.
    #[arg(short = 'j', long = "max-copy-workers", value_name = "N")]
    pub max_copy_workers: Option<usize>,

    /// Hint for the global rayon pool size used by destination-index and
    /// directory-fingerprint-set hashing (independent of `max_copy_workers`).
    #[arg(short = 't', long = "threads", value_name = "N")]
    pub threads: Option<usize>,
}

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error("exactly one of --dir or --file must be given")]
    MissingMode,
}

impl Cli {
    /// Turn the parsed flags into a `Config`, merged under `settings` — any
    /// field the user didn't pass on the command line falls back to the
    /// persisted value.
    pub fn into_config(self, settings: &crate::settings::Settings) -> Result<Config, CliError> {
        let (mode, src, dst) = if let Some(pair) = self.dir {
            (Mode::Dir, pair[0].clone(), pair[1].clone())
        } else if let Some(pair) = self.file {
            (Mode::File, pair[0].clone(), pair[1].clone())
        } else {
            return Err(CliError::MissingMode);
        };

        let hash_mode = if self.sha256 {
            HashMode::Strong
        } else {
            settings.hash_mode
        };
        let mirror = self.delete || settings.mirror;
        let max_copy_workers = self.max_copy_workers.unwrap_or(settings.max_copy_workers);

        Ok(Config {
            mode,
            src,
            dst,
            ignore: self.ignore,
            mirror,
            dry_run: self.dry_run,
            verbose: self.verbose,
            hash_mode,
            max_copy_workers,
            threads: self.threads,
        })
    }
}
