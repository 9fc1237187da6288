//! Persisted settings: a small TOML key/value document remembering the
//! last-used `hash_mode`, `max_copy_workers`, and `mirror` flag between
//! invocations. The core never reads or writes this file — only the CLI
//! layer does, before producing a `Config`.

use crate::config::HashMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const DEFAULT_MAX_COPY_WORKERS: usize = 4;
const SETTINGS_FILE_NAME: &str = "drift.toml";

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("failed to read settings file: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse settings file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("failed to serialize settings: {0}")]
    Serialize(#[from] toml::ser::Error),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub hash_mode: HashMode,
    #[serde(default = "default_max_copy_workers")]
    pub max_copy_workers: usize,
    #[serde(default)]
    pub mirror: bool,
}

fn default_max_copy_workers() -> usize {
    DEFAULT_MAX_COPY_WORKERS
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            hash_mode: HashMode::Fast,
            max_copy_workers: DEFAULT_MAX_COPY_WORKERS,
            mirror: false,
        }
    }
}

impl Settings {
    /// Read settings from `path`, falling back to defaults if the file
    /// doesn't exist yet (first run).
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Ok(Settings::default());
        }
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    pub fn save(&self, path: &Path) -> Result<(), SettingsError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Default location: next to the user's config directory, matching the
    /// conventional per-user settings file a CLI tool persists to.
    pub fn default_path() -> PathBuf {
        let base = dirs_home().unwrap_or_else(|| PathBuf::from("."));
        base.join(".config").join(SETTINGS_FILE_NAME)
    }
}

fn dirs_home() -> Option<PathBuf> {
    std::env::var_os("HOME")
        .or_else(|| std::env::var_os("USERPROFILE"))
        .map(PathBuf::from)
}
