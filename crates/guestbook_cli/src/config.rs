//! TOML configuration for the guestbook CLI.
//!
//! Every section is optional; a missing file section falls back to defaults.

use guestbook_core::LifecycleConfig;
use serde::Deserialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::path::{Path, PathBuf};

const DEFAULT_DB_FILE: &str = "guestbook.db";
const DEFAULT_LOG_DIR: &str = "logs";

/// Top-level configuration, parsed from TOML.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub lifecycle: LifecycleConfig,
    pub storage: StorageSection,
    pub log: LogSection,
}

/// `[storage]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    /// SQLite file holding the guestbook records.
    pub db_path: PathBuf,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from(DEFAULT_DB_FILE),
        }
    }
}

/// `[log]` section.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct LogSection {
    /// One of `trace|debug|info|warn|error`.
    pub level: String,
    pub dir: PathBuf,
}

impl Default for LogSection {
    fn default() -> Self {
        Self {
            level: guestbook_core::default_log_level().to_string(),
            dir: PathBuf::from(DEFAULT_LOG_DIR),
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Read { path: PathBuf, source: std::io::Error },
    Parse { path: PathBuf, source: toml::de::Error },
    WorkingDir(std::io::Error),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Read { path, source } => {
                write!(f, "cannot read config {}: {source}", path.display())
            }
            Self::Parse { path, source } => {
                write!(f, "invalid config {}: {source}", path.display())
            }
            Self::WorkingDir(source) => {
                write!(f, "cannot resolve working directory: {source}")
            }
        }
    }
}

impl Error for ConfigError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Read { source, .. } => Some(source),
            Self::Parse { source, .. } => Some(source),
            Self::WorkingDir(source) => Some(source),
        }
    }
}

impl CliConfig {
    /// Loads config from a TOML file, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Applies flag/env overrides on top of file values.
    pub fn with_overrides(mut self, db_path: Option<PathBuf>, log_dir: Option<PathBuf>) -> Self {
        if let Some(db_path) = db_path {
            self.storage.db_path = db_path;
        }
        if let Some(log_dir) = log_dir {
            self.log.dir = log_dir;
        }
        self
    }

    /// Makes relative storage and log paths absolute against the working
    /// directory; the logging sink only accepts absolute directories.
    pub fn resolve_paths(self) -> Result<Self, ConfigError> {
        let base = std::env::current_dir().map_err(ConfigError::WorkingDir)?;
        Ok(self.resolve_against(&base))
    }

    fn resolve_against(mut self, base: &Path) -> Self {
        if self.storage.db_path.is_relative() {
            self.storage.db_path = base.join(&self.storage.db_path);
        }
        if self.log.dir.is_relative() {
            self.log.dir = base.join(&self.log.dir);
        }
        self
    }
}
