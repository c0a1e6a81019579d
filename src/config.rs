//! Configuration loading and well-known paths.
//!
//! The config file is plain text with one `key=value` pair per line:
//!
//! ```text
//! # comments start with a hash
//! force_cpu=yes
//! clip_command=xclip -selection clipboard
//! screenshot_dir=~/Pictures/ocr
//! ```

use directories::ProjectDirs;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Overrides the config file location.
pub const CONFIG_ENV: &str = "CLIPOCR_CONFIG";
/// Overrides the data directory (engine runtime, logs, crash reports).
pub const DATA_DIR_ENV: &str = "CLIPOCR_DATA_DIR";
/// Overrides the runtime directory holding the PID file and the channel.
pub const RUNTIME_DIR_ENV: &str = "CLIPOCR_RUNTIME_DIR";

const CHANNEL_FILE: &str = "clipocr.fifo";
const PID_FILE: &str = "clipocr.pid";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to find config directory")]
    NoConfigDir,

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// Run the recognition model on the CPU even when a GPU is present.
    pub force_cpu: bool,

    /// Custom clipboard command; the text is appended as the last argument.
    pub clip_args: Option<Vec<String>>,

    /// Where to archive recognized screenshots. `None` disables archival.
    pub screenshot_dir: Option<PathBuf>,
}

impl Config {
    /// Get the config directory path
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        ProjectDirs::from("", "", "clipocr")
            .map(|dirs| dirs.config_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Get the data directory path (engine runtime, logs)
    pub fn data_dir() -> Result<PathBuf, ConfigError> {
        if let Some(dir) = std::env::var_os(DATA_DIR_ENV) {
            return Ok(PathBuf::from(dir));
        }
        ProjectDirs::from("", "", "clipocr")
            .map(|dirs| dirs.data_dir().to_path_buf())
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Get the config file path
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Ok(PathBuf::from(path));
        }
        Ok(Self::config_dir()?.join("config"))
    }

    /// Load config from the default location. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path()?)
    }

    /// Load config from an explicit file. A missing file yields defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.is_file() {
            debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let contents = fs::read_to_string(path)?;
        Ok(Self::parse(&contents))
    }

    /// Parse config file contents. Never fails: unusable lines are skipped.
    pub fn parse(contents: &str) -> Self {
        let mut config = Self::default();

        for (key, value) in contents.lines().filter_map(key_value) {
            match key {
                "force_cpu" => config.force_cpu = matches!(value, "yes" | "true"),
                "clip_command" => {
                    let args: Vec<String> = value.split_whitespace().map(String::from).collect();
                    config.clip_args = if args.is_empty() { None } else { Some(args) };
                }
                "screenshot_dir" => {
                    config.screenshot_dir = if value.is_empty() {
                        None
                    } else {
                        Some(expand_home(value))
                    };
                }
                other => debug!("Ignoring unknown config key: {}", other),
            }
        }

        config
    }

    /// Archive directory, only if it currently exists as a directory.
    pub fn archive_dir(&self) -> Option<&Path> {
        self.screenshot_dir.as_deref().filter(|dir| dir.is_dir())
    }
}

/// Split a `key=value` line. Comments and lines without `=` are skipped.
fn key_value(line: &str) -> Option<(&str, &str)> {
    if line.starts_with('#') {
        return None;
    }
    let (key, value) = line.split_once('=')?;
    Some((key.trim(), value.trim()))
}

fn expand_home(value: &str) -> PathBuf {
    match (value.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(value),
    }
}

/// Filesystem locations shared between clients and the daemon.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    pub channel: PathBuf,
    pub pid_file: PathBuf,
}

impl RuntimePaths {
    /// Paths inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            channel: dir.join(CHANNEL_FILE),
            pid_file: dir.join(PID_FILE),
        }
    }

    /// Resolve the runtime directory from the environment.
    pub fn from_env() -> Self {
        let dir = std::env::var_os(RUNTIME_DIR_ENV)
            .map(PathBuf::from)
            .or_else(dirs::runtime_dir)
            .unwrap_or_else(std::env::temp_dir);
        Self::in_dir(&dir)
    }
}
