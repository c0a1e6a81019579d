//! Download and removal of the recognition engine runtime.
//!
//! The runtime is a Python virtual environment with `manga-ocr` installed,
//! kept under the data directory.

use crate::config::{Config, ConfigError};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use thiserror::Error;
use tracing::info;

const PACKAGE: &str = "manga-ocr";

#[derive(Error, Debug)]
pub enum InstallError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{step} failed ({status})")]
    StepFailed { step: String, status: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Location of the engine's virtual environment.
#[derive(Debug, Clone)]
pub struct EngineRuntime {
    prefix: PathBuf,
}

impl EngineRuntime {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            prefix: data_dir.join("pyenv"),
        }
    }

    /// Runtime under the configured data directory.
    pub fn locate() -> Result<Self, ConfigError> {
        Ok(Self::new(&Config::data_dir()?))
    }

    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    pub fn python(&self) -> PathBuf {
        self.prefix.join("bin").join("python3")
    }

    fn pip(&self) -> PathBuf {
        self.prefix.join("bin").join("pip")
    }

    pub fn is_installed(&self) -> bool {
        self.python().is_file()
    }

    /// Create the virtual environment and install the engine into it.
    pub fn download(&self) -> Result<(), InstallError> {
        println!("Downloading {}...", PACKAGE);
        if let Some(parent) = self.prefix.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut venv = Command::new("python3");
        venv.args(["-m", "venv", "--system-site-packages", "--symlinks"])
            .arg(&self.prefix);
        run_step("Creating virtual environment", venv)?;

        let mut pip = Command::new(self.pip());
        pip.args(["install", "--upgrade", "pip"]);
        run_step("Upgrading pip", pip)?;

        let mut engine = Command::new(self.pip());
        engine.args(["install", "--upgrade", PACKAGE]);
        run_step("Installing manga-ocr", engine)?;

        println!("Downloaded {}.", PACKAGE);
        Ok(())
    }

    /// Delete the runtime. Returns `false` if there was nothing to delete.
    pub fn purge(&self) -> Result<bool, InstallError> {
        if !self.prefix.exists() {
            return Ok(false);
        }
        fs::remove_dir_all(&self.prefix)?;
        info!("Removed {}", self.prefix.display());
        Ok(true)
    }
}

fn run_step(step: &str, mut cmd: Command) -> Result<(), InstallError> {
    info!("{}", step);
    let program = cmd.get_program().to_string_lossy().into_owned();
    let status = cmd
        .status()
        .map_err(|source| InstallError::Spawn { program, source })?;

    if status.success() {
        Ok(())
    } else {
        Err(InstallError::StepFailed {
            step: step.to_string(),
            status: status.to_string(),
        })
    }
}
