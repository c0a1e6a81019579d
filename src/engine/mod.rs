//! Text recognition engine.
//!
//! The model lives in a helper interpreter that the daemon starts once and
//! keeps for its whole lifetime; see [`HelperEngine`].

pub mod helper;
pub mod install;

pub use helper::HelperEngine;
pub use install::{EngineRuntime, InstallError};

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Recognition engine is not downloaded (expected {0}). Run 'clipocr download'")]
    NotInstalled(PathBuf),

    #[error("Failed to start recognition engine: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Recognition engine exited: {0}")]
    Crashed(String),

    #[error("Recognition failed: {0}")]
    RecognitionFailed(String),

    #[error("Engine protocol error: {0}")]
    Protocol(String),
}

/// Synchronous image-to-text conversion.
pub trait Recognizer: Send {
    /// Recognize the text in the image at `image`.
    fn recognize(&mut self, image: &Path) -> Result<String, EngineError>;
}
