//! Archive of recognized screenshots and their text.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ArchiveError {
    #[error("Failed to archive {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Copies each recognized image into a directory with a `.txt` sidecar.
#[derive(Debug, Clone)]
pub struct ScreenshotArchive {
    dir: PathBuf,
}

impl ScreenshotArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Store `image` and `text`; returns the archived image path.
    pub fn store(&self, image: &Path, text: &str) -> Result<PathBuf, ArchiveError> {
        let stem = self.unique_stem();
        let image_dest = self.dir.join(format!("{}.png", stem));
        let text_dest = self.dir.join(format!("{}.txt", stem));

        fs::copy(image, &image_dest).map_err(|source| ArchiveError::Write {
            path: image_dest.clone(),
            source,
        })?;
        fs::write(&text_dest, text).map_err(|source| ArchiveError::Write {
            path: text_dest,
            source,
        })?;

        debug!("Archived screenshot to {}", image_dest.display());
        Ok(image_dest)
    }

    fn unique_stem(&self) -> String {
        let base = format!(
            "clipocr_{}",
            chrono::Local::now().format("%Y%m%d_%H%M%S_%3f")
        );

        let mut stem = base.clone();
        let mut n = 1;
        while self.dir.join(format!("{}.png", stem)).exists() {
            stem = format!("{}-{}", base, n);
            n += 1;
        }
        stem
    }
}
