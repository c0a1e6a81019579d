//! Client side of `recognize` and `hold`: make sure the daemon runs, capture
//! a screen region and hand the image to the daemon.

use crate::config::RuntimePaths;
use crate::daemon::{DaemonError, StartOutcome, StopOutcome, Supervisor};
use crate::engine::{EngineError, EngineRuntime};
use crate::ipc::{Action, Command, CommandChannel, IpcError};
use crate::platform::{Notifier, Platform, PlatformError};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Error, Debug)]
pub enum ClientError {
    #[error("{0}")]
    Engine(#[from] EngineError),

    #[error("{0}")]
    Daemon(#[from] DaemonError),

    #[error("{0}")]
    Platform(#[from] PlatformError),

    #[error("{0}")]
    Ipc(#[from] IpcError),

    #[error("Failed to create capture file: {0}")]
    TempFile(#[source] std::io::Error),
}

pub struct Client {
    supervisor: Supervisor,
    channel: CommandChannel,
    runtime: EngineRuntime,
}

impl Client {
    pub fn new(paths: &RuntimePaths, supervisor: Supervisor, runtime: EngineRuntime) -> Self {
        Self {
            supervisor,
            channel: CommandChannel::new(&paths.channel),
            runtime,
        }
    }

    /// Start the daemon if needed. Refuses while the engine is not downloaded.
    pub fn start(&self) -> Result<StartOutcome, ClientError> {
        self.require_engine()?;
        Ok(self.supervisor.ensure_running()?)
    }

    /// Restart the daemon. Refuses while the engine is not downloaded.
    pub fn restart(&self) -> Result<(StopOutcome, StartOutcome), ClientError> {
        self.require_engine()?;
        Ok(self.supervisor.restart()?)
    }

    fn require_engine(&self) -> Result<(), EngineError> {
        if self.runtime.is_installed() {
            Ok(())
        } else {
            Err(EngineError::NotInstalled(self.runtime.prefix().to_path_buf()))
        }
    }

    /// Capture a region and send it to the daemon as `action`.
    ///
    /// `action` is `Recognize` or `Hold`. Returns the path of the captured
    /// image, which the daemon deletes once processed.
    pub fn submit(
        &self,
        action: Action,
        platform: &dyn Platform,
        notifier: &dyn Notifier,
    ) -> Result<PathBuf, ClientError> {
        match self.start()? {
            StartOutcome::Started(pid) => info!("Started daemon (PID {})", pid),
            StartOutcome::AlreadyRunning(pid) => debug!("Daemon running (PID {})", pid),
        }

        if let Err(e) = platform.check_programs() {
            notify(notifier, &e.to_string());
            return Err(e.into());
        }

        let image = capture_file()?;
        if let Err(e) = platform.capture(&image) {
            discard(&image);
            if matches!(e, PlatformError::CaptureCancelled) {
                info!("Capture cancelled");
            }
            notify(notifier, &e.to_string());
            return Err(e.into());
        }

        let sent = self
            .channel
            .prepare()
            .and_then(|()| self.channel.send(&Command::with_file(action, &image)));
        if let Err(e) = sent {
            discard(&image);
            return Err(e.into());
        }

        debug!("Submitted {} for {}", image.display(), action.as_str());
        Ok(image)
    }
}

/// Empty PNG path in the temp directory that outlives this process.
fn capture_file() -> Result<PathBuf, ClientError> {
    let file = tempfile::Builder::new()
        .prefix(".clipocr")
        .suffix(".png")
        .tempfile()
        .map_err(ClientError::TempFile)?;
    let (_, path) = file.keep().map_err(|e| ClientError::TempFile(e.error))?;
    Ok(path)
}

fn discard(image: &Path) {
    if let Err(e) = fs::remove_file(image) {
        warn!("Failed to remove {}: {}", image.display(), e);
    }
}

fn notify(notifier: &dyn Notifier, message: &str) {
    if let Err(e) = notifier.notify(message) {
        warn!("{}", e);
    }
}
