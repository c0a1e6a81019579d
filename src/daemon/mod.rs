//! Background daemon keeping the recognition engine resident.
//!
//! The daemon:
//! 1. Claims the PID file
//! 2. Recreates the command channel and opens it for reading
//! 3. Loads the recognition model once
//! 4. Processes commands until it receives `stop`

pub mod processor;
pub mod registry;
pub mod supervisor;

pub use processor::{CommandProcessor, ProcessorState, JOIN_DELIMITER};
pub use registry::ProcessRegistry;
pub use supervisor::{DaemonLauncher, DaemonStatus, StartOutcome, StopOutcome, Supervisor};

use crate::config::{Config, RuntimePaths};
use crate::engine::{EngineError, EngineRuntime, HelperEngine};
use crate::ipc::{CommandChannel, IpcError};
use crate::output::{ClipboardHandler, DesktopNotifier, ScreenshotArchive};
use crate::platform::{self, DisplayServer, Notifier};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Error, Debug)]
pub enum DaemonError {
    #[error("Config error: {0}")]
    Config(#[from] crate::config::ConfigError),

    #[error("Channel error: {0}")]
    Ipc(#[from] IpcError),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Failed to spawn daemon: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Failed to update PID file: {0}")]
    PidFile(#[source] std::io::Error),

    #[error("Daemon already running (PID {0})")]
    AlreadyRunning(u32),

    #[error("Daemon (PID {0}) survived SIGKILL")]
    StillRunning(u32),

    #[error("Failed to signal daemon: {0}")]
    Signal(#[from] nix::errno::Errno),
}

/// Exclusive hold on the PID file for the life of the daemon.
///
/// Dropping the claim removes the file, unless another process has since
/// written its own PID there.
#[derive(Debug)]
pub struct PidClaim {
    registry: ProcessRegistry,
    pid: u32,
}

impl PidClaim {
    /// Record `pid` as the daemon. Refuses while the file names another live
    /// process; stale entries are taken over.
    pub fn acquire(registry: ProcessRegistry, pid: u32) -> Result<Self, DaemonError> {
        if let Some(running) = registry.live_pid().filter(|&running| running != pid) {
            return Err(DaemonError::AlreadyRunning(running));
        }
        registry.write(pid).map_err(DaemonError::PidFile)?;
        Ok(Self { registry, pid })
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }
}

impl Drop for PidClaim {
    fn drop(&mut self) {
        if let Err(e) = self.registry.clear_if(self.pid) {
            warn!("Failed to remove PID file: {}", e);
        }
    }
}

/// Run the daemon in the current process until a `stop` command arrives.
pub fn run_foreground(paths: &RuntimePaths) -> Result<(), DaemonError> {
    run(paths, DesktopNotifier)
}

/// Claim the PID file and serve commands, reporting through `notifier`.
///
/// A spawned daemon has no terminal, so any error that ends it is logged and
/// shown as a notification before being returned.
pub fn run<N>(paths: &RuntimePaths, notifier: N) -> Result<(), DaemonError>
where
    N: Notifier + Clone + 'static,
{
    let result = PidClaim::acquire(ProcessRegistry::new(&paths.pid_file), std::process::id())
        .and_then(|claim| {
            info!("Daemon started (PID {})", claim.pid());
            serve(paths, notifier.clone())
        });

    match &result {
        // Lost a start race; the winner keeps serving
        Err(e @ DaemonError::AlreadyRunning(_)) => warn!("{}", e),
        Err(e) => {
            error!("Daemon failed: {}", e);
            if let Err(notify_err) = notifier.notify(&format!("clipocr daemon failed: {}", e)) {
                warn!("{}", notify_err);
            }
        }
        Ok(()) => {}
    }
    result
}

fn serve<N>(paths: &RuntimePaths, notifier: N) -> Result<(), DaemonError>
where
    N: Notifier + 'static,
{
    let channel = CommandChannel::new(&paths.channel);
    channel.recreate()?;
    // Opened before the model loads so early clients are not turned away
    let commands = channel.listen()?;

    let config = Config::load()?;
    let runtime = EngineRuntime::locate()?;
    let mut engine = HelperEngine::manga_ocr(&runtime, config.force_cpu)?;
    engine.start()?;

    let server = DisplayServer::detect();
    info!("Display server: {}", server.name());
    let clipboard = ClipboardHandler::new(config.clip_args.clone(), platform::text_output_for(server));
    let archive = config.archive_dir().map(ScreenshotArchive::new);
    if let Some(archive) = &archive {
        info!("Archiving screenshots to {}", archive.dir().display());
    }

    let mut processor =
        CommandProcessor::new(Box::new(engine), Box::new(clipboard), Box::new(notifier))
            .with_archive(archive);

    info!("Ready for commands");
    processor.run(commands);
    info!("Daemon stopped");
    Ok(())
}
