//! Starting, stopping and querying the daemon from a client process.
//!
//! ```text
//! NotRunning -> Starting -> Running -> StoppingGraceful -> StoppingForced -> NotRunning
//! ```
//!
//! Whether the daemon runs is never stored; it is read from the PID file and
//! checked against the process table on every call.

use super::registry::{is_alive, program_name, reap, to_pid, ProcessRegistry};
use super::DaemonError;
use crate::config::RuntimePaths;
use crate::ipc::{Command as ChannelCommand, CommandChannel};
use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use std::ffi::OsString;
use std::io;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const DEFAULT_GRACE_PERIOD: Duration = Duration::from_secs(5);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const KILL_WAIT: Duration = Duration::from_secs(2);

/// How to spawn a daemon process.
#[derive(Debug, Clone)]
pub struct DaemonLauncher {
    program: PathBuf,
    args: Vec<OsString>,
}

impl DaemonLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// Re-run this executable as `start --foreground`.
    pub fn current_exe() -> io::Result<Self> {
        Ok(Self::new(
            std::env::current_exe()?,
            vec!["start".into(), "--foreground".into()],
        ))
    }

    /// Whether `pid` still runs this launcher's program. Unknown counts as yes.
    fn launched(&self, pid: u32) -> bool {
        match (program_name(pid), self.program.file_name()) {
            (Some(running), Some(ours)) => ours == running.as_str(),
            _ => true,
        }
    }

    /// Spawn detached from the caller's terminal and process group.
    fn spawn(&self) -> io::Result<u32> {
        let child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .process_group(0)
            .spawn()?;
        Ok(child.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started(u32),
    AlreadyRunning(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    AlreadyStopped,
    /// Exited on its own after the `stop` command
    Stopped(u32),
    /// Ignored `stop` for the whole grace period
    Killed(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DaemonStatus {
    Running(u32),
    Stopped,
}

pub struct Supervisor {
    registry: ProcessRegistry,
    channel: CommandChannel,
    launcher: DaemonLauncher,
    grace_period: Duration,
    poll_interval: Duration,
}

impl Supervisor {
    pub fn new(paths: &RuntimePaths, launcher: DaemonLauncher) -> Self {
        Self {
            registry: ProcessRegistry::new(&paths.pid_file),
            channel: CommandChannel::new(&paths.channel),
            launcher,
            grace_period: DEFAULT_GRACE_PERIOD,
            poll_interval: POLL_INTERVAL,
        }
    }

    /// How long `stop` waits for a graceful exit before killing.
    pub fn with_grace_period(mut self, grace_period: Duration) -> Self {
        self.grace_period = grace_period;
        self
    }

    /// How long `stop` waits for the daemon to accept the `stop` command.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.channel = self.channel.with_send_timeout(timeout);
        self
    }

    pub fn registry(&self) -> &ProcessRegistry {
        &self.registry
    }

    pub fn status(&self) -> DaemonStatus {
        match self.registry.live_pid() {
            Some(pid) => DaemonStatus::Running(pid),
            None => DaemonStatus::Stopped,
        }
    }

    /// Spawn the daemon unless a live one is already recorded.
    pub fn ensure_running(&self) -> Result<StartOutcome, DaemonError> {
        if let Some(pid) = self.registry.live_pid() {
            debug!("Daemon already running (PID {})", pid);
            return Ok(StartOutcome::AlreadyRunning(pid));
        }

        let pid = self.launcher.spawn().map_err(DaemonError::Spawn)?;
        self.registry.write(pid).map_err(DaemonError::PidFile)?;
        info!("Spawned daemon (PID {})", pid);
        Ok(StartOutcome::Started(pid))
    }

    /// Ask the daemon to stop, killing it if it does not exit in time.
    pub fn stop(&self) -> Result<StopOutcome, DaemonError> {
        let Some(pid) = self.registry.live_pid() else {
            return Ok(StopOutcome::AlreadyStopped);
        };

        info!("Stopping daemon (PID {})", pid);
        if let Err(e) = self.channel.send(&ChannelCommand::stop()) {
            warn!("Could not deliver stop command: {}", e);
        }

        if self.wait_for_exit(pid, self.grace_period) {
            self.registry.clear_if(pid).map_err(DaemonError::PidFile)?;
            return Ok(StopOutcome::Stopped(pid));
        }

        // The daemon may have exited and its PID been handed to another program
        if !self.launcher.launched(pid) {
            warn!(
                "PID {} no longer runs {}, not killing it",
                pid,
                self.launcher.program.display()
            );
            self.registry.clear_if(pid).map_err(DaemonError::PidFile)?;
            return Ok(StopOutcome::AlreadyStopped);
        }

        warn!(
            "Daemon (PID {}) still running after {:?}, killing",
            pid, self.grace_period
        );
        if let Some(target) = to_pid(pid) {
            match kill(target, Signal::SIGKILL) {
                Ok(()) | Err(Errno::ESRCH) => {}
                Err(e) => return Err(DaemonError::Signal(e)),
            }
        }

        if !self.wait_for_exit(pid, KILL_WAIT) {
            return Err(DaemonError::StillRunning(pid));
        }
        self.registry.clear_if(pid).map_err(DaemonError::PidFile)?;
        Ok(StopOutcome::Killed(pid))
    }

    /// `stop` followed by `ensure_running`.
    pub fn restart(&self) -> Result<(StopOutcome, StartOutcome), DaemonError> {
        let stopped = self.stop()?;
        let started = self.ensure_running()?;
        Ok((stopped, started))
    }

    fn wait_for_exit(&self, pid: u32, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            reap(pid);
            if !is_alive(pid) {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(self.poll_interval);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const DEAD_PID: u32 = 2_000_000_000;

    fn sleeper() -> DaemonLauncher {
        DaemonLauncher::new("sleep", vec!["30".into()])
    }

    fn supervisor(dir: &TempDir, launcher: DaemonLauncher) -> Supervisor {
        Supervisor::new(&RuntimePaths::in_dir(dir.path()), launcher)
            .with_grace_period(Duration::from_millis(300))
            .with_send_timeout(Duration::from_millis(100))
    }

    #[test]
    fn test_stop_when_nothing_runs() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(&dir, sleeper());

        assert_eq!(sup.status(), DaemonStatus::Stopped);
        assert_eq!(sup.stop().unwrap(), StopOutcome::AlreadyStopped);
        assert_eq!(sup.stop().unwrap(), StopOutcome::AlreadyStopped);
    }

    #[test]
    fn test_ensure_running_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(&dir, sleeper());

        let StartOutcome::Started(pid) = sup.ensure_running().unwrap() else {
            panic!("expected a fresh daemon");
        };
        let recorded = fs::read_to_string(sup.registry().path()).unwrap();

        assert_eq!(sup.ensure_running().unwrap(), StartOutcome::AlreadyRunning(pid));
        assert_eq!(fs::read_to_string(sup.registry().path()).unwrap(), recorded);
        assert_eq!(sup.status(), DaemonStatus::Running(pid));

        assert_eq!(sup.stop().unwrap(), StopOutcome::Killed(pid));
    }

    #[test]
    fn test_stale_pid_file_reads_as_stopped() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(&dir, sleeper());
        sup.registry().write(DEAD_PID).unwrap();

        assert_eq!(sup.status(), DaemonStatus::Stopped);
        assert_eq!(sup.stop().unwrap(), StopOutcome::AlreadyStopped);

        let StartOutcome::Started(pid) = sup.ensure_running().unwrap() else {
            panic!("stale PID file should not block a start");
        };
        assert_ne!(pid, DEAD_PID);
        assert_eq!(sup.registry().read(), Some(pid));

        sup.stop().unwrap();
    }

    #[test]
    fn test_unresponsive_daemon_is_killed() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(&dir, sleeper());
        let StartOutcome::Started(pid) = sup.ensure_running().unwrap() else {
            panic!("expected a fresh daemon");
        };

        let started = Instant::now();
        assert_eq!(sup.stop().unwrap(), StopOutcome::Killed(pid));
        assert!(started.elapsed() >= Duration::from_millis(300));
        assert_eq!(sup.status(), DaemonStatus::Stopped);
        assert!(!sup.registry().path().exists());
    }

    #[test]
    fn test_daemon_exits_on_stop_command() {
        let dir = tempfile::tempdir().unwrap();
        let paths = RuntimePaths::in_dir(dir.path());
        CommandChannel::new(&paths.channel).prepare().unwrap();

        // Reads one record from the channel, then exits
        let launcher = DaemonLauncher::new(
            "sh",
            vec![
                "-c".into(),
                "read -r line < \"$0\"".into(),
                paths.channel.clone().into(),
            ],
        );
        let sup = Supervisor::new(&paths, launcher)
            .with_grace_period(Duration::from_secs(3))
            .with_send_timeout(Duration::from_secs(3));

        let StartOutcome::Started(pid) = sup.ensure_running().unwrap() else {
            panic!("expected a fresh daemon");
        };
        assert_eq!(sup.stop().unwrap(), StopOutcome::Stopped(pid));
        assert_eq!(sup.status(), DaemonStatus::Stopped);
    }

    #[test]
    fn test_restart_replaces_daemon() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(&dir, sleeper());
        let StartOutcome::Started(first) = sup.ensure_running().unwrap() else {
            panic!("expected a fresh daemon");
        };

        let (stopped, started) = sup.restart().unwrap();
        assert_eq!(stopped, StopOutcome::Killed(first));
        let StartOutcome::Started(second) = started else {
            panic!("restart should spawn a new daemon");
        };
        assert_ne!(first, second);
        assert_eq!(sup.status(), DaemonStatus::Running(second));

        sup.stop().unwrap();
    }

    #[test]
    fn test_reused_pid_is_not_killed() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(&dir, sleeper());

        // An unrelated program now holds the recorded PID
        let mut other = Command::new("cat").stdin(Stdio::piped()).spawn().unwrap();
        sup.registry().write(other.id()).unwrap();

        assert_eq!(sup.stop().unwrap(), StopOutcome::AlreadyStopped);
        assert!(other.try_wait().unwrap().is_none());
        assert!(!sup.registry().path().exists());

        other.kill().unwrap();
        other.wait().unwrap();
    }

    #[test]
    fn test_launched_matches_program_name() {
        let mut child = Command::new("sleep").arg("30").spawn().unwrap();

        assert!(sleeper().launched(child.id()));
        assert!(DaemonLauncher::new("/usr/bin/sleep", Vec::new()).launched(child.id()));
        assert!(!DaemonLauncher::new("cat", Vec::new()).launched(child.id()));
        // Gone processes cannot be told apart, so they pass
        assert!(sleeper().launched(DEAD_PID));

        child.kill().unwrap();
        child.wait().unwrap();
    }

    #[test]
    fn test_spawn_failure() {
        let dir = tempfile::tempdir().unwrap();
        let sup = supervisor(
            &dir,
            DaemonLauncher::new("clipocr-no-such-daemon", Vec::new()),
        );

        assert!(matches!(sup.ensure_running(), Err(DaemonError::Spawn(_))));
        assert_eq!(sup.registry().read(), None);
    }
}
