//! PID file bookkeeping.
//!
//! The PID file is the only shared record of which process is the daemon.
//! Its contents are the decimal PID and nothing else. A file that is missing,
//! unparseable, non-positive, or names a process that no longer exists all
//! mean the same thing: no daemon is running.

use nix::errno::Errno;
use nix::sys::signal::kill;
use nix::sys::wait::{waitpid, WaitPidFlag};
use nix::unistd::Pid;
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct ProcessRegistry {
    path: PathBuf,
}

impl ProcessRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// PID recorded in the file, if it holds a positive integer.
    pub fn read(&self) -> Option<u32> {
        let contents = fs::read_to_string(&self.path).ok()?;
        contents.trim().parse::<u32>().ok().filter(|&pid| pid > 0)
    }

    /// PID of the running daemon; stale entries read as `None`.
    pub fn live_pid(&self) -> Option<u32> {
        let pid = self.read()?;
        if is_alive(pid) {
            Some(pid)
        } else {
            debug!("Ignoring stale PID file {} (PID {})", self.path.display(), pid);
            None
        }
    }

    pub fn write(&self, pid: u32) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, pid.to_string())
    }

    pub fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Err(e) if e.kind() != ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }

    /// Remove the file only if it still names `pid`.
    pub fn clear_if(&self, pid: u32) -> io::Result<bool> {
        if self.read() == Some(pid) {
            self.clear()?;
            Ok(true)
        } else {
            Ok(false)
        }
    }
}

/// Whether a process with this PID exists and has not exited.
///
/// Zombies count as exited.
pub fn is_alive(pid: u32) -> bool {
    let Some(pid) = to_pid(pid) else {
        return false;
    };

    match kill(pid, None) {
        Ok(()) | Err(Errno::EPERM) => !is_zombie(pid),
        Err(_) => false,
    }
}

/// Collect the exit status if `pid` is our own child, so it does not linger
/// as a zombie.
pub fn reap(pid: u32) {
    let Some(pid) = to_pid(pid) else {
        return;
    };

    match waitpid(pid, Some(WaitPidFlag::WNOHANG)) {
        // ECHILD: not ours, or already collected
        Ok(_) | Err(Errno::ECHILD) => {}
        Err(e) => debug!("waitpid({}) failed: {}", pid, e),
    }
}

/// File name of the program a live process was started from, per
/// `/proc/<pid>/cmdline`.
pub fn program_name(pid: u32) -> Option<String> {
    let cmdline = fs::read(format!("/proc/{}/cmdline", to_pid(pid)?)).ok()?;
    let argv0 = cmdline.split(|&b| b == 0).next()?;
    let argv0 = Path::new(std::str::from_utf8(argv0).ok()?);
    argv0
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
}

pub(crate) fn to_pid(pid: u32) -> Option<Pid> {
    i32::try_from(pid)
        .ok()
        .filter(|&raw| raw > 0)
        .map(Pid::from_raw)
}

fn is_zombie(pid: Pid) -> bool {
    // Field 3 of /proc/<pid>/stat, after the parenthesised command name
    fs::read_to_string(format!("/proc/{}/stat", pid))
        .ok()
        .and_then(|stat| {
            stat.rsplit_once(')')
                .and_then(|(_, rest)| rest.split_whitespace().next().map(|s| s == "Z"))
        })
        .unwrap_or(false)
}
