//! FIFO transport for the command channel.
//!
//! A FIFO signals end-of-stream as soon as the last writer closes. The
//! daemon's [`Subscription`] therefore keeps a write descriptor of its own
//! open, so reads block between clients instead of hitting end-of-stream.
//! The subscription only ends when its owner stops pulling from it.

use super::{Command, IpcError};
use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);
const OPEN_RETRY_INTERVAL: Duration = Duration::from_millis(50);
const RESUBSCRIBE_BACKOFF: Duration = Duration::from_millis(500);

/// Handle to the FIFO node at a well-known path.
#[derive(Debug, Clone)]
pub struct CommandChannel {
    path: PathBuf,
    send_timeout: Duration,
}

impl CommandChannel {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            send_timeout: DEFAULT_SEND_TIMEOUT,
        }
    }

    /// How long `send` waits for a reader to appear.
    pub fn with_send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Make sure a FIFO exists at the path, replacing anything else found there.
    ///
    /// An existing FIFO is left untouched, so this is safe to call while the
    /// daemon is listening.
    pub fn prepare(&self) -> Result<(), IpcError> {
        match fs::symlink_metadata(&self.path) {
            Ok(meta) if meta.file_type().is_fifo() => return Ok(()),
            Ok(_) => {
                debug!("Removing non-FIFO node at {}", self.path.display());
                fs::remove_file(&self.path).map_err(|e| self.unavailable(e))?;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(self.unavailable(e)),
        }
        self.create()
    }

    /// Delete whatever is at the path and create a fresh FIFO.
    ///
    /// Only the daemon calls this, once, before it starts listening.
    pub fn recreate(&self) -> Result<(), IpcError> {
        match fs::remove_file(&self.path) {
            Ok(()) => debug!("Removed old channel node {}", self.path.display()),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => return Err(self.unavailable(e)),
        }
        self.create()
    }

    fn create(&self) -> Result<(), IpcError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| self.unavailable(e))?;
        }

        match mkfifo(self.path.as_path(), Mode::S_IRUSR | Mode::S_IWUSR) {
            Ok(()) => Ok(()),
            // Another client won the race
            Err(Errno::EEXIST) if is_fifo(&self.path) => Ok(()),
            Err(errno) => Err(self.unavailable(errno.into())),
        }
    }

    fn unavailable(&self, source: std::io::Error) -> IpcError {
        IpcError::ChannelUnavailable {
            path: self.path.clone(),
            source,
        }
    }

    /// Write one command record.
    ///
    /// Waits up to the send timeout for the daemon to open its end; a record
    /// is never left half-written in an unread pipe.
    pub fn send(&self, command: &Command) -> Result<(), IpcError> {
        let record = command.encode()?;
        let mut pipe = self.open_writer()?;

        pipe.write_all(&record)
            .and_then(|()| pipe.flush())
            .map_err(|e| IpcError::SendFailed(e.to_string()))?;

        debug!(
            "Sent {} command to {}",
            command.action.as_str(),
            self.path.display()
        );
        Ok(())
    }

    fn open_writer(&self) -> Result<File, IpcError> {
        let deadline = Instant::now() + self.send_timeout;

        loop {
            let opened = OpenOptions::new()
                .write(true)
                .custom_flags(nix::libc::O_NONBLOCK)
                .open(&self.path);

            match opened {
                Ok(file) => {
                    if !file.metadata()?.file_type().is_fifo() {
                        return Err(IpcError::SendFailed(format!(
                            "{} is not a FIFO",
                            self.path.display()
                        )));
                    }
                    set_blocking(&file)?;
                    return Ok(file);
                }
                Err(e) if waiting_for_reader(&e) => {
                    if Instant::now() >= deadline {
                        return Err(IpcError::NoReader(self.path.clone()));
                    }
                    thread::sleep(OPEN_RETRY_INTERVAL);
                }
                Err(e) => {
                    return Err(IpcError::SendFailed(format!(
                        "{}: {}",
                        self.path.display(),
                        e
                    )))
                }
            }
        }
    }

    /// Open the read end and start receiving commands.
    ///
    /// Neither open waits for a client, so clients can connect and queue
    /// records while the daemon is still loading the engine.
    pub fn listen(&self) -> Result<Subscription, IpcError> {
        let (reader, holder) = open_ends(&self.path).map_err(|e| self.unavailable(e))?;
        info!("Reading commands from {}", self.path.display());

        Ok(Subscription {
            path: self.path.clone(),
            reader: BufReader::new(reader),
            _holder: holder,
            record: Vec::new(),
        })
    }
}

/// Endless stream of decoded commands read from the channel.
///
/// The subscription holds a write end of the FIFO for its whole lifetime, so
/// the pipe always has a writer and a read on an idle channel blocks until
/// the next record. Both ends are reopened only after a read error, and the
/// old descriptors are released only after the new ones are open. Malformed
/// records are logged and skipped. `next()` never returns `None`.
pub struct Subscription {
    path: PathBuf,
    reader: BufReader<File>,
    _holder: File,
    record: Vec<u8>,
}

impl Subscription {
    fn resubscribe(&mut self) {
        loop {
            match open_ends(&self.path) {
                Ok((reader, holder)) => {
                    self.reader = BufReader::new(reader);
                    self._holder = holder;
                    return;
                }
                Err(e) => {
                    error!("Failed to reopen {}: {}", self.path.display(), e);
                    thread::sleep(RESUBSCRIBE_BACKOFF);
                }
            }
        }
    }
}

impl Iterator for Subscription {
    type Item = Command;

    fn next(&mut self) -> Option<Command> {
        loop {
            self.record.clear();

            match self.reader.read_until(b'\n', &mut self.record) {
                // Unreachable while the holder is open; recover anyway
                Ok(0) => {
                    warn!("Unexpected end of stream on {}", self.path.display());
                    self.resubscribe();
                }
                Ok(_) => {
                    if self.record.trim_ascii().is_empty() {
                        continue;
                    }
                    match Command::decode(&self.record) {
                        Ok(command) => {
                            debug!("Received {} command", command.action.as_str());
                            return Some(command);
                        }
                        Err(e) => warn!("Dropping record: {}", e),
                    }
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    warn!("Channel read failed: {}", e);
                    self.resubscribe();
                }
            }
        }
    }
}

/// Open a blocking read end plus a write end that keeps the pipe from
/// reporting end-of-stream.
fn open_ends(path: &Path) -> std::io::Result<(File, File)> {
    // Non-blocking so the open does not wait for a client
    let reader = OpenOptions::new()
        .read(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(path)?;
    if !reader.metadata()?.file_type().is_fifo() {
        return Err(std::io::Error::new(
            ErrorKind::InvalidInput,
            format!("{} is not a FIFO", path.display()),
        ));
    }

    // Succeeds without blocking because the read end is already open
    let holder = OpenOptions::new()
        .write(true)
        .custom_flags(nix::libc::O_NONBLOCK)
        .open(path)?;
    set_blocking(&reader)?;
    Ok((reader, holder))
}

fn set_blocking(file: &File) -> std::io::Result<()> {
    fcntl(file.as_raw_fd(), FcntlArg::F_SETFL(OFlag::empty()))?;
    Ok(())
}

/// ENXIO: FIFO has no reader yet. NotFound: the daemon is recreating it.
fn waiting_for_reader(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(nix::libc::ENXIO) || e.kind() == ErrorKind::NotFound
}

fn is_fifo(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|meta| meta.file_type().is_fifo())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ipc::Action;
    use std::os::unix::fs::MetadataExt;

    fn channel_in(dir: &Path) -> CommandChannel {
        CommandChannel::new(dir.join("test.fifo")).with_send_timeout(Duration::from_secs(2))
    }

    #[test]
    fn test_prepare_creates_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());

        channel.prepare().unwrap();
        assert!(is_fifo(channel.path()));
    }

    #[test]
    fn test_prepare_keeps_existing_fifo() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());

        channel.prepare().unwrap();
        let before = fs::metadata(channel.path()).unwrap().ino();
        channel.prepare().unwrap();
        let after = fs::metadata(channel.path()).unwrap().ino();
        assert_eq!(before, after);
    }

    #[test]
    fn test_prepare_replaces_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());
        fs::write(channel.path(), "stale").unwrap();

        channel.prepare().unwrap();
        assert!(is_fifo(channel.path()));
    }

    #[test]
    fn test_recreate_replaces_anything() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());

        fs::write(channel.path(), "stale").unwrap();
        channel.recreate().unwrap();
        assert!(is_fifo(channel.path()));

        channel.recreate().unwrap();
        assert!(is_fifo(channel.path()));
    }

    #[test]
    fn test_prepare_fails_on_directory() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());
        fs::create_dir(channel.path()).unwrap();

        assert!(matches!(
            channel.prepare(),
            Err(IpcError::ChannelUnavailable { .. })
        ));
    }

    #[test]
    fn test_send_without_reader_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path()).with_send_timeout(Duration::from_millis(150));
        channel.prepare().unwrap();

        let started = Instant::now();
        let result = channel.send(&Command::stop());
        assert!(matches!(result, Err(IpcError::NoReader(_))));
        assert!(started.elapsed() >= Duration::from_millis(150));
    }

    #[test]
    fn test_subscription_survives_writer_churn() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());
        channel.recreate().unwrap();

        let subscription = channel.listen().unwrap();
        let reader = thread::spawn(move || subscription.take(3).collect::<Vec<_>>());

        // Each send is a separate writer that opens, writes and closes.
        channel.send(&Command::hold(Path::new("/tmp/a.png"))).unwrap();
        channel.send(&Command::recognize(Path::new("/tmp/b.png"))).unwrap();
        channel.send(&Command::stop()).unwrap();

        let received = reader.join().unwrap();
        assert_eq!(
            received,
            vec![
                Command::hold(Path::new("/tmp/a.png")),
                Command::recognize(Path::new("/tmp/b.png")),
                Command::stop(),
            ]
        );
    }

    #[test]
    fn test_subscription_skips_malformed_records() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());
        channel.recreate().unwrap();

        let mut subscription = channel.listen().unwrap();

        let mut raw = OpenOptions::new().write(true).open(channel.path()).unwrap();
        raw.write_all(b"recognize::/tmp/old-style.png\n\n{\"action\":\"stop\"}\n")
            .unwrap();
        drop(raw);

        let command = subscription.next().unwrap();
        assert_eq!(command.action, Action::Stop);
    }

    #[test]
    fn test_idle_subscription_does_not_see_end_of_stream() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());
        channel.recreate().unwrap();

        let mut subscription = channel.listen().unwrap();
        // A writer comes and goes without sending anything
        drop(OpenOptions::new().write(true).open(channel.path()).unwrap());

        let fd = subscription.reader.get_ref().as_raw_fd();
        fcntl(fd, FcntlArg::F_SETFL(OFlag::O_NONBLOCK)).unwrap();
        let peek = subscription.reader.fill_buf().map(|buf| buf.len());
        assert_eq!(peek.unwrap_err().kind(), ErrorKind::WouldBlock);
        fcntl(fd, FcntlArg::F_SETFL(OFlag::empty())).unwrap();

        channel.send(&Command::stop()).unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || tx.send(subscription.next()).unwrap());
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(3)).unwrap(),
            Some(Command::stop())
        );
    }

    #[test]
    fn test_subscription_waits_for_late_writer() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());
        channel.recreate().unwrap();

        let mut subscription = channel.listen().unwrap();
        let (tx, rx) = std::sync::mpsc::channel();
        thread::spawn(move || {
            tx.send(subscription.next()).unwrap();
            tx.send(subscription.next()).unwrap();
        });

        thread::sleep(Duration::from_millis(300));
        assert!(rx.try_recv().is_err());

        channel.send(&Command::hold(Path::new("/tmp/a.png"))).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(3)).unwrap(),
            Some(Command::hold(Path::new("/tmp/a.png")))
        );

        // Idle again between clients
        thread::sleep(Duration::from_millis(300));
        channel.send(&Command::stop()).unwrap();
        assert_eq!(
            rx.recv_timeout(Duration::from_secs(3)).unwrap(),
            Some(Command::stop())
        );
    }

    #[test]
    fn test_listen_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        let channel = channel_in(dir.path());
        fs::write(channel.path(), "stale").unwrap();

        assert!(matches!(
            channel.listen(),
            Err(IpcError::ChannelUnavailable { .. })
        ));
    }
}
