//! Resident recognition helper process.
//!
//! The helper loads the model once, announces `{"ready": true}` on stdout and
//! then answers one JSON line per request:
//!
//! ```text
//! -> {"path":"/tmp/.tmpX.png"}
//! <- {"text":"こんにちは"}      or      <- {"error":"..."}
//! ```

use super::{EngineError, EngineRuntime, Recognizer};
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use tracing::{debug, info, warn};

const MANGA_OCR_HELPER: &str = r#"
import json
import sys

from manga_ocr import MangaOcr

mocr = MangaOcr(force_cpu=sys.argv[1] == "1")
print(json.dumps({"ready": True}), flush=True)

for line in sys.stdin:
    try:
        reply = {"text": mocr(json.loads(line)["path"])}
    except Exception as e:
        reply = {"error": str(e)}
    print(json.dumps(reply, ensure_ascii=False), flush=True)
"#;

#[derive(Serialize)]
struct Request<'a> {
    path: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Reply {
    Text { text: String },
    Error { error: String },
    Ready { ready: bool },
}

struct HelperProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: BufReader<ChildStdout>,
}

impl HelperProcess {
    /// Read replies until one parses; other stdout chatter is skipped.
    fn read_reply(&mut self) -> Result<Reply, EngineError> {
        let mut line = String::new();
        loop {
            line.clear();
            let read = self
                .stdout
                .read_line(&mut line)
                .map_err(|e| EngineError::Protocol(e.to_string()))?;
            if read == 0 {
                let status = self
                    .child
                    .wait()
                    .map(|s| s.to_string())
                    .unwrap_or_else(|e| e.to_string());
                return Err(EngineError::Crashed(status));
            }
            match serde_json::from_str::<Reply>(line.trim()) {
                Ok(reply) => return Ok(reply),
                Err(_) => debug!("engine: {}", line.trim_end()),
            }
        }
    }
}

impl Drop for HelperProcess {
    fn drop(&mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Recognizer backed by a long-lived helper process.
///
/// The helper is respawned on the next request if it dies.
pub struct HelperEngine {
    program: PathBuf,
    args: Vec<OsString>,
    process: Option<HelperProcess>,
}

impl HelperEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            program: program.into(),
            args,
            process: None,
        }
    }

    /// The manga-ocr helper from the downloaded runtime.
    pub fn manga_ocr(runtime: &EngineRuntime, force_cpu: bool) -> Result<Self, EngineError> {
        if !runtime.is_installed() {
            return Err(EngineError::NotInstalled(runtime.prefix().to_path_buf()));
        }
        let force_cpu = if force_cpu { "1" } else { "0" };
        Ok(Self::new(
            runtime.python(),
            vec!["-c".into(), MANGA_OCR_HELPER.into(), force_cpu.into()],
        ))
    }

    /// Spawn the helper and block until the model is loaded.
    pub fn start(&mut self) -> Result<(), EngineError> {
        self.process = None;
        info!("Loading recognition model...");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .spawn()
            .map_err(EngineError::Spawn)?;

        let (stdin, stdout) = match (child.stdin.take(), child.stdout.take()) {
            (Some(stdin), Some(stdout)) => (stdin, BufReader::new(stdout)),
            _ => {
                let _ = child.kill();
                let _ = child.wait();
                return Err(EngineError::Protocol("helper stdio not captured".into()));
            }
        };

        let mut process = HelperProcess {
            child,
            stdin,
            stdout,
        };

        loop {
            match process.read_reply()? {
                Reply::Ready { ready: true } => break,
                Reply::Ready { ready: false } => {}
                Reply::Error { error } => return Err(EngineError::Crashed(error)),
                Reply::Text { .. } => {
                    return Err(EngineError::Protocol("text before ready".into()));
                }
            }
        }

        info!("Recognition model loaded (pid {})", process.child.id());
        self.process = Some(process);
        Ok(())
    }

    fn is_alive(&mut self) -> bool {
        match self.process.as_mut() {
            Some(process) => matches!(process.child.try_wait(), Ok(None)),
            None => false,
        }
    }
}

impl Recognizer for HelperEngine {
    fn recognize(&mut self, image: &Path) -> Result<String, EngineError> {
        if !self.is_alive() {
            if self.process.is_some() {
                warn!("Recognition engine exited, restarting");
            }
            self.start()?;
        }

        let process = self
            .process
            .as_mut()
            .ok_or_else(|| EngineError::Crashed("helper not running".into()))?;

        let path = image.to_string_lossy();
        let mut request = serde_json::to_vec(&Request { path: &path })
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        request.push(b'\n');

        let sent = process
            .stdin
            .write_all(&request)
            .and_then(|()| process.stdin.flush());
        if let Err(e) = sent {
            self.process = None;
            return Err(EngineError::Crashed(e.to_string()));
        }

        match process.read_reply() {
            Ok(Reply::Text { text }) => Ok(text),
            Ok(Reply::Error { error }) => Err(EngineError::RecognitionFailed(error)),
            Ok(Reply::Ready { .. }) => Err(EngineError::Protocol("unexpected ready".into())),
            Err(e) => {
                self.process = None;
                Err(e)
            }
        }
    }
}
