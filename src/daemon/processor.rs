//! The daemon's command loop.
//!
//! Commands are handled one at a time in arrival order. `Hold` recognizes
//! an image and keeps its text; `Recognize` joins everything held so far with
//! the new text and copies the result. Nothing here ends the loop except a
//! `Stop` command: engine, clipboard and notification failures are reported
//! to the user and the loop carries on.

use crate::engine::Recognizer;
use crate::ipc::{Action, Command};
use crate::output::ScreenshotArchive;
use crate::platform::{Notifier, TextOutput};
use std::fs;
use std::iter;
use std::ops::ControlFlow;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Placed between held fragments and the final recognition.
pub const JOIN_DELIMITER: &str = "、";

/// Processor state, derived from the hold buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessorState {
    /// Nothing held
    Idle,
    /// At least one fragment waiting for a `Recognize`
    Holding,
}

pub struct CommandProcessor {
    engine: Box<dyn Recognizer>,
    clipboard: Box<dyn TextOutput>,
    notifier: Box<dyn Notifier>,
    archive: Option<ScreenshotArchive>,
    hold: Vec<String>,
}

impl CommandProcessor {
    pub fn new(
        engine: Box<dyn Recognizer>,
        clipboard: Box<dyn TextOutput>,
        notifier: Box<dyn Notifier>,
    ) -> Self {
        Self {
            engine,
            clipboard,
            notifier,
            archive: None,
            hold: Vec::new(),
        }
    }

    /// Archive every recognized screenshot into `archive`.
    pub fn with_archive(mut self, archive: Option<ScreenshotArchive>) -> Self {
        self.archive = archive;
        self
    }

    pub fn state(&self) -> ProcessorState {
        if self.hold.is_empty() {
            ProcessorState::Idle
        } else {
            ProcessorState::Holding
        }
    }

    /// Fragments held so far, oldest first.
    pub fn held(&self) -> &[String] {
        &self.hold
    }

    /// Handle commands until a `Stop` arrives or the source runs dry.
    pub fn run<I>(&mut self, commands: I)
    where
        I: IntoIterator<Item = Command>,
    {
        for command in commands {
            if self.handle(command).is_break() {
                break;
            }
        }
    }

    /// Handle one command. `Break` means the daemon should shut down.
    pub fn handle(&mut self, command: Command) -> ControlFlow<()> {
        match command.action {
            Action::Stop => {
                if !self.hold.is_empty() {
                    debug!("Discarding {} held fragment(s)", self.hold.len());
                }
                self.notify("Stopped listening.");
                ControlFlow::Break(())
            }
            action @ (Action::Hold | Action::Recognize) => {
                let Some(image) = command
                    .file_path
                    .as_deref()
                    .map(Path::new)
                    .filter(|path| path.is_file())
                else {
                    debug!(
                        "Dropping {} command, no such file: {:?}",
                        action.as_str(),
                        command.file_path
                    );
                    return ControlFlow::Continue(());
                };

                if action == Action::Hold {
                    self.hold(image);
                } else {
                    self.recognize(image);
                }
                discard(image);
                ControlFlow::Continue(())
            }
        }
    }

    fn hold(&mut self, image: &Path) {
        match self.engine.recognize(image) {
            Ok(text) => {
                info!("Holding fragment {} ({} chars)", self.hold.len() + 1, text.chars().count());
                self.notify(&format!("Holding {}", text));
                self.hold.push(text);
            }
            Err(e) => {
                error!("Recognition failed for {}: {}", image.display(), e);
                self.notify(&e.to_string());
            }
        }
    }

    fn recognize(&mut self, image: &Path) {
        let text = match self.engine.recognize(image) {
            Ok(text) => text,
            Err(e) => {
                error!("Recognition failed for {}: {}", image.display(), e);
                self.notify(&e.to_string());
                return;
            }
        };

        let joined = self
            .hold
            .iter()
            .map(String::as_str)
            .chain(iter::once(text.as_str()))
            .collect::<Vec<_>>()
            .join(JOIN_DELIMITER);

        match self.clipboard.copy_to_clipboard(&joined) {
            Ok(()) => self.notify(&format!("Copied {}", joined)),
            Err(e) => {
                error!("Clipboard copy failed: {}", e);
                self.notify(&format!("Could not copy {}: {}", joined, e));
            }
        }

        if let Some(archive) = &self.archive {
            if let Err(e) = archive.store(image, &joined) {
                warn!("{}", e);
            }
        }

        self.hold.clear();
    }

    fn notify(&self, message: &str) {
        if let Err(e) = self.notifier.notify(message) {
            warn!("{}", e);
        }
    }
}

/// Captures are temporary files; delete them once consumed.
fn discard(image: &Path) {
    if let Err(e) = fs::remove_file(image) {
        warn!("Failed to remove {}: {}", image.display(), e);
    }
}
