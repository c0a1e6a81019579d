//! Clipboard copy for recognized text.
//!
//! Order of preference:
//! 1. the user's `clip_command`, with the text as its last argument
//! 2. the session's clipboard tool (`xclip` / `wl-copy`)
//! 3. an in-process `arboard` clipboard, if the tool is not installed

use crate::platform::{PlatformError, TextOutput};
use arboard::Clipboard;
use std::process::{Command, Stdio};
use std::sync::Mutex;
use tracing::{debug, info, warn};

pub struct ClipboardHandler {
    custom_args: Option<Vec<String>>,
    platform: Box<dyn TextOutput>,
    /// Kept alive for the daemon's lifetime; X11 selections vanish with their owner.
    fallback: Mutex<Option<Clipboard>>,
}

impl ClipboardHandler {
    pub fn new(custom_args: Option<Vec<String>>, platform: Box<dyn TextOutput>) -> Self {
        if let Some(args) = &custom_args {
            info!("Custom clip args: {:?}", args);
        }
        Self {
            custom_args,
            platform,
            fallback: Mutex::new(None),
        }
    }

    fn copy_with_custom(&self, args: &[String], text: &str) -> Result<(), PlatformError> {
        let (program, rest) = args
            .split_first()
            .ok_or_else(|| PlatformError::Clipboard("empty clip_command".into()))?;

        let status = Command::new(program)
            .args(rest)
            .arg(text)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .status()
            .map_err(|e| PlatformError::Clipboard(format!("{}: {}", program, e)))?;

        if status.success() {
            Ok(())
        } else {
            Err(PlatformError::Clipboard(format!(
                "{} exited with {}",
                program, status
            )))
        }
    }

    fn copy_with_fallback(&self, text: &str) -> Result<(), PlatformError> {
        let mut guard = self
            .fallback
            .lock()
            .map_err(|_| PlatformError::Clipboard("Clipboard mutex poisoned".into()))?;

        if guard.is_none() {
            *guard = Some(Clipboard::new().map_err(|e| PlatformError::Clipboard(e.to_string()))?);
        }

        match guard.as_mut() {
            Some(clipboard) => clipboard
                .set_text(text)
                .map_err(|e| PlatformError::Clipboard(e.to_string())),
            None => Err(PlatformError::Clipboard("Clipboard not available".into())),
        }
    }
}

impl TextOutput for ClipboardHandler {
    fn copy_to_clipboard(&self, text: &str) -> Result<(), PlatformError> {
        if let Some(args) = &self.custom_args {
            return self.copy_with_custom(args, text);
        }

        let copied = match self.platform.copy_to_clipboard(text) {
            Err(PlatformError::MissingProgram(program)) => {
                warn!("{} not found, using built-in clipboard", program);
                self.copy_with_fallback(text)
            }
            result => result,
        };
        copied?;

        debug!("Copied {} characters to clipboard", text.chars().count());
        Ok(())
    }
}
