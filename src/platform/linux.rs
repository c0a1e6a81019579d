//! Linux desktop sessions (Xorg, GNOME, other Wayland compositors)

use super::{DisplayServer, Platform, PlatformError, ScreenCapture, TextOutput};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::Path;
use std::process::{Command, Stdio};
use tracing::debug;

/// Xorg: `maim` for capture, `xclip` for the clipboard.
pub struct XorgPlatform;

/// GNOME (Wayland): `gnome-screenshot` for capture, `wl-copy` for the clipboard.
pub struct GnomePlatform;

/// Other Wayland compositors: `slurp` + `grim` for capture, `wl-copy` for the clipboard.
pub struct WaylandPlatform;

impl ScreenCapture for XorgPlatform {
    fn capture(&self, dest: &Path) -> Result<(), PlatformError> {
        let mut cmd = Command::new("maim");
        cmd.args(["--select", "--hidecursor", "--format=png", "--quality", "1"])
            .arg(dest);
        run_capture(cmd, dest)
    }
}

impl TextOutput for XorgPlatform {
    fn copy_to_clipboard(&self, text: &str) -> Result<(), PlatformError> {
        pipe_text("xclip", &["-selection", "clipboard"], text)
    }
}

impl Platform for XorgPlatform {
    fn display_server(&self) -> DisplayServer {
        DisplayServer::Xorg
    }

    fn required_programs(&self) -> &'static [&'static str] {
        &["maim", "xclip"]
    }
}

impl ScreenCapture for GnomePlatform {
    fn capture(&self, dest: &Path) -> Result<(), PlatformError> {
        let mut cmd = Command::new("gnome-screenshot");
        cmd.args(["-a", "-f"]).arg(dest);
        run_capture(cmd, dest)
    }
}

impl TextOutput for GnomePlatform {
    fn copy_to_clipboard(&self, text: &str) -> Result<(), PlatformError> {
        pipe_text("wl-copy", &[], text)
    }
}

impl Platform for GnomePlatform {
    fn display_server(&self) -> DisplayServer {
        DisplayServer::Gnome
    }

    fn required_programs(&self) -> &'static [&'static str] {
        &["gnome-screenshot", "wl-copy"]
    }
}

impl ScreenCapture for WaylandPlatform {
    fn capture(&self, dest: &Path) -> Result<(), PlatformError> {
        let selection = Command::new("slurp")
            .stderr(Stdio::null())
            .output()
            .map_err(|e| spawn_error("slurp", e))?;

        // slurp exits non-zero when the selection is aborted
        if !selection.status.success() {
            return Err(PlatformError::CaptureCancelled);
        }

        let geometry = String::from_utf8_lossy(&selection.stdout).trim().to_string();
        debug!("Selected region {}", geometry);

        let mut cmd = Command::new("grim");
        cmd.arg("-g").arg(&geometry).arg(dest);
        run_capture(cmd, dest)
    }
}

impl TextOutput for WaylandPlatform {
    fn copy_to_clipboard(&self, text: &str) -> Result<(), PlatformError> {
        pipe_text("wl-copy", &[], text)
    }
}

impl Platform for WaylandPlatform {
    fn display_server(&self) -> DisplayServer {
        DisplayServer::Wayland
    }

    fn required_programs(&self) -> &'static [&'static str] {
        &["grim", "slurp", "wl-copy"]
    }
}

/// Run a capture tool; a non-zero exit or an empty image counts as cancelled.
fn run_capture(mut cmd: Command, dest: &Path) -> Result<(), PlatformError> {
    let program = cmd.get_program().to_string_lossy().into_owned();
    let status = cmd.status().map_err(|e| spawn_error(&program, e))?;

    if !status.success() {
        debug!("{} exited with {}", program, status);
        return Err(PlatformError::CaptureCancelled);
    }

    // gnome-screenshot exits successfully even when the selection is aborted
    match fs::metadata(dest) {
        Ok(meta) if meta.len() > 0 => Ok(()),
        _ => Err(PlatformError::CaptureCancelled),
    }
}

/// Feed `text` to a clipboard tool on stdin.
fn pipe_text(program: &str, args: &[&str], text: &str) -> Result<(), PlatformError> {
    let mut child = Command::new(program)
        .args(args)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .map_err(|e| spawn_error(program, e))?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin
            .write_all(text.as_bytes())
            .map_err(|e| PlatformError::Clipboard(format!("{}: {}", program, e)))?;
    }

    let status = child
        .wait()
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

fn spawn_error(program: &str, e: std::io::Error) -> PlatformError {
    if e.kind() == ErrorKind::NotFound {
        PlatformError::MissingProgram(program.to_string())
    } else {
        PlatformError::Capture(format!("{}: {}", program, e))
    }
}
