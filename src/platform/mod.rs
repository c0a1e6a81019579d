//! Platform abstraction layer for desktop-session specific tools.
//!
//! This module provides traits and implementations for:
//! - Interactive screen-region capture
//! - Clipboard copy
//! - Notifications
//!
//! The concrete variant is chosen once from the environment by
//! [`DisplayServer::detect`]; callers only see `dyn Platform`.

use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;

mod linux;

pub use linux::{GnomePlatform, WaylandPlatform, XorgPlatform};

#[derive(Error, Debug)]
pub enum PlatformError {
    #[error("{0} must be installed for clipocr to work.")]
    MissingProgram(String),

    #[error("Screen capture cancelled")]
    CaptureCancelled,

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Clipboard error: {0}")]
    Clipboard(String),

    #[error("Notification error: {0}")]
    Notification(String),
}

/// Trait for interactive screen-region capture
pub trait ScreenCapture: Send + Sync {
    /// Let the user select a region and write it as PNG to `dest`.
    fn capture(&self, dest: &Path) -> Result<(), PlatformError>;
}

/// Trait for platform-specific text output
pub trait TextOutput: Send + Sync {
    /// Copy text to clipboard
    fn copy_to_clipboard(&self, text: &str) -> Result<(), PlatformError>;
}

/// Trait for platform-specific notifications
pub trait Notifier: Send + Sync {
    /// Show a notification
    fn notify(&self, message: &str) -> Result<(), PlatformError>;
}

/// Combined platform interface
pub trait Platform: ScreenCapture + TextOutput {
    /// The session type this variant was selected for.
    fn display_server(&self) -> DisplayServer;

    /// External programs this variant shells out to.
    fn required_programs(&self) -> &'static [&'static str];

    /// Fail with the first required program that is not installed.
    fn check_programs(&self) -> Result<(), PlatformError> {
        match self
            .required_programs()
            .iter()
            .find(|program| !is_installed(program))
        {
            Some(missing) => Err(PlatformError::MissingProgram((*missing).to_string())),
            None => Ok(()),
        }
    }
}

/// Detect the current display environment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DisplayServer {
    Xorg,
    Gnome,
    Wayland,
}

impl DisplayServer {
    /// Detect the current display server
    pub fn detect() -> Self {
        let wayland = std::env::var_os("WAYLAND_DISPLAY").is_some();
        let desktop = std::env::var("XDG_CURRENT_DESKTOP").ok();
        Self::from_env(wayland, desktop.as_deref())
    }

    /// Pure selection rule: no Wayland socket means Xorg; GNOME's Wayland
    /// session gets its own capture tool.
    pub fn from_env(wayland_display: bool, current_desktop: Option<&str>) -> Self {
        if !wayland_display {
            DisplayServer::Xorg
        } else if current_desktop == Some("GNOME") {
            DisplayServer::Gnome
        } else {
            DisplayServer::Wayland
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DisplayServer::Xorg => "Xorg",
            DisplayServer::Gnome => "GNOME",
            DisplayServer::Wayland => "Wayland",
        }
    }
}

/// Platform variant for a display server.
pub fn for_display_server(server: DisplayServer) -> Box<dyn Platform> {
    match server {
        DisplayServer::Xorg => Box::new(XorgPlatform),
        DisplayServer::Gnome => Box::new(GnomePlatform),
        DisplayServer::Wayland => Box::new(WaylandPlatform),
    }
}

/// Clipboard half of the platform variant for a display server.
pub fn text_output_for(server: DisplayServer) -> Box<dyn TextOutput> {
    match server {
        DisplayServer::Xorg => Box::new(XorgPlatform),
        DisplayServer::Gnome => Box::new(GnomePlatform),
        DisplayServer::Wayland => Box::new(WaylandPlatform),
    }
}

/// Platform variant for the current session.
pub fn detect() -> Box<dyn Platform> {
    let server = DisplayServer::detect();
    debug!("Detected display server: {}", server.name());
    for_display_server(server)
}

/// Check whether a program is on `PATH`.
pub fn is_installed(program: &str) -> bool {
    Command::new("which")
        .arg(program)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_wayland_is_xorg() {
        assert_eq!(DisplayServer::from_env(false, None), DisplayServer::Xorg);
        assert_eq!(
            DisplayServer::from_env(false, Some("GNOME")),
            DisplayServer::Xorg
        );
    }

    #[test]
    fn test_gnome_wayland() {
        assert_eq!(
            DisplayServer::from_env(true, Some("GNOME")),
            DisplayServer::Gnome
        );
    }

    #[test]
    fn test_other_wayland() {
        assert_eq!(DisplayServer::from_env(true, None), DisplayServer::Wayland);
        assert_eq!(
            DisplayServer::from_env(true, Some("sway")),
            DisplayServer::Wayland
        );
    }

    #[test]
    fn test_display_server_names() {
        assert_eq!(DisplayServer::Xorg.name(), "Xorg");
        assert_eq!(DisplayServer::Gnome.name(), "GNOME");
        assert_eq!(DisplayServer::Wayland.name(), "Wayland");
    }

    #[test]
    fn test_variant_matches_server() {
        for server in [
            DisplayServer::Xorg,
            DisplayServer::Gnome,
            DisplayServer::Wayland,
        ] {
            assert_eq!(for_display_server(server).display_server(), server);
        }
    }

    #[test]
    fn test_required_programs() {
        assert_eq!(XorgPlatform.required_programs(), &["maim", "xclip"]);
        assert_eq!(
            GnomePlatform.required_programs(),
            &["gnome-screenshot", "wl-copy"]
        );
        assert_eq!(
            WaylandPlatform.required_programs(),
            &["grim", "slurp", "wl-copy"]
        );
    }

    #[test]
    fn test_is_installed_missing() {
        assert!(!is_installed("clipocr-definitely-not-a-program"));
    }

    #[test]
    fn test_missing_program_message() {
        let err = PlatformError::MissingProgram("maim".to_string());
        assert_eq!(err.to_string(), "maim must be installed for clipocr to work.");
    }
}
