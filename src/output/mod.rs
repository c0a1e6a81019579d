//! Output handling: clipboard, notifications and the screenshot archive.

pub mod archive;
pub mod clipboard;
pub mod notify;

pub use archive::{ArchiveError, ScreenshotArchive};
pub use clipboard::ClipboardHandler;
pub use notify::DesktopNotifier;
