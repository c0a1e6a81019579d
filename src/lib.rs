//! clipocr library exports for the binary, integration tests and fuzzing.
//!
//! A short-lived client captures a screen region and sends it over a FIFO to
//! a singleton daemon, which keeps the recognition model loaded and copies
//! the recognized text to the clipboard.

#[cfg(not(unix))]
compile_error!("clipocr relies on FIFOs and POSIX signals and only builds on Unix");

pub mod client;
pub mod config;
pub mod daemon;
pub mod engine;
pub mod ipc;
pub mod output;
pub mod panic_handler;
pub mod platform;

// Re-export commonly used types for convenience
pub use client::Client;
pub use config::{Config, RuntimePaths};
pub use daemon::{CommandProcessor, DaemonStatus, Supervisor};
pub use ipc::{Action, Command, CommandChannel};
