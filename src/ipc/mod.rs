//! Command channel between short-lived clients and the daemon.
//!
//! The rendezvous point is a FIFO at a well-known path. Clients open it for
//! writing, push one record and close it; the daemon is the only reader.

use std::path::PathBuf;
use thiserror::Error;

mod fifo;
mod types;

pub use fifo::{CommandChannel, Subscription};
pub use types::{Action, Command};

#[derive(Error, Debug)]
pub enum IpcError {
    #[error("Channel unavailable at {path}: {source}")]
    ChannelUnavailable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("No daemon is reading from {0}")]
    NoReader(PathBuf),

    #[error("Malformed command: {0}")]
    MalformedCommand(#[source] serde_json::Error),

    #[error("Send failed: {0}")]
    SendFailed(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
