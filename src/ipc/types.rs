//! Command records exchanged between clients and the daemon.
//!
//! Each record is a single JSON object terminated by a newline:
//!
//! ```text
//! {"action":"hold","file_path":"/tmp/.tmpA1b2C3.png"}
//! {"action":"stop","file_path":null}
//! ```

use super::IpcError;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// What the daemon should do with a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Recognize the image, flush the hold buffer with it, copy to clipboard.
    Recognize,
    /// Recognize the image and keep the text for the next `Recognize`.
    Hold,
    /// Shut the daemon down.
    Stop,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Recognize => "recognize",
            Action::Hold => "hold",
            Action::Stop => "stop",
        }
    }
}

/// A single command sent over the channel.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    pub action: Action,
    #[serde(default)]
    pub file_path: Option<String>,
}

impl Command {
    pub fn recognize(path: &Path) -> Self {
        Self::with_file(Action::Recognize, path)
    }

    pub fn hold(path: &Path) -> Self {
        Self::with_file(Action::Hold, path)
    }

    pub fn stop() -> Self {
        Self {
            action: Action::Stop,
            file_path: None,
        }
    }

    pub fn with_file(action: Action, path: &Path) -> Self {
        Self {
            action,
            file_path: Some(path.to_string_lossy().into_owned()),
        }
    }

    /// Encode as one newline-terminated record.
    pub fn encode(&self) -> Result<Vec<u8>, IpcError> {
        let mut record =
            serde_json::to_vec(self).map_err(|e| IpcError::Serialization(e.to_string()))?;
        record.push(b'\n');
        Ok(record)
    }

    /// Decode one record. Surrounding whitespace (including the newline) is ignored.
    pub fn decode(record: &[u8]) -> Result<Self, IpcError> {
        serde_json::from_slice(record.trim_ascii()).map_err(IpcError::MalformedCommand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_is_single_line_json() {
        let cmd = Command::hold(Path::new("/tmp/shot.png"));
        let record = cmd.encode().unwrap();
        assert_eq!(record.last(), Some(&b'\n'));
        assert_eq!(record.iter().filter(|&&b| b == b'\n').count(), 1);

        let text = String::from_utf8(record).unwrap();
        assert_eq!(
            text,
            "{\"action\":\"hold\",\"file_path\":\"/tmp/shot.png\"}\n"
        );
    }

    #[test]
    fn test_stop_encodes_null_path() {
        let text = String::from_utf8(Command::stop().encode().unwrap()).unwrap();
        assert_eq!(text, "{\"action\":\"stop\",\"file_path\":null}\n");
    }

    #[test]
    fn test_decode_path_with_delimiters() {
        let cmd = Command::decode(br#"{"action":"recognize","file_path":"/tmp/a::b\nc.png"}"#)
            .unwrap();
        assert_eq!(cmd.action, Action::Recognize);
        assert_eq!(cmd.file_path.as_deref(), Some("/tmp/a::b\nc.png"));
    }

    #[test]
    fn test_decode_missing_path_and_extra_fields() {
        let cmd = Command::decode(b"{\"action\":\"stop\",\"v\":2}\n").unwrap();
        assert_eq!(cmd, Command::stop());
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            Command::decode(b"recognize::/tmp/x.png"),
            Err(IpcError::MalformedCommand(_))
        ));
        assert!(matches!(
            Command::decode(b"{\"action\":\"explode\"}"),
            Err(IpcError::MalformedCommand(_))
        ));
    }

    #[test]
    fn test_action_names() {
        assert_eq!(Action::Recognize.as_str(), "recognize");
        assert_eq!(Action::Hold.as_str(), "hold");
        assert_eq!(Action::Stop.as_str(), "stop");
    }
}
