//! Broadcast Envelope - the chat wire format
//!
//! One JSON object per UDP datagram:
//! `{"username": ..., "message": ..., "file_info"?: {"name", "size", "type"}}`
//!
//! No length prefix, no framing. Anything that is not valid UTF-8 JSON of
//! this shape is a malformed envelope and gets dropped by the receiver.

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Receive buffer size, and therefore the largest envelope we will send
pub const MAX_DATAGRAM_SIZE: usize = 4096;

/// Sender name used for join/leave notices
pub const SYSTEM_SENDER: &str = "system";

/// Metadata about a shared or transferred file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub name: String,
    #[serde(rename = "size")]
    pub size_bytes: u64,
    #[serde(rename = "type")]
    pub mime_type: String,
}

impl FileInfo {
    pub fn new(name: impl Into<String>, size_bytes: u64, mime_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            size_bytes,
            mime_type: mime_type.into(),
        }
    }

    /// Build from a file on disk (size from metadata, MIME type from extension)
    pub fn from_path(path: &Path) -> Result<Self> {
        let metadata = match std::fs::metadata(path) {
            Ok(m) if m.is_file() => m,
            Ok(_) => return Err(ChatError::FileNotFound(path.to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ChatError::FileNotFound(path.to_path_buf()))
            }
            Err(e) => return Err(e.into()),
        };

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| ChatError::FileNotFound(path.to_path_buf()))?;

        Ok(Self {
            name,
            size_bytes: metadata.len(),
            mime_type: guess_mime_type(path),
        })
    }
}

/// MIME type from the file extension, `application/octet-stream` when unknown
pub fn guess_mime_type(path: &Path) -> String {
    mime_guess::from_path(path)
        .first_or_octet_stream()
        .essence_str()
        .to_string()
}

/// A chat message or file notice travelling over the broadcast bus
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(rename = "username")]
    pub sender: String,
    #[serde(rename = "message", default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub file_info: Option<FileInfo>,
}

impl Envelope {
    /// Plain chat message
    pub fn text(sender: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            text: text.into(),
            file_info: None,
        }
    }

    /// Join/leave style notice from the `system` sender
    pub fn system(text: impl Into<String>) -> Self {
        Self::text(SYSTEM_SENDER, text)
    }

    /// Announce a file that peers can download by name
    pub fn file_notice(sender: impl Into<String>, info: FileInfo) -> Self {
        Self {
            sender: sender.into(),
            text: format!("shared a file: {}", info.name),
            file_info: Some(info),
        }
    }

    pub fn is_system(&self) -> bool {
        self.sender == SYSTEM_SENDER
    }

    /// Serialize to a single datagram payload
    pub fn encode(&self) -> Result<Vec<u8>> {
        let payload =
            serde_json::to_vec(self).map_err(|e| ChatError::SendFailed(e.to_string()))?;

        if payload.len() > MAX_DATAGRAM_SIZE {
            return Err(ChatError::SendFailed(format!(
                "envelope is {} bytes, limit is {}",
                payload.len(),
                MAX_DATAGRAM_SIZE
            )));
        }

        Ok(payload)
    }

    /// Parse a received datagram
    pub fn decode(payload: &[u8]) -> Result<Self> {
        let text = std::str::from_utf8(payload)
            .map_err(|e| ChatError::MalformedEnvelope(format!("not UTF-8: {}", e)))?;

        serde_json::from_str(text).map_err(|e| ChatError::MalformedEnvelope(e.to_string()))
    }
}
