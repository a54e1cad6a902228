//! Error taxonomy shared by every LANChat component

use std::path::PathBuf;
use thiserror::Error;

/// Result alias for LANChat operations
pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    /// The mDNS daemon could not be created, or registering/browsing failed
    #[error("discovery unavailable: {0}")]
    DiscoveryUnavailable(String),

    /// A datagram that does not decode to an envelope
    #[error("malformed envelope: {0}")]
    MalformedEnvelope(String),

    /// A single broadcast attempt failed
    #[error("broadcast send failed: {0}")]
    SendFailed(String),

    #[error("no peers found on the local network")]
    NoPeersFound,

    #[error("device number {index} is out of range (1-{count})")]
    IndexOutOfRange { index: i64, count: usize },

    #[error("invalid selection: {0}")]
    InvalidSelection(String),

    #[error("invalid address '{0}', expected ip:port")]
    InvalidFormat(String),

    #[error("no device at position {0}")]
    NotFound(usize),

    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("upload failed: {0}")]
    UploadFailed(String),

    #[error("download failed: {0}")]
    DownloadFailed(String),

    /// A peer's HTTP endpoint could not be queried
    #[error("peer request failed: {0}")]
    PeerRequest(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
