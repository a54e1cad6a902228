//! LANChat Core - Serverless LAN chat and file sharing
//!
//! Features:
//! - Device registry: thread-safe table of discovered peers
//! - Envelope codec: one JSON object per broadcast datagram
//! - Transfer coordinator: resolve a peer, push/pull files over HTTP
//! - Node configuration (~/.lanchat/config.json)
//! - LAN address detection

pub mod config;
pub mod envelope;
pub mod error;
pub mod net;
pub mod registry;
pub mod transfer;

pub use config::{load_config, save_config, get_config_path, NodeConfig, BROADCAST_PORT};
pub use envelope::{Envelope, FileInfo, MAX_DATAGRAM_SIZE, SYSTEM_SENDER};
pub use error::{ChatError, Result};
pub use net::{detect_lan_ip, is_link_local};
pub use registry::{Device, DeviceListing, DeviceRegistry, Upsert};
pub use transfer::{resolve_target, sanitize_file_name, NoPrompt, TargetPrompt, TransferClient, TransferTarget};
