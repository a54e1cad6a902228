//! Node configuration
//!
//! - Stored in ~/.lanchat/config.json
//! - Missing file means defaults
//! - CLI flags override whatever is loaded

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// Well-known UDP port shared by every instance on the segment
pub const BROADCAST_PORT: u16 = 25896;

/// Default hand-off queue capacity between the receive loop and consumers
pub const DEFAULT_QUEUE_CAPACITY: usize = 256;

/// Default human label; the instance name becomes `{label}_{port}`
pub const DEFAULT_LABEL: &str = "LANChat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    pub label: String,
    /// HTTP/advertised port, `None` picks a free one
    pub port: Option<u16>,
    /// LAN-facing IPv4 to advertise, `None` auto-detects
    pub advertise_ip: Option<Ipv4Addr>,
    pub broadcast_port: u16,
    pub broadcast_addr: Ipv4Addr,
    pub queue_capacity: usize,
    /// Where uploads land and downloads are served from
    pub shared_dir: PathBuf,
    /// Where `download` writes files
    pub download_dir: PathBuf,
    /// Evict peers unseen for this many seconds; `None` keeps them until they leave
    pub peer_ttl_secs: Option<u64>,
    pub username: Option<String>,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            label: DEFAULT_LABEL.to_string(),
            port: None,
            advertise_ip: None,
            broadcast_port: BROADCAST_PORT,
            broadcast_addr: Ipv4Addr::BROADCAST,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            shared_dir: PathBuf::from("uploads"),
            download_dir: PathBuf::from("."),
            peer_ttl_secs: None,
            username: None,
        }
    }
}

impl NodeConfig {
    pub fn peer_ttl(&self) -> Option<Duration> {
        self.peer_ttl_secs.map(Duration::from_secs)
    }
}

/// Get config file path (~/.lanchat/config.json)
pub fn get_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".lanchat")
        .join("config.json")
}

/// Load config from the default location
pub fn load_config() -> Result<NodeConfig> {
    load_config_from(&get_config_path())
}

pub fn load_config_from(path: &std::path::Path) -> Result<NodeConfig> {
    if !path.exists() {
        return Ok(NodeConfig::default());
    }

    let content = std::fs::read_to_string(path)?;
    let config: NodeConfig = serde_json::from_str(&content)?;
    Ok(config)
}

/// Save config to the default location
pub fn save_config(config: &NodeConfig) -> Result<()> {
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &NodeConfig, path: &std::path::Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let content = serde_json::to_string_pretty(config)?;
    std::fs::write(path, content)?;

    tracing::info!("Config saved to {:?}", path);
    Ok(())
}
