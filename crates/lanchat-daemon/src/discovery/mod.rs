//! Peer discovery over mDNS / DNS-SD
//!
//! Architecture:
//! - Announcer: registers `{label}_{port}._lanchat._tcp.local.`
//! - Browser: filters peer events and writes the device registry
//! - mdns pump: thread translating `mdns_sd` events into `PeerEventHandler` calls

pub mod announcer;
pub mod browser;
pub mod mdns;

pub use announcer::{Announcement, Announcer};
pub use browser::Browser;
pub use mdns::Discovery;

use std::net::IpAddr;

pub const SERVICE_TYPE: &str = "_lanchat._tcp.local.";

/// Advertised in the TXT record; peers may refuse incompatible versions
pub const PROTOCOL_VERSION: &str = "1.0";

/// Instance name unique per host+port, e.g. `LANChat_9001`
pub fn instance_name(label: &str, port: u16) -> String {
    format!("{}_{}", label, port)
}

/// `LANChat_9001._lanchat._tcp.local.` -> `LANChat_9001`
pub fn normalize_instance_name(fullname: &str) -> &str {
    fullname
        .strip_suffix(SERVICE_TYPE)
        .and_then(|name| name.strip_suffix('.'))
        .unwrap_or(fullname)
}

/// A peer as reported by the discovery protocol, before filtering
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedPeer {
    pub name: String,
    pub addresses: Vec<IpAddr>,
    pub port: u16,
    pub version: Option<String>,
}

/// The three callbacks the discovery protocol drives
pub trait PeerEventHandler: Send + Sync {
    fn on_join(&self, peer: ResolvedPeer);
    fn on_update(&self, peer: ResolvedPeer);
    fn on_leave(&self, name: &str);
}
