//! LANChat Daemon - the networked half of a LANChat node
//!
//! Features:
//! - mDNS/DNS-SD announce + browse (`_lanchat._tcp.local.`)
//! - UDP broadcast chat bus on port 25896
//! - HTTP peer service for file upload/download and device listing
//! - Chat session with join/leave notices and file share notices
//! - Optional expiry of peers that stop announcing

pub mod bus;
pub mod chat;
pub mod discovery;
pub mod node;
pub mod server;

pub use bus::{BroadcastBus, BusConfig, Delivery, Subscription};
pub use chat::ChatSession;
pub use discovery::{Browser, Discovery, PeerEventHandler, ResolvedPeer};
pub use node::LanNode;
pub use server::{bind_peer_listener, start_peer_server, PeerServerState};
