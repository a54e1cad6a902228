//! LAN node - wires every component for one running instance
//!
//! Startup order:
//! 1. pick the LAN address (config, then interface detection); with neither
//!    the node runs on loopback and only browses, announcing nothing
//! 2. bind the peer HTTP listener (port 0 = ephemeral) and serve
//! 3. start discovery with the real port (failure leaves the node undiscoverable)
//! 4. create the broadcast bus (started by whoever consumes it)
//! 5. optional peer eviction sweeper

use crate::bus::{BroadcastBus, BusConfig};
use crate::chat::ChatSession;
use crate::discovery::mdns::refresh_interval;
use crate::discovery::Discovery;
use crate::server::{bind_peer_listener, start_peer_server, PeerServerState};
use anyhow::Result;
use lanchat_core::{detect_lan_ip, DeviceRegistry, NodeConfig, TransferClient};
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tracing::{info, warn};

pub struct LanNode {
    config: NodeConfig,
    local_address: SocketAddr,
    registry: Arc<DeviceRegistry>,
    bus: Arc<BroadcastBus>,
    discovery: Option<Discovery>,
    server: JoinHandle<()>,
    sweeper: Option<JoinHandle<()>>,
}

impl LanNode {
    pub async fn start(config: NodeConfig) -> Result<Self> {
        let advertise = choose_address(config.advertise_ip, detect_lan_ip);
        let ip = advertise.unwrap_or_else(|| {
            warn!("⚠️ No LAN address found, running passive-only on loopback");
            Ipv4Addr::LOCALHOST
        });

        let listener = bind_peer_listener(config.port.unwrap_or(0)).await?;
        let port = listener.local_addr()?.port();
        let local_address = SocketAddr::from((ip, port));

        let registry = Arc::new(DeviceRegistry::with_local_address(local_address));
        let state = Arc::new(PeerServerState {
            registry: Arc::clone(&registry),
            shared_dir: config.shared_dir.clone(),
        });
        let (_, server) = start_peer_server(listener, state).await?;

        let refresh = config.peer_ttl().map(refresh_interval);
        let discovery = match Discovery::start(&config.label, advertise, local_address, Arc::clone(&registry), refresh) {
            Ok(discovery) => Some(discovery),
            Err(e) => {
                warn!("⚠️ Peer discovery disabled: {}", e);
                None
            }
        };

        let bus = Arc::new(BroadcastBus::new(BusConfig::from(&config)));

        let sweeper = config
            .peer_ttl()
            .map(|ttl| spawn_peer_sweeper(Arc::clone(&registry), ttl));

        info!("🚀 LANChat node up at {}", local_address);
        Ok(Self {
            config,
            local_address,
            registry,
            bus,
            discovery,
            server,
            sweeper,
        })
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Advertised `ip:port`
    pub fn local_address(&self) -> SocketAddr {
        self.local_address
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    pub fn bus(&self) -> &Arc<BroadcastBus> {
        &self.bus
    }

    pub fn is_discoverable(&self) -> bool {
        self.discovery
            .as_ref()
            .is_some_and(Discovery::is_advertising)
    }

    pub fn transfer_client(&self) -> TransferClient {
        TransferClient::new(self.config.download_dir.clone())
    }

    pub fn chat_session(&self, username: impl Into<String>) -> ChatSession {
        ChatSession::new(Arc::clone(&self.bus), username, self.config.shared_dir.clone())
    }

    pub fn shutdown(self) {
        drop(self);
    }
}

impl Drop for LanNode {
    fn drop(&mut self) {
        self.bus.stop();
        self.discovery.take();
        if let Some(sweeper) = self.sweeper.take() {
            sweeper.abort();
        }
        self.server.abort();
        info!("✅ LANChat node stopped");
    }
}

/// Address to announce: the configured one, else the detected LAN address.
///
/// `None` means there is nothing a peer could reach, so nothing is announced.
fn choose_address(configured: Option<Ipv4Addr>, detect: impl FnOnce() -> Option<Ipv4Addr>) -> Option<Ipv4Addr> {
    configured.or_else(detect)
}

/// Periodically evict devices not seen within `ttl`
pub fn spawn_peer_sweeper(registry: Arc<DeviceRegistry>, ttl: Duration) -> JoinHandle<()> {
    let period = (ttl / 2).max(Duration::from_secs(1));

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        loop {
            ticker.tick().await;
            for name in registry.evict_stale(ttl, SystemTime::now()) {
                info!("⌛ Peer expired: {}", name);
            }
        }
    })
}
