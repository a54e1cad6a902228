//! Browser - turns discovery events into registry mutations
//!
//! Every join/update goes through the same pipeline:
//! 1. pick a concrete IPv4 address (drop the event if there is none)
//! 2. drop our own advertised address
//! 3. drop link-local addresses
//! 4. upsert

use super::{PeerEventHandler, ResolvedPeer, PROTOCOL_VERSION};
use lanchat_core::{is_link_local, Device, DeviceRegistry, Upsert};
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Why a discovery event did not reach the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dropped {
    Unresolvable,
    SelfAddress,
    LinkLocal,
}

pub struct Browser {
    registry: Arc<DeviceRegistry>,
    local_address: SocketAddr,
}

impl Browser {
    pub fn new(registry: Arc<DeviceRegistry>, local_address: SocketAddr) -> Self {
        Self {
            registry,
            local_address,
        }
    }

    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    /// First IPv4 address, preferring routable ones over link-local
    fn select_address(peer: &ResolvedPeer) -> Option<SocketAddr> {
        let mut v4: Vec<IpAddr> = peer
            .addresses
            .iter()
            .copied()
            .filter(IpAddr::is_ipv4)
            .collect();
        v4.sort();

        v4.iter()
            .find(|ip| !is_link_local(**ip))
            .or_else(|| v4.first())
            .map(|ip| SocketAddr::new(*ip, peer.port))
    }

    /// Run the filter pipeline; `Ok` carries the address to record
    pub fn admit(&self, peer: &ResolvedPeer) -> Result<SocketAddr, Dropped> {
        let addr = Self::select_address(peer).ok_or(Dropped::Unresolvable)?;

        if addr == self.local_address {
            return Err(Dropped::SelfAddress);
        }
        if is_link_local(addr.ip()) {
            return Err(Dropped::LinkLocal);
        }
        Ok(addr)
    }

    fn record(&self, peer: ResolvedPeer) {
        if let Some(version) = peer.version.as_deref() {
            if version != PROTOCOL_VERSION {
                warn!(peer = %peer.name, %version, "Peer advertises a different protocol version");
            }
        }

        let addr = match self.admit(&peer) {
            Ok(addr) => addr,
            Err(Dropped::Unresolvable) => {
                warn!(peer = %peer.name, "Dropping peer event: no IPv4 address");
                return;
            }
            Err(reason) => {
                debug!(peer = %peer.name, ?reason, "Dropping peer event");
                return;
            }
        };

        match self.registry.upsert(Device::new(peer.name.clone(), addr)) {
            Upsert::Inserted => {
                info!("🔗 Peer joined: {} ({})", peer.name, addr);
                info!("   Devices online: {}", self.registry.len());
            }
            Upsert::Updated => debug!("Peer updated: {} ({})", peer.name, addr),
            Upsert::Rejected => debug!("Registry refused own address for {}", peer.name),
        }
    }
}

impl PeerEventHandler for Browser {
    fn on_join(&self, peer: ResolvedPeer) {
        self.record(peer);
    }

    fn on_update(&self, peer: ResolvedPeer) {
        self.record(peer);
    }

    fn on_leave(&self, name: &str) {
        if self.registry.remove(name) {
            info!("🔌 Peer left: {}", name);
            info!("   Devices online: {}", self.registry.len());
        }
    }
}
