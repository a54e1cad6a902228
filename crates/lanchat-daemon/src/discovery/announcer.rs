//! Announcer - advertise this node on the LAN

use super::{instance_name, PROTOCOL_VERSION, SERVICE_TYPE};
use lanchat_core::{ChatError, Result};
use mdns_sd::{ServiceDaemon, ServiceInfo};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{debug, info, warn};

/// Registers service instances on a shared mDNS daemon
pub struct Announcer {
    mdns: ServiceDaemon,
}

impl Announcer {
    pub fn new(mdns: ServiceDaemon) -> Self {
        Self { mdns }
    }

    /// Advertise `{label}_{port}` at `ip:port`.
    ///
    /// The returned guard unregisters on drop.
    pub fn announce(&self, label: &str, ip: Ipv4Addr, port: u16) -> Result<Announcement> {
        let service = build_service_info(label, ip, port)?;
        let fullname = service.get_fullname().to_string();

        self.mdns
            .register(service)
            .map_err(|e| ChatError::DiscoveryUnavailable(e.to_string()))?;

        info!("📡 mDNS: Advertising as {} on {}:{}", fullname, ip, port);
        Ok(Announcement {
            mdns: self.mdns.clone(),
            fullname,
        })
    }
}

/// mDNS host names must be a single `.local.` label
fn local_host_name() -> String {
    let hostname = gethostname::gethostname().to_string_lossy().to_string();
    let label: String = hostname
        .split('.')
        .next()
        .unwrap_or_default()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '-' })
        .collect();

    if label.is_empty() {
        "lanchat.local.".to_string()
    } else {
        format!("{}.local.", label)
    }
}

pub(crate) fn build_service_info(label: &str, ip: Ipv4Addr, port: u16) -> Result<ServiceInfo> {
    let properties = HashMap::from([("version".to_string(), PROTOCOL_VERSION.to_string())]);

    ServiceInfo::new(
        SERVICE_TYPE,
        &instance_name(label, port),
        &local_host_name(),
        IpAddr::V4(ip),
        port,
        properties,
    )
    .map_err(|e| ChatError::DiscoveryUnavailable(e.to_string()))
}

/// A live advertisement; dropping it withdraws the service
pub struct Announcement {
    mdns: ServiceDaemon,
    fullname: String,
}

impl Announcement {
    pub fn fullname(&self) -> &str {
        &self.fullname
    }
}

impl Drop for Announcement {
    fn drop(&mut self) {
        match self.mdns.unregister(&self.fullname) {
            Ok(_) => debug!("mDNS: Unregistered {}", self.fullname),
            Err(e) => warn!("mDNS: Failed to unregister {}: {}", self.fullname, e),
        }
    }
}
