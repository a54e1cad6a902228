//! LAN address helpers

use local_ip_address::list_afinet_netifas;
use std::net::{IpAddr, Ipv4Addr};
use tracing::{info, warn};

/// 169.254.0.0/16 - an interface that never got a DHCP lease
pub fn is_link_local(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_link_local(),
        IpAddr::V6(v6) => (v6.segments()[0] & 0xffc0) == 0xfe80,
    }
}

fn is_private_ipv4(ip: Ipv4Addr) -> bool {
    let octets = ip.octets();
    match octets[0] {
        10 => true,
        172 => (16..=31).contains(&octets[1]),
        192 => octets[1] == 168,
        _ => false,
    }
}

/// Pick the address to advertise from `(interface, ip)` pairs.
///
/// Loopback and link-local are skipped. `192.168.*` wins, then any other
/// private range, then whatever IPv4 is left.
pub fn pick_lan_ip(interfaces: &[(String, IpAddr)]) -> Option<Ipv4Addr> {
    let candidates: Vec<Ipv4Addr> = interfaces
        .iter()
        .filter_map(|(_, ip)| match ip {
            IpAddr::V4(v4) if !v4.is_loopback() && !v4.is_link_local() => Some(*v4),
            _ => None,
        })
        .collect();

    candidates
        .iter()
        .find(|ip| ip.octets()[..2] == [192, 168])
        .or_else(|| candidates.iter().find(|ip| is_private_ipv4(**ip)))
        .or_else(|| candidates.first())
        .copied()
}

/// Detect this machine's LAN-facing IPv4 address
pub fn detect_lan_ip() -> Option<Ipv4Addr> {
    let interfaces = match list_afinet_netifas() {
        Ok(ifaces) => ifaces,
        Err(e) => {
            warn!(error = %e, "failed to enumerate network interfaces");
            return None;
        }
    };

    let picked = pick_lan_ip(&interfaces);
    match picked {
        Some(ip) => info!(%ip, "detected LAN address"),
        None => warn!("no usable LAN IPv4 address found"),
    }
    picked
}
