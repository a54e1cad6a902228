//! mDNS binding - owns the `mdns_sd` daemon and pumps its events
//!
//! `mdns_sd` has no distinct "updated" event: a `ServiceResolved` for a
//! name we already resolved is treated as an update.

use super::{normalize_instance_name, Announcement, Announcer, Browser, PeerEventHandler, ResolvedPeer, SERVICE_TYPE};
use lanchat_core::{ChatError, DeviceRegistry, Result};
use mdns_sd::{Receiver, ServiceDaemon, ServiceEvent, ServiceInfo};
use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Normalized peer event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PeerEvent {
    Joined(ResolvedPeer),
    Updated(ResolvedPeer),
    Left(String),
}

impl From<&ServiceInfo> for ResolvedPeer {
    fn from(info: &ServiceInfo) -> Self {
        Self {
            name: normalize_instance_name(info.get_fullname()).to_string(),
            addresses: info.get_addresses().iter().copied().collect(),
            port: info.get_port(),
            version: info.get_property_val_str("version").map(String::from),
        }
    }
}

/// Map one `mdns_sd` event, tracking which names have been resolved
pub fn translate(resolved: &mut HashSet<String>, event: ServiceEvent) -> Option<PeerEvent> {
    match event {
        ServiceEvent::ServiceResolved(info) => {
            let peer = ResolvedPeer::from(&info);
            if resolved.insert(peer.name.clone()) {
                Some(PeerEvent::Joined(peer))
            } else {
                Some(PeerEvent::Updated(peer))
            }
        }
        ServiceEvent::ServiceRemoved(_, fullname) => {
            let name = normalize_instance_name(&fullname).to_string();
            resolved.remove(&name);
            Some(PeerEvent::Left(name))
        }
        ServiceEvent::ServiceFound(_, fullname) => {
            debug!("mDNS: Found {}, resolving", fullname);
            None
        }
        _ => None,
    }
}

pub fn dispatch(handler: &dyn PeerEventHandler, event: PeerEvent) {
    match event {
        PeerEvent::Joined(peer) => handler.on_join(peer),
        PeerEvent::Updated(peer) => handler.on_update(peer),
        PeerEvent::Left(name) => handler.on_leave(&name),
    }
}

/// Outcome of waiting on a browse channel
pub(crate) enum Wait {
    Event(ServiceEvent),
    RefreshDue,
    Closed,
}

/// Anything the pump can wait on for discovery events
pub(crate) trait EventSource {
    fn wait(&self, deadline: Option<Instant>) -> Wait;
}

impl EventSource for Receiver<ServiceEvent> {
    fn wait(&self, deadline: Option<Instant>) -> Wait {
        let received = match deadline {
            Some(deadline) => self.recv_deadline(deadline).map_err(|_| ()),
            None => self.recv().map_err(|_| ()),
        };
        match received {
            Ok(event) => Wait::Event(event),
            Err(()) if deadline.is_some() && !self.is_disconnected() => Wait::RefreshDue,
            Err(()) => Wait::Closed,
        }
    }
}

/// Dispatch events from one browse channel.
///
/// Returns `true` when `refresh` elapsed and the caller should browse again,
/// `false` once the channel is closed.
pub(crate) fn drain(
    source: &impl EventSource,
    resolved: &mut HashSet<String>,
    handler: &dyn PeerEventHandler,
    refresh: Option<Duration>,
) -> bool {
    let deadline = refresh.map(|period| Instant::now() + period);
    loop {
        match source.wait(deadline) {
            Wait::Event(event) => {
                if let Some(event) = translate(resolved, event) {
                    dispatch(handler, event);
                }
            }
            Wait::RefreshDue => return true,
            Wait::Closed => return false,
        }
    }
}

/// How often to re-browse so `last_seen` keeps moving for live peers
pub fn refresh_interval(peer_ttl: Duration) -> Duration {
    (peer_ttl / 3).max(Duration::from_secs(1))
}

/// Run the browse loop on its own thread until the daemon shuts down.
///
/// mdns-sd answers record refreshes silently, so with `refresh` set the
/// thread browses again every period. The daemon replays its cache on a
/// new browse, which re-resolves every live peer.
fn spawn_event_pump(
    mdns: ServiceDaemon,
    first: Receiver<ServiceEvent>,
    handler: Arc<dyn PeerEventHandler>,
    refresh: Option<Duration>,
) -> std::io::Result<JoinHandle<()>> {
    std::thread::Builder::new()
        .name("lanchat-discovery".into())
        .spawn(move || {
            let mut resolved = HashSet::new();
            let mut events = first;
            while drain(&events, &mut resolved, handler.as_ref(), refresh) {
                events = match mdns.browse(SERVICE_TYPE) {
                    Ok(events) => events,
                    Err(e) => {
                        debug!("mDNS: Re-browse failed: {}", e);
                        break;
                    }
                };
                debug!("mDNS: Re-browsed {}", SERVICE_TYPE);
            }
            debug!("mDNS: Event pump stopped");
        })
}

/// Running announcer + browser pair
pub struct Discovery {
    mdns: ServiceDaemon,
    announcement: Option<Announcement>,
    pump: Option<JoinHandle<()>>,
}

impl Discovery {
    /// Browse for peers and, when `advertise` is set, announce
    /// `{label}_{port}` at that address.
    ///
    /// `local_address` is what the browser filters out as ourselves.
    /// A failed registration leaves discovery passive (we see others, they
    /// don't see us). Failing to create the daemon or to browse is an error.
    pub fn start(
        label: &str,
        advertise: Option<Ipv4Addr>,
        local_address: SocketAddr,
        registry: Arc<DeviceRegistry>,
        refresh: Option<Duration>,
    ) -> Result<Self> {
        let mdns = ServiceDaemon::new().map_err(|e| ChatError::DiscoveryUnavailable(e.to_string()))?;

        let announcement = match advertise {
            Some(ip) => match Announcer::new(mdns.clone()).announce(label, ip, local_address.port()) {
                Ok(announcement) => Some(announcement),
                Err(e) => {
                    warn!("⚠️ {}; discovery is passive-only", e);
                    None
                }
            },
            None => {
                warn!("⚠️ No valid LAN address to announce; discovery is passive-only");
                None
            }
        };

        let events = mdns
            .browse(SERVICE_TYPE)
            .map_err(|e| ChatError::DiscoveryUnavailable(e.to_string()))?;

        let browser = Browser::new(registry, local_address);
        let pump = spawn_event_pump(mdns.clone(), events, Arc::new(browser), refresh)?;

        info!("✅ Peer discovery started for {}", SERVICE_TYPE);
        Ok(Self {
            mdns,
            announcement,
            pump: Some(pump),
        })
    }

    pub fn is_advertising(&self) -> bool {
        self.announcement.is_some()
    }

    /// Full advertised service name, if registration succeeded
    pub fn advertised_name(&self) -> Option<&str> {
        self.announcement.as_ref().map(Announcement::fullname)
    }
}

impl Drop for Discovery {
    fn drop(&mut self) {
        // Unregister before the daemon goes away
        self.announcement.take();

        if let Err(e) = self.mdns.stop_browse(SERVICE_TYPE) {
            debug!("mDNS: stop_browse failed: {}", e);
        }
        if let Err(e) = self.mdns.shutdown() {
            warn!("mDNS: Shutdown failed: {}", e);
        }

        // The pump exits once the daemon drops the event channel
        self.pump.take();
        info!("✅ Peer discovery stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::discovery::announcer::build_service_info;
    use std::sync::{mpsc, Mutex};
    use std::time::SystemTime;

    impl EventSource for mpsc::Receiver<ServiceEvent> {
        fn wait(&self, deadline: Option<Instant>) -> Wait {
            let received = match deadline {
                Some(deadline) => self.recv_timeout(deadline.saturating_duration_since(Instant::now())),
                None => self.recv().map_err(|_| mpsc::RecvTimeoutError::Disconnected),
            };
            match received {
                Ok(event) => Wait::Event(event),
                Err(mpsc::RecvTimeoutError::Timeout) => Wait::RefreshDue,
                Err(mpsc::RecvTimeoutError::Disconnected) => Wait::Closed,
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl PeerEventHandler for Recorder {
        fn on_join(&self, peer: ResolvedPeer) {
            self.calls.lock().unwrap().push(format!("join {}", peer.name));
        }
        fn on_update(&self, peer: ResolvedPeer) {
            self.calls.lock().unwrap().push(format!("update {}", peer.name));
        }
        fn on_leave(&self, name: &str) {
            self.calls.lock().unwrap().push(format!("leave {}", name));
        }
    }

    fn resolved(port: u16) -> ServiceEvent {
        let info = build_service_info("LANChat", Ipv4Addr::new(192, 168, 1, 10), port).unwrap();
        ServiceEvent::ServiceResolved(info)
    }

    #[test]
    fn test_resolved_peer_from_service_info() {
        let info = build_service_info("LANChat", Ipv4Addr::new(192, 168, 1, 10), 9001).unwrap();
        let peer = ResolvedPeer::from(&info);

        assert_eq!(peer.name, "LANChat_9001");
        assert_eq!(peer.port, 9001);
        assert_eq!(peer.addresses, vec!["192.168.1.10".parse::<std::net::IpAddr>().unwrap()]);
        assert_eq!(peer.version.as_deref(), Some("1.0"));
    }

    #[test]
    fn test_translate_join_update_leave() {
        let mut resolved_names = HashSet::new();

        let first = translate(&mut resolved_names, resolved(9001));
        assert!(matches!(first, Some(PeerEvent::Joined(ref p)) if p.name == "LANChat_9001"));

        let second = translate(&mut resolved_names, resolved(9001));
        assert!(matches!(second, Some(PeerEvent::Updated(_))));

        let gone = translate(
            &mut resolved_names,
            ServiceEvent::ServiceRemoved(SERVICE_TYPE.into(), "LANChat_9001._lanchat._tcp.local.".into()),
        );
        assert_eq!(gone, Some(PeerEvent::Left("LANChat_9001".into())));

        // Re-appearing after leaving is a join again
        let back = translate(&mut resolved_names, resolved(9001));
        assert!(matches!(back, Some(PeerEvent::Joined(_))));
    }

    #[test]
    fn test_translate_ignores_search_noise() {
        let mut resolved_names = HashSet::new();
        assert!(translate(&mut resolved_names, ServiceEvent::SearchStarted(SERVICE_TYPE.into())).is_none());
        assert!(translate(
            &mut resolved_names,
            ServiceEvent::ServiceFound(SERVICE_TYPE.into(), "x._lanchat._tcp.local.".into())
        )
        .is_none());
    }

    #[test]
    fn test_dispatch_calls_handler() {
        let recorder = Recorder::default();
        let mut resolved_names = HashSet::new();

        for event in [
            resolved(9001),
            resolved(9001),
            ServiceEvent::ServiceRemoved(SERVICE_TYPE.into(), "LANChat_9001._lanchat._tcp.local.".into()),
        ] {
            if let Some(event) = translate(&mut resolved_names, event) {
                dispatch(&recorder, event);
            }
        }

        assert_eq!(
            *recorder.calls.lock().unwrap(),
            vec!["join LANChat_9001", "update LANChat_9001", "leave LANChat_9001"]
        );
    }

    #[test]
    fn drain_returns_for_refresh_then_stops_when_closed() {
        let recorder = Recorder::default();
        let mut resolved_names = HashSet::new();
        let (tx, rx) = mpsc::channel();

        tx.send(resolved(9001)).unwrap();
        assert!(drain(&rx, &mut resolved_names, &recorder, Some(Duration::from_millis(50))));
        assert_eq!(*recorder.calls.lock().unwrap(), vec!["join LANChat_9001"]);

        drop(tx);
        assert!(!drain(&rx, &mut resolved_names, &recorder, Some(Duration::from_secs(5))));
    }

    #[test]
    fn evicted_peer_comes_back_on_refresh() {
        let registry = Arc::new(DeviceRegistry::with_local_address("192.168.1.99:7000".parse().unwrap()));
        let browser = Browser::new(Arc::clone(&registry), "192.168.1.99:7000".parse().unwrap());
        let mut resolved_names = HashSet::new();
        let refresh = Some(Duration::from_millis(20));

        let (tx, rx) = mpsc::channel();
        tx.send(resolved(9001)).unwrap();
        assert!(drain(&rx, &mut resolved_names, &browser, refresh));
        assert!(registry.contains("LANChat_9001"));

        // Record refreshes raise no event, so the sweeper sees a stale entry
        let later = SystemTime::now() + Duration::from_secs(120);
        assert_eq!(registry.evict_stale(Duration::from_secs(60), later), vec!["LANChat_9001".to_string()]);
        assert!(!registry.contains("LANChat_9001"));

        // A fresh browse replays the cache for the still-live peer
        let (tx, rx) = mpsc::channel();
        tx.send(resolved(9001)).unwrap();
        assert!(drain(&rx, &mut resolved_names, &browser, refresh));
        assert!(registry.contains("LANChat_9001"));
        assert!(resolved_names.contains("LANChat_9001"));
    }

    #[test]
    fn test_refresh_interval() {
        assert_eq!(refresh_interval(Duration::from_secs(30)), Duration::from_secs(10));
        assert_eq!(refresh_interval(Duration::from_secs(2)), Duration::from_secs(1));
    }
}
