//! Device Registry - in-memory table of discovered peers
//!
//! Written by the discovery browser, read by anything that needs a
//! snapshot of who is online. One lock, held only for the table operation.

use crate::error::{ChatError, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

/// A peer discovered on the local network
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Device {
    /// Service instance name (identity key)
    pub name: String,
    pub address: SocketAddr,
    pub first_seen: SystemTime,
    pub last_seen: SystemTime,
}

impl Device {
    pub fn new(name: impl Into<String>, address: SocketAddr) -> Self {
        Self::seen_at(name, address, SystemTime::now())
    }

    pub fn seen_at(name: impl Into<String>, address: SocketAddr, at: SystemTime) -> Self {
        Self {
            name: name.into(),
            address,
            first_seen: at,
            last_seen: at,
        }
    }
}

/// `{name, ip, port}` row served by `GET /discovery/devices`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceListing {
    pub name: String,
    pub ip: String,
    pub port: u16,
}

impl From<&Device> for DeviceListing {
    fn from(device: &Device) -> Self {
        Self {
            name: device.name.clone(),
            ip: device.address.ip().to_string(),
            port: device.address.port(),
        }
    }
}

/// Outcome of [`DeviceRegistry::upsert`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Upsert {
    Inserted,
    Updated,
    /// The address is this node's own advertised address
    Rejected,
}

/// Thread-safe, insertion-ordered device table
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: Mutex<Vec<Device>>,
    local_address: Option<SocketAddr>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry that refuses entries pointing at our own advertised address
    pub fn with_local_address(local_address: SocketAddr) -> Self {
        Self {
            devices: Mutex::new(Vec::new()),
            local_address: Some(local_address),
        }
    }

    pub fn local_address(&self) -> Option<SocketAddr> {
        self.local_address
    }

    fn table(&self) -> MutexGuard<'_, Vec<Device>> {
        self.devices.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a new device or refresh the address and `last_seen` of a known one
    pub fn upsert(&self, device: Device) -> Upsert {
        if self.local_address == Some(device.address) {
            return Upsert::Rejected;
        }

        let mut devices = self.table();
        match devices.iter_mut().find(|d| d.name == device.name) {
            Some(existing) => {
                existing.address = device.address;
                existing.last_seen = device.last_seen;
                Upsert::Updated
            }
            None => {
                devices.push(device);
                Upsert::Inserted
            }
        }
    }

    /// Remove by name; returns whether anything was removed
    pub fn remove(&self, name: &str) -> bool {
        let mut devices = self.table();
        let before = devices.len();
        devices.retain(|d| d.name != name);
        devices.len() != before
    }

    /// Point-in-time copy in insertion order
    pub fn list(&self) -> Vec<Device> {
        self.table().clone()
    }

    pub fn listings(&self) -> Vec<DeviceListing> {
        self.table().iter().map(DeviceListing::from).collect()
    }

    pub fn get(&self, name: &str) -> Option<Device> {
        self.table().iter().find(|d| d.name == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.table().iter().any(|d| d.name == name)
    }

    pub fn len(&self) -> usize {
        self.table().len()
    }

    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }

    /// Device at a 1-based position in listing order
    pub fn resolve_index(&self, position: usize) -> Result<Device> {
        position
            .checked_sub(1)
            .and_then(|i| self.table().get(i).cloned())
            .ok_or(ChatError::NotFound(position))
    }

    /// Parse a user supplied `ip:port`
    pub fn resolve_address(&self, text: &str) -> Result<SocketAddr> {
        parse_address(text)
    }

    /// Drop devices not seen within `max_age` of `now`; returns evicted names
    pub fn evict_stale(&self, max_age: Duration, now: SystemTime) -> Vec<String> {
        let mut evicted = Vec::new();
        self.table().retain(|d| {
            let age = now.duration_since(d.last_seen).unwrap_or_default();
            if age > max_age {
                evicted.push(d.name.clone());
                false
            } else {
                true
            }
        });
        evicted
    }
}

/// Parse `ip:port` (IPv4 or bracketed IPv6); port 0 is refused
pub fn parse_address(text: &str) -> Result<SocketAddr> {
    let trimmed = text.trim();
    match trimmed.parse::<SocketAddr>() {
        Ok(addr) if addr.port() != 0 => Ok(addr),
        _ => Err(ChatError::InvalidFormat(trimmed.to_string())),
    }
}
