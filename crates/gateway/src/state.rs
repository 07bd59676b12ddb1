use crate::clock::{format_stamp, Clock, ClockSource};
use crate::logbook::LogWriter;
use crate::net::{NetworkIdentity, NetworkMode};
use crate::storage::{Storage, StorageUsage};

/// Package name and version baked in at compile time.
pub const BUILD_IDENTITY: &str = concat!(env!("CARGO_PKG_NAME"), " ", env!("CARGO_PKG_VERSION"));

// ---------------------------------------------------------------------------
// Core types
// ---------------------------------------------------------------------------

/// Process-wide services, built once at boot and lent to each turn.
pub struct DeviceState {
    pub clock: Clock,
    pub logs: LogWriter,
    pub storage: Storage,
    pub network: NetworkIdentity,
}

/// Everything the status page shows, captured at one instant.
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub clock: String,
    pub clock_source: ClockSource,
    pub usage: StorageUsage,
    pub mode: NetworkMode,
    pub ssid: String,
    pub address: String,
    pub build: &'static str,
}

// ---------------------------------------------------------------------------
// Snapshot
// ---------------------------------------------------------------------------

impl DeviceState {
    pub fn to_status(&self) -> StatusSnapshot {
        StatusSnapshot {
            clock: format_stamp(self.clock.now()),
            clock_source: self.clock.source(),
            usage: self.storage.usage(),
            mode: self.network.mode,
            ssid: self.network.ssid.clone(),
            address: self.network.address.to_string(),
            build: BUILD_IDENTITY,
        }
    }
}

#[cfg(test)]
pub(crate) fn test_device(root: &std::path::Path) -> DeviceState {
    use std::net::{IpAddr, Ipv4Addr};

    DeviceState {
        clock: Clock::new(),
        logs: LogWriter::new(root, "log.txt", "data.txt"),
        storage: Storage::mount(root).unwrap(),
        network: NetworkIdentity {
            mode: NetworkMode::Station,
            ssid: "test".into(),
            address: IpAddr::V4(Ipv4Addr::LOCALHOST),
        },
    }
}

// ===========================================================================
// Tests
// ===========================================================================
