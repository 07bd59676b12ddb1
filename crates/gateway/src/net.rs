//! Network mode selection and association.
//!
//! Radio configuration itself belongs to the host. What the gateway needs is
//! to know which mode it runs in and which address it answers on, and to
//! give up (fatally) when a station never gets a route.

use std::fmt;
use std::net::IpAddr;

use anyhow::{bail, Context, Result};
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::logbook::LogWriter;
use crate::settings::NetworkSettings;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkMode {
    AccessPoint,
    Station,
}

impl NetworkMode {
    /// `AP` selects access-point mode; anything else, including an absent
    /// key, selects station mode.
    pub fn from_config(value: &str) -> Self {
        if value.trim() == "AP" {
            Self::AccessPoint
        } else {
            Self::Station
        }
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AccessPoint => write!(f, "access point"),
            Self::Station => write!(f, "station"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NetworkIdentity {
    pub mode: NetworkMode,
    pub ssid: String,
    pub address: IpAddr,
}

/// Bring the network side up. Station mode retries a bounded number of
/// times; the error it returns is meant for the fatal indicator.
pub async fn associate(
    mode: NetworkMode,
    ssid: &str,
    settings: &NetworkSettings,
    clock: &Clock,
    logs: &LogWriter,
) -> Result<NetworkIdentity> {
    if mode == NetworkMode::AccessPoint {
        let address = settings.ap_address;
        info!(%ssid, %address, "access point mode");
        logs.operational(clock.now(), &format!("access point {ssid} up at {address}"));
        return Ok(NetworkIdentity {
            mode,
            ssid: ssid.to_string(),
            address,
        });
    }

    for attempt in 1..=settings.association_attempts {
        match local_address(&settings.probe_address).await {
            Ok(address) => {
                info!(%ssid, %address, attempt, "network associated");
                logs.operational(clock.now(), &format!("connected to {ssid} as {address}"));
                return Ok(NetworkIdentity {
                    mode,
                    ssid: ssid.to_string(),
                    address,
                });
            }
            Err(e) => debug!(attempt, "association attempt failed: {e:#}"),
        }
        if attempt < settings.association_attempts {
            sleep(settings.association_retry()).await;
        }
    }

    warn!(%ssid, attempts = settings.association_attempts, "network association failed");
    logs.operational(clock.now(), &format!("failed to connect to {ssid}"));
    bail!(
        "no network association with '{ssid}' after {} attempts",
        settings.association_attempts
    )
}

/// Local address the kernel would use to reach `probe`. Connecting a UDP
/// socket only selects a route; nothing goes on the wire.
async fn local_address(probe: &str) -> Result<IpAddr> {
    let socket = UdpSocket::bind("0.0.0.0:0")
        .await
        .context("failed to bind probe socket")?;
    socket
        .connect(probe)
        .await
        .with_context(|| format!("no route to {probe}"))?;
    let address = socket.local_addr()?.ip();
    if address.is_unspecified() || address.is_loopback() {
        bail!("no routable address yet ({address})");
    }
    Ok(address)
}

// ===========================================================================
// Tests
// ===========================================================================
