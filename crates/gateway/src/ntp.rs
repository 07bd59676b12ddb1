//! Minimal SNTP client used once at boot to correct the clock.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use time::OffsetDateTime;
use tokio::net::UdpSocket;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::clock::{Clock, ClockSource};
use crate::logbook::LogWriter;
use crate::settings::NetworkSettings;

const NTP_PACKET_LEN: usize = 48;

/// Seconds from 1900-01-01 (NTP era 0) to the Unix epoch.
const NTP_UNIX_OFFSET: u64 = 2_208_988_800;

/// LI = 0, VN = 4, Mode = 3 (client).
const CLIENT_HEADER: u8 = 0b00_100_011;
const MODE_SERVER: u8 = 4;

pub fn request_packet() -> [u8; NTP_PACKET_LEN] {
    let mut packet = [0u8; NTP_PACKET_LEN];
    packet[0] = CLIENT_HEADER;
    packet
}

/// Transmit timestamp of a server reply as a UTC instant.
pub fn transmit_time(reply: &[u8]) -> Result<OffsetDateTime> {
    if reply.len() < NTP_PACKET_LEN {
        bail!("short ntp reply: {} bytes", reply.len());
    }
    let mode = reply[0] & 0x07;
    if mode != MODE_SERVER {
        bail!("unexpected ntp mode {mode}");
    }

    let secs = u64::from(u32::from_be_bytes([reply[40], reply[41], reply[42], reply[43]]));
    if secs == 0 {
        bail!("ntp reply carries no transmit time");
    }
    // Values below the offset belong to era 1 (after February 2036).
    let unix = if secs >= NTP_UNIX_OFFSET {
        secs - NTP_UNIX_OFFSET
    } else {
        secs + (1 << 32) - NTP_UNIX_OFFSET
    };
    OffsetDateTime::from_unix_timestamp(unix as i64).context("ntp time out of range")
}

/// One request/reply exchange, bounded by `limit` end to end.
pub async fn fetch(server: &str, limit: Duration) -> Result<OffsetDateTime> {
    let exchange = async {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .context("failed to bind ntp socket")?;
        socket
            .connect(server)
            .await
            .with_context(|| format!("failed to reach ntp server {server}"))?;
        socket
            .send(&request_packet())
            .await
            .context("failed to send ntp request")?;

        let mut reply = [0u8; 64];
        let len = socket.recv(&mut reply).await.context("ntp receive failed")?;
        transmit_time(&reply[..len])
    };

    timeout(limit, exchange)
        .await
        .with_context(|| format!("ntp server {server} did not answer within {limit:?}"))?
}

/// Try network time a bounded number of times. On failure the clock keeps
/// its current reading and one operational line records the attempt.
pub async fn sync_clock(settings: &NetworkSettings, clock: &mut Clock, logs: &LogWriter) -> bool {
    for attempt in 1..=settings.ntp_attempts {
        match fetch(&settings.ntp_server, settings.ntp_timeout()).await {
            Ok(instant) => {
                clock.apply_correction(instant, ClockSource::Network, logs);
                return true;
            }
            Err(e) => debug!(attempt, server = %settings.ntp_server, "ntp attempt failed: {e:#}"),
        }
    }

    warn!(
        server = %settings.ntp_server,
        attempts = settings.ntp_attempts,
        "network time unavailable, keeping current clock"
    );
    logs.operational(
        clock.now(),
        &format!("network time unavailable from {}", settings.ntp_server),
    );
    false
}

// ===========================================================================
// Tests
// ===========================================================================
