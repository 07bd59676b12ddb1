//! Software wall clock.
//!
//! The device has no battery-backed RTC, so every boot starts from
//! [`DEFAULT_INSTANT`] and the clock free-runs on the monotonic timer until a
//! correction arrives, either from network time or from a `~yyyymmddhhmmss`
//! command delivered over HTTP.

use std::fmt;
use std::time::{Duration, Instant};

use time::macros::datetime;
use time::OffsetDateTime;
use tracing::info;

use crate::logbook::LogWriter;

/// Boot-time seed. Nothing is persisted across power loss.
pub const DEFAULT_INSTANT: OffsetDateTime = datetime!(2024-01-01 0:00 UTC);

/// Where the current clock reading came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockSource {
    /// Still running from the boot seed.
    Default,
    /// Corrected by an SNTP exchange.
    Network,
    /// Corrected by a time-set command.
    Command,
}

impl fmt::Display for ClockSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Default => write!(f, "default"),
            Self::Network => write!(f, "network"),
            Self::Command => write!(f, "command"),
        }
    }
}

pub struct Clock {
    base: OffsetDateTime,
    anchor: Instant,
    source: ClockSource,
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock {
    pub fn new() -> Self {
        Self {
            base: DEFAULT_INSTANT,
            anchor: Instant::now(),
            source: ClockSource::Default,
        }
    }

    /// Current reading, whole seconds only.
    pub fn now(&self) -> OffsetDateTime {
        self.base + Duration::from_secs(self.anchor.elapsed().as_secs())
    }

    pub fn epoch_seconds(&self) -> i64 {
        self.now().unix_timestamp()
    }

    pub fn source(&self) -> ClockSource {
        self.source
    }

    /// Replace the reading. No rollback protection: an earlier instant is
    /// accepted just like a later one.
    pub fn set(&mut self, instant: OffsetDateTime, source: ClockSource) {
        self.base = instant;
        self.anchor = Instant::now();
        self.source = source;
    }

    /// Commit a correction and record it in the operational stream.
    pub fn apply_correction(
        &mut self,
        instant: OffsetDateTime,
        source: ClockSource,
        logs: &LogWriter,
    ) {
        self.set(instant, source);
        info!(%source, epoch = self.epoch_seconds(), "clock corrected");
        logs.operational(
            self.now(),
            &format!("clock set from {source} to {}", format_stamp(instant)),
        );
    }
}

/// `YYYY/MM/DD,HH:MM:SS`, the prefix shared by both log streams.
pub fn format_stamp(t: OffsetDateTime) -> String {
    format!(
        "{:04}/{:02}/{:02},{:02}:{:02}:{:02}",
        t.year(),
        t.month() as u8,
        t.day(),
        t.hour(),
        t.minute(),
        t.second()
    )
}

// ===========================================================================
// Tests
// ===========================================================================
