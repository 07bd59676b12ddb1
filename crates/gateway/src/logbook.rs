//! Append-only log streams on the storage medium.
//!
//! Every append opens the file, writes one line and closes it again. Nothing
//! is buffered between calls, so a reset mid-write can only damage the line
//! being written.

use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use time::OffsetDateTime;
use tracing::warn;

use crate::clock::format_stamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stream {
    /// System, connectivity and clock events.
    Operational,
    /// Raw decoded `LOG=` payloads.
    Telemetry,
}

impl fmt::Display for Stream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Operational => write!(f, "operational"),
            Self::Telemetry => write!(f, "telemetry"),
        }
    }
}

pub struct LogWriter {
    operational: PathBuf,
    telemetry: PathBuf,
}

impl LogWriter {
    pub fn new(root: &Path, operational: &str, telemetry: &str) -> Self {
        Self {
            operational: root.join(operational),
            telemetry: root.join(telemetry),
        }
    }

    pub fn path(&self, stream: Stream) -> &Path {
        match stream {
            Stream::Operational => &self.operational,
            Stream::Telemetry => &self.telemetry,
        }
    }

    /// Append `timestamp,payload` to `stream`. Failures are reported through
    /// tracing and otherwise swallowed; the return value says whether the
    /// line made it to storage.
    pub fn append(&self, stream: Stream, now: OffsetDateTime, payload: &str) -> bool {
        let line = format!("{},{payload}", format_stamp(now));
        match self.write_line(stream, &line) {
            Ok(()) => true,
            Err(e) => {
                warn!(
                    %stream,
                    path = %self.path(stream).display(),
                    "log append failed: {e}"
                );
                false
            }
        }
    }

    pub fn operational(&self, now: OffsetDateTime, event: &str) -> bool {
        self.append(Stream::Operational, now, event)
    }

    pub fn telemetry(&self, now: OffsetDateTime, payload: &str) -> bool {
        self.append(Stream::Telemetry, now, payload)
    }

    fn write_line(&self, stream: Stream, line: &str) -> io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path(stream))?;
        writeln!(file, "{line}")?;
        file.flush()
    }
}

/// Read a log file back as lines; a missing file reads as empty.
#[cfg(test)]
pub(crate) fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .map(|s| s.lines().map(str::to_string).collect())
        .unwrap_or_default()
}

// ===========================================================================
// Tests
// ===========================================================================
