//! `KEY=value` device configuration on the storage medium.
//!
//! Each lookup rescans the file from the start; nothing is cached. That is
//! fine for the handful of reads done at boot.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Bytes, Read};
use std::path::PathBuf;

use tracing::debug;

/// Longest line kept per scan; the rest of an over-long line is discarded.
pub const MAX_CONFIG_LINE: usize = 128;

type ConfigLine = heapless::Vec<u8, MAX_CONFIG_LINE>;

pub struct ConfigReader {
    path: PathBuf,
}

impl ConfigReader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Value of the first line starting with `key`. The caller passes the
    /// separator too (`"SSID="`). Missing file or key reads as empty.
    pub fn lookup(&self, key: &str) -> String {
        let file = match File::open(&self.path) {
            Ok(f) => f,
            Err(e) => {
                debug!(path = %self.path.display(), "config unavailable: {e}");
                return String::new();
            }
        };

        let mut bytes = BufReader::new(file).bytes();
        let mut line = ConfigLine::new();
        loop {
            line.clear();
            let more = next_line(&mut bytes, &mut line);
            if let Some(value) = line.strip_prefix(key.as_bytes()) {
                return String::from_utf8_lossy(value).into_owned();
            }
            if !more {
                return String::new();
            }
        }
    }
}

/// Fill `line` up to the next LF, dropping CRs. Returns `false` once the
/// stream is exhausted (or unreadable).
fn next_line<R: Read>(bytes: &mut Bytes<R>, line: &mut ConfigLine) -> bool {
    for byte in bytes.by_ref() {
        match byte {
            Ok(b'\n') => return true,
            Ok(b'\r') => {}
            Ok(b) => {
                // Over-long lines are truncated, not rejected.
                let _ = line.push(b);
            }
            Err(_) => return false,
        }
    }
    false
}

// ---------------------------------------------------------------------------
// Recognized keys
// ---------------------------------------------------------------------------

pub struct DeviceConfig {
    pub ssid: String,
    pub password: String,
    pub ftp_user: String,
    pub ftp_password: String,
    pub mode: String,
}

impl DeviceConfig {
    pub fn read(reader: &ConfigReader) -> Self {
        Self {
            ssid: reader.lookup("SSID="),
            password: reader.lookup("PASSWORD="),
            ftp_user: reader.lookup("FTPUSER="),
            ftp_password: reader.lookup("FTPPASSWORD="),
            mode: reader.lookup("MODE="),
        }
    }
}

impl fmt::Debug for DeviceConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceConfig")
            .field("ssid", &self.ssid)
            .field("password", &"***")
            .field("ftp_user", &self.ftp_user)
            .field("ftp_password", &"***")
            .field("mode", &self.mode)
            .finish()
    }
}

// ===========================================================================
// Tests
// ===========================================================================
