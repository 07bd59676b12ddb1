//! TOML tunables for the gateway: ports, storage layout, retry budgets.
//!
//! Every field has a default, so a missing file (or an empty one) yields a
//! working setup. The device's own `KEY=value` file is handled by
//! [`crate::config`].

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Settings file structures
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub http: HttpSettings,
    pub storage: StorageSettings,
    pub network: NetworkSettings,
    pub indicator: IndicatorSettings,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub port: u16,
    /// Wall-clock bound on one connection before it is forcibly closed.
    pub idle_timeout_sec: u64,
    pub write_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct StorageSettings {
    pub root: PathBuf,
    pub config_file: String,
    pub operational_log: String,
    pub telemetry_log: String,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct NetworkSettings {
    /// Address the device answers on in access-point mode.
    pub ap_address: IpAddr,
    /// Remote used only to discover the local route in station mode; no
    /// packet is sent to it.
    pub probe_address: String,
    pub association_attempts: u32,
    pub association_retry_ms: u64,
    pub ntp_server: String,
    pub ntp_attempts: u32,
    pub ntp_timeout_ms: u64,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct IndicatorSettings {
    pub gpio_pin: u8,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            port: 80,
            idle_timeout_sec: 30,
            write_timeout_ms: 2000,
        }
    }
}

impl Default for StorageSettings {
    fn default() -> Self {
        Self {
            root: PathBuf::from("storage"),
            config_file: "config.txt".into(),
            operational_log: "log.txt".into(),
            telemetry_log: "data.txt".into(),
        }
    }
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            ap_address: IpAddr::V4(Ipv4Addr::new(192, 168, 4, 1)),
            probe_address: "8.8.8.8:53".into(),
            association_attempts: 20,
            association_retry_ms: 500,
            ntp_server: "pool.ntp.org:123".into(),
            ntp_attempts: 5,
            ntp_timeout_ms: 1500,
        }
    }
}

impl Default for IndicatorSettings {
    fn default() -> Self {
        Self { gpio_pin: 17 }
    }
}

impl HttpSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_sec)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

impl NetworkSettings {
    pub fn association_retry(&self) -> Duration {
        Duration::from_millis(self.association_retry_ms)
    }

    pub fn ntp_timeout(&self) -> Duration {
        Duration::from_millis(self.ntp_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// GPIO whitelist
// ---------------------------------------------------------------------------

/// BCM GPIO pins available on the Raspberry Pi 40-pin header for general
/// use. GPIO 0-1 are reserved for the ID EEPROM and must never be used.
const VALID_GPIO_PINS: &[u8] = &[
    2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15, 16, 17, 18, 19, 20, 21, 22, 23, 24, 25, 26, 27,
];

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

impl Settings {
    /// Validate every section. Returns `Ok(())` or an error describing every
    /// violation found (not just the first one).
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        self.validate_http(&mut errors);
        self.validate_storage(&mut errors);
        self.validate_network(&mut errors);

        if !VALID_GPIO_PINS.contains(&self.indicator.gpio_pin) {
            errors.push(format!(
                "indicator: gpio_pin {} is not a valid BCM GPIO pin (allowed: 2-27)",
                self.indicator.gpio_pin
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            bail!(
                "settings validation failed ({} error{}):\n  - {}",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" },
                errors.join("\n  - ")
            );
        }
    }

    fn validate_http(&self, errors: &mut Vec<String>) {
        let h = &self.http;
        if h.port == 0 {
            errors.push("http: port must be non-zero".into());
        }
        if h.idle_timeout_sec == 0 {
            errors.push("http: idle_timeout_sec must be positive".into());
        }
        if h.write_timeout_ms == 0 {
            errors.push("http: write_timeout_ms must be positive".into());
        }
    }

    fn validate_storage(&self, errors: &mut Vec<String>) {
        let s = &self.storage;
        if s.root.as_os_str().is_empty() {
            errors.push("storage: root is empty".into());
        }

        let files = [
            ("config_file", &s.config_file),
            ("operational_log", &s.operational_log),
            ("telemetry_log", &s.telemetry_log),
        ];
        for (name, file) in files {
            if file.trim().is_empty() {
                errors.push(format!("storage: {name} is empty"));
            } else if file.contains('/') || file.contains('\\') {
                errors.push(format!(
                    "storage: {name} '{file}' must be a plain file name under root"
                ));
            }
        }

        if s.operational_log == s.telemetry_log {
            errors.push(format!(
                "storage: operational_log and telemetry_log are both '{}'",
                s.operational_log
            ));
        }
        if s.config_file == s.operational_log || s.config_file == s.telemetry_log {
            errors.push(format!(
                "storage: config_file '{}' collides with a log stream",
                s.config_file
            ));
        }
    }

    fn validate_network(&self, errors: &mut Vec<String>) {
        let n = &self.network;
        if !n.probe_address.contains(':') {
            errors.push(format!(
                "network: probe_address '{}' must be host:port",
                n.probe_address
            ));
        }
        if !n.ntp_server.contains(':') {
            errors.push(format!(
                "network: ntp_server '{}' must be host:port",
                n.ntp_server
            ));
        }
        if n.association_attempts == 0 {
            errors.push("network: association_attempts must be positive".into());
        }
        if n.ntp_attempts == 0 {
            errors.push("network: ntp_attempts must be positive".into());
        }
        if n.ntp_timeout_ms == 0 {
            errors.push("network: ntp_timeout_ms must be positive".into());
        }
    }
}

// ---------------------------------------------------------------------------
// Load
// ---------------------------------------------------------------------------

/// Read, parse, and validate a TOML settings file. A missing file means
/// defaults.
pub fn load(path: &Path) -> Result<Settings> {
    let settings = if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read settings: {}", path.display()))?;
        toml::from_str(&contents)
            .with_context(|| format!("failed to parse settings: {}", path.display()))?
    } else {
        tracing::info!(path = %path.display(), "no settings file, using defaults");
        Settings::default()
    };
    settings
        .validate()
        .with_context(|| format!("invalid settings: {}", path.display()))?;
    Ok(settings)
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;

    /// Assert validation fails and the error message contains `needle`.
    fn assert_validation_err(settings: &Settings, needle: &str) {
        let err = settings.validate().unwrap_err();
        let msg = format!("{err:#}");
        assert!(
            msg.contains(needle),
            "expected error containing {needle:?}, got: {msg}"
        );
    }

    // -- Parsing ----------------------------------------------------------

    #[test]
    fn parse_partial_settings() {
        let toml_str = r#"
[http]
port = 8080

[storage]
root = "/media/sd"

[network]
ap_address = "10.0.0.1"
ntp_attempts = 2
"#;
        let s: Settings = toml::from_str(toml_str).unwrap();
        assert_eq!(s.http.port, 8080);
        assert_eq!(s.http.idle_timeout_sec, 30);
        assert_eq!(s.storage.root, PathBuf::from("/media/sd"));
        assert_eq!(s.storage.telemetry_log, "data.txt");
        assert_eq!(s.network.ap_address, IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(s.network.ntp_attempts, 2);
        assert_eq!(s.indicator.gpio_pin, 17);
    }

    #[test]
    fn parse_empty_settings() {
        let s: Settings = toml::from_str("").unwrap();
        assert_eq!(s.http.port, 80);
        assert_eq!(s.storage.operational_log, "log.txt");
    }

    #[test]
    fn parse_rejects_bad_address() {
        let toml_str = r#"
[network]
ap_address = "not-an-ip"
"#;
        assert!(toml::from_str::<Settings>(toml_str).is_err());
    }

    // -- Validation -------------------------------------------------------

    #[test]
    fn defaults_pass() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn zero_port_rejected() {
        let mut s = Settings::default();
        s.http.port = 0;
        assert_validation_err(&s, "port must be non-zero");
    }

    #[test]
    fn zero_idle_timeout_rejected() {
        let mut s = Settings::default();
        s.http.idle_timeout_sec = 0;
        assert_validation_err(&s, "idle_timeout_sec must be positive");
    }

    #[test]
    fn log_file_with_path_rejected() {
        let mut s = Settings::default();
        s.storage.telemetry_log = "../data.txt".into();
        assert_validation_err(&s, "must be a plain file name");
    }

    #[test]
    fn same_log_for_both_streams_rejected() {
        let mut s = Settings::default();
        s.storage.telemetry_log = "log.txt".into();
        assert_validation_err(&s, "are both 'log.txt'");
    }

    #[test]
    fn config_file_colliding_with_log_rejected() {
        let mut s = Settings::default();
        s.storage.config_file = "data.txt".into();
        assert_validation_err(&s, "collides with a log stream");
    }

    #[test]
    fn ntp_server_without_port_rejected() {
        let mut s = Settings::default();
        s.network.ntp_server = "pool.ntp.org".into();
        assert_validation_err(&s, "ntp_server 'pool.ntp.org' must be host:port");
    }

    #[test]
    fn gpio_pin_0_rejected() {
        let mut s = Settings::default();
        s.indicator.gpio_pin = 0;
        assert_validation_err(&s, "not a valid BCM GPIO pin");
    }

    #[test]
    fn multiple_errors_collected() {
        let mut s = Settings::default();
        s.http.port = 0;
        s.storage.operational_log = "".into();
        s.network.ntp_attempts = 0;
        let msg = format!("{:#}", s.validate().unwrap_err());
        assert!(msg.contains("3 errors"), "wrong count in: {msg}");
        assert!(msg.contains("port"), "missing port error in: {msg}");
        assert!(msg.contains("operational_log is empty"), "missing log error in: {msg}");
        assert!(msg.contains("ntp_attempts"), "missing ntp error in: {msg}");
    }

    // -- Load ---------------------------------------------------------------

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let s = load(&dir.path().join("gateway.toml")).unwrap();
        assert_eq!(s.http.port, 80);
    }

    #[test]
    fn load_reports_invalid_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gateway.toml");
        std::fs::write(&path, "[http]\nport = 0\n").unwrap();
        let msg = format!("{:#}", load(&path).unwrap_err());
        assert!(msg.contains("invalid settings"), "got: {msg}");
    }
}
