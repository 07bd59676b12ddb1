mod clock;
mod config;
mod decode;
mod fatal;
mod ftp;
mod http;
mod logbook;
mod net;
mod ntp;
mod request;
mod scheduler;
mod settings;
mod state;
mod storage;
mod web;

use anyhow::Result;
use std::{
    env,
    path::{Path, PathBuf},
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

use clock::Clock;
use config::{ConfigReader, DeviceConfig};
use fatal::{FatalCode, FatalIndicator};
use ftp::{FileTransfer, FtpCredentials, NoFileTransfer};
use http::{HttpHandler, HttpLimits, TcpAcceptor};
use logbook::LogWriter;
use net::NetworkMode;
use scheduler::Scheduler;
use state::DeviceState;
use storage::Storage;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // ── Settings ────────────────────────────────────────────────────
    let settings_path = env::var("GATEWAY_SETTINGS").unwrap_or_else(|_| "gateway.toml".to_string());
    let mut cfg = settings::load(Path::new(&settings_path))?;
    if let Ok(root) = env::var("GATEWAY_ROOT") {
        cfg.storage.root = PathBuf::from(root);
    }

    let indicator = FatalIndicator::new(cfg.indicator.gpio_pin)?;

    // ── Storage ─────────────────────────────────────────────────────
    let storage = match Storage::mount(&cfg.storage.root) {
        Ok(s) => s,
        Err(e) => {
            error!("{e:#}");
            indicator.halt(FatalCode::NoStorage);
        }
    };
    info!(root = %storage.root().display(), "storage mounted");

    // ── Device config (KEY=value file on the storage root) ──────────
    let reader = ConfigReader::new(storage.file(&cfg.storage.config_file));
    let device_cfg = DeviceConfig::read(&reader);
    debug!(?device_cfg, "device config");

    let mut clock = Clock::new();
    let logs = LogWriter::new(
        storage.root(),
        &cfg.storage.operational_log,
        &cfg.storage.telemetry_log,
    );
    logs.operational(clock.now(), "boot");

    // ── Network ─────────────────────────────────────────────────────
    let mode = NetworkMode::from_config(&device_cfg.mode);
    info!(
        %mode,
        ssid = %device_cfg.ssid,
        secured = !device_cfg.password.is_empty(),
        "bringing network up"
    );
    let network =
        match net::associate(mode, &device_cfg.ssid, &cfg.network, &clock, &logs).await {
            Ok(id) => id,
            Err(e) => {
                error!("{e:#}");
                indicator.halt(FatalCode::NoNetwork);
            }
        };

    if mode == NetworkMode::Station {
        ntp::sync_clock(&cfg.network, &mut clock, &logs).await;
    }

    // ── HTTP ────────────────────────────────────────────────────────
    let acceptor = TcpAcceptor::bind(cfg.http.port).await?;
    info!(addr = %acceptor.local_addr()?, "http listening");
    let http = HttpHandler::new(
        acceptor,
        HttpLimits {
            idle_timeout: cfg.http.idle_timeout(),
            write_timeout: cfg.http.write_timeout(),
        },
    );

    // ── File transfer ───────────────────────────────────────────────
    let ftp = NoFileTransfer::new(FtpCredentials::from_config(&device_cfg));
    let creds = ftp.credentials();
    if !ftp.authorize(&creds.user, &creds.password) {
        warn!("file transfer logins disabled, set FTPUSER and FTPPASSWORD");
    }

    // ── Scheduler (never returns) ───────────────────────────────────
    let device = DeviceState {
        clock,
        logs,
        storage,
        network,
    };
    Scheduler::new(ftp, http, device).run().await
}
