//! Cooperative scheduler: the device's only loop after boot.
//!
//! ```text
//! ┌─▶ file-transfer turn ──▶ http turn ──▶ yield to reactor ─┐
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! Turns are short and never sleep. A turn that does block (a response
//! write, bounded by the write timeout) delays the other consumer; nothing
//! here tries to prevent that.

use tokio::task::yield_now;
use tracing::info;

use crate::ftp::FileTransfer;
use crate::http::{Acceptor, HttpHandler};
use crate::state::DeviceState;

pub struct Scheduler<F, A>
where
    F: FileTransfer,
    A: Acceptor,
{
    ftp: F,
    http: HttpHandler<A>,
    device: DeviceState,
}

impl<F, A> Scheduler<F, A>
where
    F: FileTransfer,
    A: Acceptor,
{
    pub fn new(ftp: F, http: HttpHandler<A>, device: DeviceState) -> Self {
        Self { ftp, http, device }
    }

    /// One iteration: file transfer first, then HTTP.
    pub async fn step(&mut self) {
        self.ftp.service_turn();
        self.http.service_turn(&mut self.device).await;
    }

    pub async fn run(mut self) -> ! {
        info!(
            mode = %self.device.network.mode,
            address = %self.device.network.address,
            "scheduler started"
        );
        loop {
            self.step().await;
            // Lets the current-thread reactor poll sockets and timers.
            yield_now().await;
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================
