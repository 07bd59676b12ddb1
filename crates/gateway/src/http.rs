//! Single-connection HTTP request-line accumulator.
//!
//! One byte per scheduler turn, never a blocking read:
//!
//! ```text
//! Idle ──[accept]──▶ Accumulating ──[\n]──▶ process + status page ──▶ Idle
//!                         │
//!                         └──[idle bound / peer gone]──▶ Idle
//! ```
//!
//! While a connection is accumulating no second one is accepted; it waits in
//! the listen backlog.

use std::io;
use std::net::SocketAddr;
use std::task::{Context, Poll};
use std::time::Duration;

use anyhow::{Context as _, Result};
use futures_util::task::noop_waker_ref;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::request;
use crate::state::DeviceState;
use crate::web;

/// Longest request line kept; further bytes are dropped until the newline.
pub const MAX_REQUEST_LINE: usize = 512;

pub type RequestLine = heapless::Vec<u8, MAX_REQUEST_LINE>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRead {
    Byte(u8),
    /// Nothing buffered right now.
    Pending,
    /// Peer hung up or the socket failed.
    Closed,
}

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

pub trait Acceptor {
    type Conn: Connection;

    /// Never waits; `None` when no connection is queued.
    fn poll_accept(&mut self) -> Option<Self::Conn>;
}

#[allow(async_fn_in_trait)]
pub trait Connection {
    /// Never waits.
    fn poll_byte(&mut self) -> ByteRead;

    /// Send the whole response and close the write side, giving up after
    /// `limit`.
    async fn respond(&mut self, response: &[u8], limit: Duration) -> io::Result<()>;
}

pub struct TcpAcceptor {
    listener: TcpListener,
}

impl TcpAcceptor {
    pub async fn bind(port: u16) -> Result<Self> {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind http port {port}"))?;
        Ok(Self { listener })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }
}

impl Acceptor for TcpAcceptor {
    type Conn = TcpConnection;

    fn poll_accept(&mut self) -> Option<TcpConnection> {
        // The scheduler re-polls every pass, so a no-op waker is enough; the
        // reactor still records readiness between passes.
        let mut cx = Context::from_waker(noop_waker_ref());
        match self.listener.poll_accept(&mut cx) {
            Poll::Ready(Ok((stream, peer))) => {
                debug!(%peer, "http connection accepted");
                Some(TcpConnection { stream, peer })
            }
            Poll::Ready(Err(e)) => {
                warn!("http accept failed: {e}");
                None
            }
            Poll::Pending => None,
        }
    }
}

pub struct TcpConnection {
    stream: TcpStream,
    peer: SocketAddr,
}

impl Connection for TcpConnection {
    fn poll_byte(&mut self) -> ByteRead {
        let mut byte = [0u8; 1];
        match self.stream.try_read(&mut byte) {
            Ok(0) => ByteRead::Closed,
            Ok(_) => ByteRead::Byte(byte[0]),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => ByteRead::Pending,
            Err(e) => {
                debug!(peer = %self.peer, "http read failed: {e}");
                ByteRead::Closed
            }
        }
    }

    async fn respond(&mut self, response: &[u8], limit: Duration) -> io::Result<()> {
        let stream = &mut self.stream;
        let send = async move {
            stream.write_all(response).await?;
            stream.shutdown().await
        };
        tokio::time::timeout(limit, send)
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "status response timed out"))?
    }
}

// ---------------------------------------------------------------------------
// Connection state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
pub struct HttpLimits {
    /// Wall time a connection may stay open without completing its line.
    pub idle_timeout: Duration,
    pub write_timeout: Duration,
}

enum ConnectionState<C> {
    Idle,
    Accumulating {
        conn: C,
        line: RequestLine,
        opened: Instant,
    },
}

pub struct HttpHandler<A: Acceptor> {
    acceptor: A,
    state: ConnectionState<A::Conn>,
    limits: HttpLimits,
}

impl<A: Acceptor> HttpHandler<A> {
    pub fn new(acceptor: A, limits: HttpLimits) -> Self {
        Self {
            acceptor,
            state: ConnectionState::Idle,
            limits,
        }
    }

    #[cfg(test)]
    pub fn is_accumulating(&self) -> bool {
        matches!(self.state, ConnectionState::Accumulating { .. })
    }

    /// One cooperative turn: accept, consume at most one byte, or finish a
    /// completed request.
    pub async fn service_turn(&mut self, device: &mut DeviceState) {
        if let ConnectionState::Idle = self.state {
            if let Some(conn) = self.acceptor.poll_accept() {
                self.state = ConnectionState::Accumulating {
                    conn,
                    line: RequestLine::new(),
                    opened: Instant::now(),
                };
            }
            return;
        }

        let ConnectionState::Accumulating { conn, line, opened } = &mut self.state else {
            return;
        };

        if opened.elapsed() >= self.limits.idle_timeout {
            warn!(
                buffered = line.len(),
                idle_timeout_sec = self.limits.idle_timeout.as_secs(),
                "closing stalled http connection"
            );
            self.state = ConnectionState::Idle;
            return;
        }

        match conn.poll_byte() {
            ByteRead::Pending => {}
            ByteRead::Closed => {
                debug!(buffered = line.len(), "http peer closed before newline");
                self.state = ConnectionState::Idle;
            }
            ByteRead::Byte(b'\n') => self.complete(device).await,
            ByteRead::Byte(b) => {
                if line.push(b).is_err() {
                    trace!("request line full, dropping byte");
                }
            }
        }
    }

    async fn complete(&mut self, device: &mut DeviceState) {
        let ConnectionState::Accumulating { mut conn, line, .. } =
            std::mem::replace(&mut self.state, ConnectionState::Idle)
        else {
            return;
        };

        debug!(line = %String::from_utf8_lossy(&line), "http request line");
        let outcome = request::process(&line, &mut device.clock, &device.logs);
        trace!(?outcome, "request processed");

        let response = web::status_response(device);
        if let Err(e) = conn
            .respond(response.as_bytes(), self.limits.write_timeout)
            .await
        {
            warn!("http status response failed: {e}");
        }
        // `conn` drops here, closing the socket.
    }
}

// ===========================================================================
// Tests
// ===========================================================================
