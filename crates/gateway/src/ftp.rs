//! File-transfer component seam.
//!
//! The scheduler hands a file-transfer component one turn per iteration
//! before the HTTP handler. Wire handling lives outside this crate; the
//! bundled [`NoFileTransfer`] only holds the credentials and counts turns.

use std::fmt;

use tracing::{info, warn};

use crate::config::DeviceConfig;

#[derive(Clone, Default)]
pub struct FtpCredentials {
    pub user: String,
    pub password: String,
}

impl FtpCredentials {
    pub fn from_config(config: &DeviceConfig) -> Self {
        Self {
            user: config.ftp_user.clone(),
            password: config.ftp_password.clone(),
        }
    }

    /// Both halves present. A user without a password never logs in.
    pub fn is_configured(&self) -> bool {
        !self.user.is_empty() && !self.password.is_empty()
    }

    /// Login check for a client session.
    pub fn accepts(&self, user: &str, password: &str) -> bool {
        self.is_configured() && self.user == user && self.password == password
    }
}

impl fmt::Debug for FtpCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FtpCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// A component that makes progress in short non-blocking turns.
pub trait FileTransfer {
    fn service_turn(&mut self);

    /// Whether a session presenting `user`/`password` may log in.
    fn authorize(&self, user: &str, password: &str) -> bool;
}

pub struct NoFileTransfer {
    credentials: FtpCredentials,
    turns: u64,
}

impl NoFileTransfer {
    pub fn new(credentials: FtpCredentials) -> Self {
        info!(
            user = %credentials.user,
            configured = credentials.is_configured(),
            "file transfer component idle"
        );
        Self {
            credentials,
            turns: 0,
        }
    }

    pub fn credentials(&self) -> &FtpCredentials {
        &self.credentials
    }

    #[cfg(test)]
    pub fn turns(&self) -> u64 {
        self.turns
    }
}

impl FileTransfer for NoFileTransfer {
    fn service_turn(&mut self) {
        self.turns = self.turns.wrapping_add(1);
    }

    fn authorize(&self, user: &str, password: &str) -> bool {
        let ok = self.credentials.accepts(user, password);
        if !ok {
            warn!(%user, "file transfer login refused");
        }
        ok
    }
}

// ===========================================================================
// Tests
// ===========================================================================
