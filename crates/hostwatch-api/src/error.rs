use std::time::Duration;

use thiserror::Error;

/// Top-level error type for the `hostwatch-api` crate.
///
/// Every failure a transport can produce, from "the host did not answer"
/// through "the SSH server rejected us". `hostwatch-core` maps these into
/// domain errors and classifies them as transient or fatal.
#[derive(Debug, Error)]
pub enum Error {
    // ── Connectivity ────────────────────────────────────────────────
    /// The host did not answer at all (timeout, no route, unreachable).
    #[error("Host {host} is offline")]
    Offline { host: String },

    /// The host answered but the SSH connection could not be established.
    #[error("Cannot connect to {host}: {reason}")]
    Connect { host: String, reason: String },

    /// Command or connection exceeded its deadline.
    #[error("Timed out after {}s", .timeout.as_secs())]
    Timeout { timeout: Duration },

    // ── Authentication ──────────────────────────────────────────────
    /// The server rejected every offered credential.
    #[error("Authentication failed for {user}@{host}")]
    Authentication { host: String, user: String },

    /// The server presented a key that does not match `known_hosts`.
    #[error("Host key rejected for {host}: {reason}")]
    HostKey { host: String, reason: String },

    /// A private key file could not be loaded.
    #[error("Cannot load key {path}: {reason}")]
    Key { path: String, reason: String },

    // ── Session ─────────────────────────────────────────────────────
    /// Channel-level failure after the session was established.
    #[error("SSH channel error: {0}")]
    Channel(String),

    /// Wake-on-LAN packet could not be built or sent.
    #[error("Wake-on-LAN failed: {0}")]
    Wake(String),

    /// The transport cannot perform the requested operation.
    #[error("Operation not supported by transport: {0}")]
    Unsupported(&'static str),
}

impl Error {
    /// Returns `true` if the failure means the credentials need attention.
    pub fn is_auth_error(&self) -> bool {
        matches!(self, Self::Authentication { .. } | Self::HostKey { .. })
    }

    /// Returns `true` if the host itself looked unreachable.
    pub fn is_offline(&self) -> bool {
        matches!(self, Self::Offline { .. })
    }
}
