// ── Transport abstraction ──
//
// The core talks to a remote host only through this trait. The SSH
// implementation lives in `ssh`; tests script their own.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Result of a reachability/session probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Probe {
    /// The host answered on the network.
    pub reachable: bool,
    /// An authenticated session is open.
    pub authenticated: bool,
}

impl Probe {
    pub const fn connected() -> Self {
        Self {
            reachable: true,
            authenticated: true,
        }
    }
}

/// Captured output of one remote command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    pub command: String,
    pub stdout: String,
    pub stderr: String,
    pub exit_status: u32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// A remote host the core can probe, run commands on, and wake.
///
/// Implementations own connection reuse. Concurrent `execute` calls are
/// allowed; an implementation that cannot multiplex must serialize them
/// internally.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Human-readable target, e.g. `admin@192.168.1.10:22`.
    fn target(&self) -> String;

    /// Refresh reachability and session state, (re)connecting if needed.
    async fn probe(&self) -> Result<Probe, Error>;

    /// Run one command and capture its output.
    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, Error>;

    /// Whether [`wake`](Self::wake) can do anything.
    fn can_wake(&self) -> bool {
        false
    }

    /// Send an out-of-band wake signal.
    async fn wake(&self) -> Result<(), Error> {
        Err(Error::Unsupported("wake"))
    }

    /// Drop any open session.
    async fn close(&self) {}
}
