use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use russh::client;
use russh_keys::key::PublicKey;
use tracing::{debug, warn};

/// How the server's host key is verified.
#[derive(Debug, Clone, Default)]
pub enum HostKeyPolicy {
    /// Accept any key and log its fingerprint.
    #[default]
    AcceptAny,
    /// Require a matching entry in an OpenSSH `known_hosts` file.
    KnownHosts(PathBuf),
    /// Require an exact fingerprint match.
    Fingerprint(String),
}

/// russh client handler enforcing a [`HostKeyPolicy`].
///
/// When a key is refused, the reason is left in `rejection` so the
/// caller can report something better than russh's "Unknown server key".
pub(crate) struct ClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    rejection: Arc<Mutex<Option<String>>>,
}

impl ClientHandler {
    pub(crate) fn new(
        host: String,
        port: u16,
        policy: HostKeyPolicy,
        rejection: Arc<Mutex<Option<String>>>,
    ) -> Self {
        Self {
            host,
            port,
            policy,
            rejection,
        }
    }

    fn reject(&self, reason: String) -> bool {
        warn!(host = %self.host, %reason, "rejecting server host key");
        if let Ok(mut slot) = self.rejection.lock() {
            *slot = Some(reason);
        }
        false
    }
}

#[async_trait]
impl client::Handler for ClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &PublicKey,
    ) -> Result<bool, Self::Error> {
        let fingerprint = server_public_key.fingerprint();
        debug!(host = %self.host, %fingerprint, "server host key");

        let accepted = match &self.policy {
            HostKeyPolicy::AcceptAny => true,
            HostKeyPolicy::Fingerprint(expected) => {
                if fingerprint == *expected {
                    true
                } else {
                    self.reject(format!("fingerprint {fingerprint} does not match {expected}"))
                }
            }
            HostKeyPolicy::KnownHosts(path) => {
                match russh_keys::check_known_hosts_path(
                    &self.host,
                    self.port,
                    server_public_key,
                    path,
                ) {
                    Ok(true) => true,
                    Ok(false) => self.reject(format!(
                        "host not present in {}",
                        path.display()
                    )),
                    Err(e) => self.reject(e.to_string()),
                }
            }
        };
        Ok(accepted)
    }
}
