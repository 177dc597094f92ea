// ── SSH transport ──
//
// One persistent russh session per host, reconnected lazily. Each
// command runs on its own channel so concurrent callers multiplex over
// the same connection.

mod handler;

use std::io::ErrorKind;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use russh::client::{self, Handle, Msg};
use russh::{Channel, ChannelMsg, Disconnect};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info};

pub use handler::HostKeyPolicy;
use handler::ClientHandler;

use crate::transport::{CommandOutput, Probe, Transport};
use crate::wake::{self, MacAddress};
use crate::Error;

const STDERR_STREAM: u32 = 1;

/// Credentials offered to the SSH server.
#[derive(Debug, Clone)]
pub enum SshAuth {
    Password(SecretString),
    KeyFile {
        path: PathBuf,
        passphrase: Option<SecretString>,
    },
}

/// Connection parameters for one host.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub auth: SshAuth,
    pub host_keys: HostKeyPolicy,
    pub connect_timeout: Duration,
    pub mac_address: Option<MacAddress>,
}

/// [`Transport`] over a persistent SSH session.
pub struct SshTransport {
    config: SshConfig,
    session: AsyncMutex<Option<Handle<ClientHandler>>>,
}

impl SshTransport {
    pub fn new(config: SshConfig) -> Self {
        Self {
            config,
            session: AsyncMutex::new(None),
        }
    }

    pub fn config(&self) -> &SshConfig {
        &self.config
    }

    fn host_label(&self) -> String {
        format!("{}:{}", self.config.host, self.config.port)
    }

    /// Open a fresh authenticated session.
    async fn connect(&self) -> Result<Handle<ClientHandler>, Error> {
        let host = self.host_label();
        let ssh_config = Arc::new(client::Config {
            inactivity_timeout: Some(self.config.connect_timeout * 20),
            ..Default::default()
        });
        let rejection = Arc::new(Mutex::new(None));
        let handler = ClientHandler::new(
            self.config.host.clone(),
            self.config.port,
            self.config.host_keys.clone(),
            Arc::clone(&rejection),
        );

        debug!(%host, "connecting");
        let mut handle = tokio::time::timeout(
            self.config.connect_timeout,
            client::connect(
                ssh_config,
                (self.config.host.as_str(), self.config.port),
                handler,
            ),
        )
        .await
        .map_err(|_| Error::Offline { host: host.clone() })?
        .map_err(|e| classify_connect_error(&host, e, &rejection))?;

        let accepted = match &self.config.auth {
            SshAuth::Password(password) => {
                handle
                    .authenticate_password(&self.config.username, password.expose_secret())
                    .await
            }
            SshAuth::KeyFile { path, passphrase } => {
                let key = russh_keys::load_secret_key(
                    path,
                    passphrase.as_ref().map(ExposeSecret::expose_secret),
                )
                .map_err(|e| Error::Key {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                })?;
                handle
                    .authenticate_publickey(&self.config.username, Arc::new(key))
                    .await
            }
        }
        .map_err(|e| Error::Connect {
            host: host.clone(),
            reason: e.to_string(),
        })?;

        if !accepted {
            return Err(Error::Authentication {
                host,
                user: self.config.username.clone(),
            });
        }

        info!(%host, user = %self.config.username, "ssh session established");
        Ok(handle)
    }

    /// Open a channel on the current session, connecting first if needed.
    async fn open_channel(&self) -> Result<Channel<Msg>, Error> {
        let mut session = self.session.lock().await;

        if session.as_ref().is_none_or(Handle::is_closed) {
            *session = Some(self.connect().await?);
        }
        let Some(handle) = session.as_ref() else {
            return Err(Error::Channel("session unavailable".into()));
        };

        let opened =
            tokio::time::timeout(self.config.connect_timeout, handle.channel_open_session()).await;
        match opened {
            Ok(Ok(channel)) => Ok(channel),
            Ok(Err(e)) => {
                *session = None;
                Err(Error::Channel(e.to_string()))
            }
            Err(_) => {
                *session = None;
                Err(Error::Offline {
                    host: self.host_label(),
                })
            }
        }
    }
}

#[async_trait]
impl Transport for SshTransport {
    fn target(&self) -> String {
        format!("{}@{}", self.config.username, self.host_label())
    }

    async fn probe(&self) -> Result<Probe, Error> {
        // A channel round trip proves both the TCP path and the session.
        let channel = self.open_channel().await?;
        let _ = channel.close().await;
        Ok(Probe::connected())
    }

    async fn execute(&self, command: &str, timeout: Duration) -> Result<CommandOutput, Error> {
        let channel = self.open_channel().await?;
        debug!(target = %self.target(), command, "executing");

        tokio::time::timeout(timeout, run_on_channel(channel, command))
            .await
            .map_err(|_| Error::Timeout { timeout })?
    }

    fn can_wake(&self) -> bool {
        self.config.mac_address.is_some()
    }

    async fn wake(&self) -> Result<(), Error> {
        let mac = self
            .config
            .mac_address
            .ok_or(Error::Unsupported("wake without a MAC address"))?;
        wake::send_magic_packet(mac).await
    }

    async fn close(&self) {
        if let Some(handle) = self.session.lock().await.take() {
            let _ = handle
                .disconnect(Disconnect::ByApplication, "closing", "en")
                .await;
            debug!(host = %self.host_label(), "ssh session closed");
        }
    }
}

async fn run_on_channel(mut channel: Channel<Msg>, command: &str) -> Result<CommandOutput, Error> {
    channel
        .exec(true, command)
        .await
        .map_err(|e| Error::Channel(e.to_string()))?;

    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { ref data } => stdout.extend_from_slice(data),
            ChannelMsg::ExtendedData { ref data, ext } if ext == STDERR_STREAM => {
                stderr.extend_from_slice(data);
            }
            ChannelMsg::ExitStatus { exit_status: code } => exit_status = Some(code),
            _ => {}
        }
    }

    let exit_status =
        exit_status.ok_or_else(|| Error::Channel(format!("'{command}' exited without a status")))?;

    Ok(CommandOutput {
        command: command.to_owned(),
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_status,
    })
}

fn classify_connect_error(
    host: &str,
    err: russh::Error,
    rejection: &Mutex<Option<String>>,
) -> Error {
    match err {
        russh::Error::UnknownKey => {
            let reason = rejection
                .lock()
                .ok()
                .and_then(|mut slot| slot.take())
                .unwrap_or_else(|| "unknown server key".into());
            Error::HostKey {
                host: host.to_owned(),
                reason,
            }
        }
        russh::Error::IO(io) => match io.kind() {
            ErrorKind::TimedOut
            | ErrorKind::HostUnreachable
            | ErrorKind::NetworkUnreachable
            | ErrorKind::NotConnected => Error::Offline {
                host: host.to_owned(),
            },
            _ => Error::Connect {
                host: host.to_owned(),
                reason: io.to_string(),
            },
        },
        other => Error::Connect {
            host: host.to_owned(),
            reason: other.to_string(),
        },
    }
}
