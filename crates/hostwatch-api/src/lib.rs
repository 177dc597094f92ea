// hostwatch-api: transport layer for reaching a remote host over SSH

pub mod error;
pub mod ssh;
pub mod transport;
pub mod wake;

pub use error::Error;
pub use ssh::{HostKeyPolicy, SshAuth, SshConfig, SshTransport};
pub use transport::{CommandOutput, Probe, Transport};
pub use wake::MacAddress;
