// ── Core error types ──
//
// User-facing errors from hostwatch-core. Consumers never see russh
// errors directly: the `From<hostwatch_api::Error>` impl translates
// transport failures into domain variants, and `classify` reduces any
// error to the small `ErrorKind` taxonomy the coordinators act on.

use serde::Serialize;
use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connectivity ─────────────────────────────────────────────────
    #[error("Device {device} is offline")]
    Offline { device: String },

    #[error("Cannot connect to {device}: {reason}")]
    ConnectionFailed { device: String, reason: String },

    #[error("Timed out after {timeout_secs}s")]
    Timeout { timeout_secs: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("Host key rejected: {message}")]
    HostKeyRejected { message: String },

    // ── Execution ────────────────────────────────────────────────────
    #[error("Command '{command}' failed with exit status {exit_status}: {stderr}")]
    ExecutionFailed {
        command: String,
        exit_status: u32,
        stderr: String,
    },

    #[error("Remote session error: {message}")]
    Session { message: String },

    // ── Request errors ───────────────────────────────────────────────
    #[error("Validation failed: {message}")]
    ValidationFailed { message: String },

    #[error("Operation not supported: {operation} (requires {required})")]
    Unsupported { operation: String, required: String },

    #[error("Operation not permitted: {operation} ({reason})")]
    PermissionDenied { operation: String, reason: String },

    // ── Lookup errors ────────────────────────────────────────────────
    #[error("Sensor not found: {key}")]
    SensorNotFound { key: String },

    #[error("Action not found: {key}")]
    ActionNotFound { key: String },

    #[error("Device not found: {identifier}")]
    DeviceNotFound { identifier: String },

    // ── Lifecycle ────────────────────────────────────────────────────
    #[error("Device {device} has been shut down")]
    ShutDown { device: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<hostwatch_api::Error> for CoreError {
    fn from(err: hostwatch_api::Error) -> Self {
        use hostwatch_api::Error as Api;

        match err {
            Api::Offline { host } => CoreError::Offline { device: host },
            Api::Connect { host, reason } => CoreError::ConnectionFailed {
                device: host,
                reason,
            },
            Api::Timeout { timeout } => CoreError::Timeout {
                timeout_secs: timeout.as_secs(),
            },
            Api::Authentication { host, user } => CoreError::AuthenticationFailed {
                message: format!("server rejected credentials for {user}@{host}"),
            },
            Api::HostKey { host, reason } => CoreError::HostKeyRejected {
                message: format!("{host}: {reason}"),
            },
            Api::Key { path, reason } => CoreError::AuthenticationFailed {
                message: format!("cannot load key {path}: {reason}"),
            },
            Api::Channel(message) => CoreError::Session { message },
            Api::Wake(message) => CoreError::Session {
                message: format!("wake-on-LAN: {message}"),
            },
            Api::Unsupported(operation) => CoreError::Unsupported {
                operation: operation.into(),
                required: "transport support".into(),
            },
        }
    }
}

impl From<minijinja::Error> for CoreError {
    fn from(err: minijinja::Error) -> Self {
        CoreError::ValidationFailed {
            message: format!("template: {err}"),
        }
    }
}

// ── Classification ───────────────────────────────────────────────────

/// Coarse error class used for scheduling decisions and result records.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display, strum::AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ErrorKind {
    /// Host did not answer.
    Offline,
    /// Host answered but no session could be opened.
    Connect,
    /// Credentials or host key rejected. Fatal for the session.
    Authentication,
    /// The command ran (or tried to) and failed.
    Execution,
    /// Malformed input, rejected before anything ran.
    Validation,
    /// The device lacks the capability or permission.
    Capability,
    /// Unknown device, sensor or action.
    NotFound,
    Internal,
}

impl ErrorKind {
    /// Retried on the next tick without stopping anything.
    pub fn is_transient(self) -> bool {
        matches!(self, Self::Offline | Self::Connect)
    }

    /// Stops every coordinator sharing the session.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::Authentication)
    }
}

/// Reduce an error to its [`ErrorKind`].
pub fn classify(err: &CoreError) -> ErrorKind {
    match err {
        CoreError::Offline { .. } => ErrorKind::Offline,
        CoreError::ConnectionFailed { .. } => ErrorKind::Connect,
        CoreError::AuthenticationFailed { .. } | CoreError::HostKeyRejected { .. } => {
            ErrorKind::Authentication
        }
        // Connect-phase timeouts surface as `Offline`; this one means the
        // command outran its deadline on a live session.
        CoreError::ExecutionFailed { .. }
        | CoreError::Session { .. }
        | CoreError::Timeout { .. } => ErrorKind::Execution,
        CoreError::ValidationFailed { .. } | CoreError::Config { .. } => ErrorKind::Validation,
        CoreError::Unsupported { .. } | CoreError::PermissionDenied { .. } => {
            ErrorKind::Capability
        }
        CoreError::SensorNotFound { .. }
        | CoreError::ActionNotFound { .. }
        | CoreError::DeviceNotFound { .. } => ErrorKind::NotFound,
        CoreError::ShutDown { .. } | CoreError::Internal(_) => ErrorKind::Internal,
    }
}

impl CoreError {
    pub fn kind(&self) -> ErrorKind {
        classify(self)
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        Self::ValidationFailed {
            message: message.into(),
        }
    }
}

// ── Result-record form ───────────────────────────────────────────────

/// Serializable error carried in per-target result records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OperationError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CoreError> for OperationError {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}

impl From<CoreError> for OperationError {
    fn from(err: CoreError) -> Self {
        Self::from(&err)
    }
}

impl std::fmt::Display for OperationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.kind)
    }
}
