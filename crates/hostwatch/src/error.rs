//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use hostwatch_config::ConfigError;
use hostwatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const PERMISSION: i32 = 5;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not connect to {device}: {reason}")]
    #[diagnostic(
        code(hostwatch::connection_failed),
        help("Check that the host is up and its SSH port is reachable.")
    )]
    ConnectionFailed { device: String, reason: String },

    #[error("Device {device} is offline")]
    #[diagnostic(
        code(hostwatch::offline),
        help("Power it on with: hostwatch on --device {device}")
    )]
    Offline { device: String },

    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(hostwatch::timeout),
        help("Raise the limit with --timeout or defaults.command_timeout.")
    )]
    Timeout { seconds: u64 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed: {message}")]
    #[diagnostic(
        code(hostwatch::auth_failed),
        help(
            "Verify the username and credentials of the device entry.\n\
             A rejected host key needs known_hosts or host_key_fingerprint updated."
        )
    )]
    AuthFailed { message: String },

    #[error("No credentials configured for device '{device}'")]
    #[diagnostic(
        code(hostwatch::no_credentials),
        help("Set password, password_env or identity_file under [devices.{device}].")
    )]
    NoCredentials { device: String },

    // ── Lookup ───────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(hostwatch::not_found),
        help("List the configured devices with: hostwatch devices")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
    },

    #[error("No devices configured in {path}")]
    #[diagnostic(
        code(hostwatch::no_devices),
        help("Add a [devices.NAME] table with at least host and a credential.")
    )]
    NoDevices { path: String },

    // ── Request ──────────────────────────────────────────────────────
    #[error("Invalid {field}: {reason}")]
    #[diagnostic(code(hostwatch::validation))]
    Validation { field: String, reason: String },

    #[error("Operation not supported: {operation} (requires {required})")]
    #[diagnostic(
        code(hostwatch::unsupported),
        help("Configure the missing action or capability on the device entry.")
    )]
    Unsupported { operation: String, required: String },

    #[error("Operation not permitted: {operation} ({reason})")]
    #[diagnostic(code(hostwatch::permission_denied))]
    PermissionDenied { operation: String, reason: String },

    #[error("{message}")]
    #[diagnostic(code(hostwatch::execution_failed))]
    ExecutionFailed { message: String },

    #[error("{failed} of {total} targets failed")]
    #[diagnostic(code(hostwatch::partial_failure))]
    PartialFailure { failed: usize, total: usize },

    // ── Configuration ────────────────────────────────────────────────
    #[error(transparent)]
    #[diagnostic(
        code(hostwatch::config),
        help("Check the config file syntax and HOSTWATCH_* environment variables.")
    )]
    Config(Box<ConfigError>),

    #[error("Internal error: {0}")]
    #[diagnostic(code(hostwatch::internal))]
    Internal(String),

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Cannot serialize output: {0}")]
    #[diagnostic(code(hostwatch::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::Offline { .. } => exit_code::CONNECTION,
            Self::AuthFailed { .. } | Self::NoCredentials { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } => exit_code::USAGE,
            Self::Unsupported { .. } | Self::PermissionDenied { .. } => exit_code::PERMISSION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => CliError::Validation { field, reason },
            ConfigError::NoCredentials { device } => CliError::NoCredentials { device },
            ConfigError::UnknownDevice { device } => CliError::NotFound {
                resource_type: "device".into(),
                identifier: device,
            },
            other => CliError::Config(Box::new(other)),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Offline { device } => CliError::Offline { device },
            CoreError::ConnectionFailed { device, reason } => {
                CliError::ConnectionFailed { device, reason }
            }
            CoreError::Timeout { timeout_secs } => CliError::Timeout {
                seconds: timeout_secs,
            },
            CoreError::AuthenticationFailed { message } | CoreError::HostKeyRejected { message } => {
                CliError::AuthFailed { message }
            }
            CoreError::ValidationFailed { message } => CliError::Validation {
                field: "input".into(),
                reason: message,
            },
            CoreError::Unsupported {
                operation,
                required,
            } => CliError::Unsupported {
                operation,
                required,
            },
            CoreError::PermissionDenied { operation, reason } => {
                CliError::PermissionDenied { operation, reason }
            }
            CoreError::SensorNotFound { key } => CliError::NotFound {
                resource_type: "sensor".into(),
                identifier: key,
            },
            CoreError::ActionNotFound { key } => CliError::NotFound {
                resource_type: "action".into(),
                identifier: key,
            },
            CoreError::DeviceNotFound { identifier } => CliError::NotFound {
                resource_type: "device".into(),
                identifier,
            },
            err @ (CoreError::ExecutionFailed { .. }
            | CoreError::Session { .. }
            | CoreError::ShutDown { .. }) => CliError::ExecutionFailed {
                message: err.to_string(),
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => CliError::Internal(message),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_stable_exit_codes() {
        let cases = [
            (
                CoreError::Offline {
                    device: "nas".into(),
                },
                exit_code::CONNECTION,
            ),
            (
                CoreError::HostKeyRejected {
                    message: "mismatch".into(),
                },
                exit_code::AUTH,
            ),
            (
                CoreError::ActionNotFound {
                    key: "backup".into(),
                },
                exit_code::NOT_FOUND,
            ),
            (
                CoreError::PermissionDenied {
                    operation: "turn_off".into(),
                    reason: "allow_turn_off is false".into(),
                },
                exit_code::PERMISSION,
            ),
            (
                CoreError::ValidationFailed {
                    message: "bad".into(),
                },
                exit_code::USAGE,
            ),
            (CoreError::Timeout { timeout_secs: 3 }, exit_code::TIMEOUT),
        ];
        for (err, code) in cases {
            let label = err.to_string();
            assert_eq!(CliError::from(err).exit_code(), code, "{label}");
        }
    }

    #[test]
    fn config_validation_keeps_the_field() {
        let err = CliError::from(ConfigError::Validation {
            field: "devices.pi.port".into(),
            reason: "must be non-zero".into(),
        });
        assert_eq!(err.exit_code(), exit_code::USAGE);
        assert!(err.to_string().contains("devices.pi.port"));
    }
}
