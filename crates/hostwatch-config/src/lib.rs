//! Configuration for hostwatch.
//!
//! TOML device definitions, credential resolution (env + plaintext),
//! built-in presets, and translation to `hostwatch_core::DeviceConfig`
//! plus `hostwatch_api::SshConfig`. The CLI adds flag-aware wrappers on
//! top.

mod presets;

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::{BaseDirs, ProjectDirs};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use hostwatch_api::{HostKeyPolicy, MacAddress, SshAuth, SshConfig};
use hostwatch_core::{ActionCommand, CommandSpec, DeviceConfig, SensorCommand, SensorSpec};

pub use presets::preset_names;

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials configured for device '{device}'")]
    NoCredentials { device: String },

    #[error("unknown device '{device}'")]
    UnknownDevice { device: String },

    #[error("failed to parse built-in preset: {0}")]
    Preset(#[from] toml::de::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Devices keyed by id.
    #[serde(default)]
    pub devices: BTreeMap<String, DeviceEntry>,
}

/// Intervals and timeouts are whole seconds.
#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_update_interval")]
    pub update_interval: u64,

    #[serde(default = "default_fast_poll_interval")]
    pub fast_poll_interval: u64,

    #[serde(default = "default_fast_poll_window")]
    pub fast_poll_window: u64,

    #[serde(default = "default_command_timeout")]
    pub command_timeout: u64,

    #[serde(default = "default_connect_timeout")]
    pub connect_timeout: u64,

    #[serde(default = "default_output")]
    pub output: String,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            update_interval: default_update_interval(),
            fast_poll_interval: default_fast_poll_interval(),
            fast_poll_window: default_fast_poll_window(),
            command_timeout: default_command_timeout(),
            connect_timeout: default_connect_timeout(),
            output: default_output(),
        }
    }
}

fn default_update_interval() -> u64 {
    hostwatch_core::config::DEFAULT_UPDATE_INTERVAL.as_secs()
}
fn default_fast_poll_interval() -> u64 {
    hostwatch_core::config::DEFAULT_FAST_POLL_INTERVAL.as_secs()
}
fn default_fast_poll_window() -> u64 {
    hostwatch_core::config::DEFAULT_FAST_POLL_WINDOW.as_secs()
}
fn default_command_timeout() -> u64 {
    hostwatch_core::config::DEFAULT_COMMAND_TIMEOUT.as_secs()
}
fn default_connect_timeout() -> u64 {
    10
}
fn default_output() -> String {
    "table".into()
}

/// One SSH-reachable device.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DeviceEntry {
    /// Display name (defaults to the id).
    pub name: Option<String>,

    pub host: String,

    pub port: Option<u16>,

    #[serde(default = "default_username")]
    pub username: String,

    /// Plaintext password (prefer `password_env`).
    pub password: Option<String>,

    /// Environment variable holding the password.
    pub password_env: Option<String>,

    /// Private key file; `~` is expanded.
    pub identity_file: Option<PathBuf>,

    pub passphrase: Option<String>,

    /// OpenSSH `known_hosts` file. Without it (or a fingerprint) any
    /// host key is accepted and logged.
    pub known_hosts: Option<PathBuf>,

    /// Expected `SHA256:...` host key fingerprint.
    pub host_key_fingerprint: Option<String>,

    /// Enables `turn_on` via wake-on-LAN.
    pub mac_address: Option<MacAddress>,

    #[serde(default)]
    pub allow_turn_off: bool,

    /// Overrides `defaults.update_interval`.
    pub update_interval: Option<u64>,

    /// Overrides `defaults.command_timeout`.
    pub command_timeout: Option<u64>,

    /// Built-in command/sensor set merged under this entry's own.
    pub preset: Option<String>,

    #[serde(default)]
    pub actions: Vec<ActionEntry>,

    #[serde(default)]
    pub sensor_commands: Vec<SensorCommandEntry>,
}

fn default_username() -> String {
    "root".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionEntry {
    pub key: String,
    pub name: Option<String>,
    pub command: String,
    pub timeout: Option<u64>,
    #[serde(default)]
    pub required_variables: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SensorCommandEntry {
    pub command: String,
    /// Seconds between runs. Without one the command only runs on demand.
    pub interval: Option<u64>,
    pub timeout: Option<u64>,
    #[serde(default)]
    pub sensors: Vec<SensorSpec>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("dev", "hostwatch", "hostwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = BaseDirs::new().map_or_else(|| PathBuf::from("."), |d| d.home_dir().to_owned());
    p.push(".config");
    p.push("hostwatch");
    p
}

/// Expand a leading `~/` to the home directory.
pub fn expand_home(path: &Path) -> PathBuf {
    match (path.strip_prefix("~"), BaseDirs::new()) {
        (Ok(rest), Some(dirs)) => dirs.home_dir().join(rest),
        _ => path.to_owned(),
    }
}

// ── Config loading ──────────────────────────────────────────────────

/// Layer defaults, the TOML file and `HOSTWATCH_` environment variables.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("HOSTWATCH_").split("__"))
}

/// Load and validate the config at `path` (or the platform default).
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.map_or_else(config_path, Path::to_owned);
    let config: Config = figment(&path).extract()?;
    config.validate()?;
    Ok(config)
}

// ── Validation ──────────────────────────────────────────────────────

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let d = &self.defaults;
        for (field, value) in [
            ("defaults.update_interval", d.update_interval),
            ("defaults.fast_poll_interval", d.fast_poll_interval),
            ("defaults.fast_poll_window", d.fast_poll_window),
            ("defaults.command_timeout", d.command_timeout),
            ("defaults.connect_timeout", d.connect_timeout),
        ] {
            if value == 0 {
                return Err(invalid(field, "must be at least 1 second"));
            }
        }
        if !matches!(d.output.as_str(), "table" | "json" | "json-compact") {
            return Err(invalid(
                "defaults.output",
                format!("expected 'table', 'json' or 'json-compact', got '{}'", d.output),
            ));
        }

        for (id, entry) in &self.devices {
            validate_device(id, entry)?;
        }
        Ok(())
    }

    pub fn device(&self, id: &str) -> Result<&DeviceEntry, ConfigError> {
        self.devices
            .get(id)
            .ok_or_else(|| ConfigError::UnknownDevice { device: id.into() })
    }

    /// Translate every device, in id order.
    pub fn resolve_all(&self) -> Result<Vec<ResolvedDevice>, ConfigError> {
        self.devices
            .iter()
            .map(|(id, entry)| resolve_device(id, entry, &self.defaults))
            .collect()
    }
}

fn validate_device(id: &str, entry: &DeviceEntry) -> Result<(), ConfigError> {
    let field = |name: &str| format!("devices.{id}.{name}");

    if id.is_empty() || id.contains('.') || id.chars().any(char::is_whitespace) {
        return Err(invalid(
            format!("devices.{id}"),
            "device ids must be non-empty and contain no dots or whitespace",
        ));
    }
    if entry.host.trim().is_empty() {
        return Err(invalid(field("host"), "must not be empty"));
    }
    if entry.port == Some(0) {
        return Err(invalid(field("port"), "must be between 1 and 65535"));
    }
    if entry.update_interval == Some(0) {
        return Err(invalid(field("update_interval"), "must be at least 1 second"));
    }
    if entry.password.is_none() && entry.password_env.is_none() && entry.identity_file.is_none()
    {
        return Err(ConfigError::NoCredentials { device: id.into() });
    }
    if let Some(preset) = &entry.preset {
        if !preset_names().contains(&preset.as_str()) {
            return Err(invalid(
                field("preset"),
                format!("unknown preset '{preset}' (known: {})", preset_names().join(", ")),
            ));
        }
    }

    let mut keys = HashSet::new();
    for command in &entry.sensor_commands {
        if command.interval == Some(0) {
            return Err(invalid(
                field("sensor_commands"),
                format!("interval of '{}' must be at least 1 second", command.command),
            ));
        }
        for sensor in &command.sensors {
            if !keys.insert(sensor.key.as_str()) {
                return Err(invalid(
                    field("sensor_commands"),
                    format!("duplicate sensor key '{}'", sensor.key),
                ));
            }
        }
    }
    Ok(())
}

// ── Translation ─────────────────────────────────────────────────────

/// Everything needed to build one device: core settings and transport.
#[derive(Debug, Clone)]
pub struct ResolvedDevice {
    pub device: DeviceConfig,
    pub ssh: SshConfig,
}

/// Build core and transport settings for one device entry.
pub fn resolve_device(
    id: &str,
    entry: &DeviceEntry,
    defaults: &Defaults,
) -> Result<ResolvedDevice, ConfigError> {
    Ok(ResolvedDevice {
        device: device_config(id, entry, defaults)?,
        ssh: ssh_config(id, entry, defaults)?,
    })
}

/// Core settings, with the preset (if any) merged under the entry.
pub fn device_config(
    id: &str,
    entry: &DeviceEntry,
    defaults: &Defaults,
) -> Result<DeviceConfig, ConfigError> {
    let secs = Duration::from_secs;
    let mut config = DeviceConfig::new(id);
    config.name = entry.name.clone().unwrap_or_else(|| id.to_owned());
    config.update_interval = secs(entry.update_interval.unwrap_or(defaults.update_interval));
    config.fast_poll_interval = secs(defaults.fast_poll_interval);
    config.fast_poll_window = secs(defaults.fast_poll_window);
    config.command_timeout = secs(entry.command_timeout.unwrap_or(defaults.command_timeout));
    config.allow_turn_off = entry.allow_turn_off;

    let (mut actions, mut sensor_commands) = match &entry.preset {
        Some(name) => {
            let preset = presets::load(name)?;
            (preset.actions, preset.sensor_commands)
        }
        None => (Vec::new(), Vec::new()),
    };

    // Entry actions replace preset actions with the same key.
    for action in &entry.actions {
        actions.retain(|a| a.key != action.key);
        actions.push(action.clone());
    }
    // Entry sensors replace preset sensors with the same key.
    let own: HashSet<&str> = entry
        .sensor_commands
        .iter()
        .flat_map(|c| c.sensors.iter().map(|s| s.key.as_str()))
        .collect();
    for command in &mut sensor_commands {
        command.sensors.retain(|s| !own.contains(s.key.as_str()));
    }
    sensor_commands.retain(|c| !c.sensors.is_empty());
    sensor_commands.extend(entry.sensor_commands.iter().cloned());

    config.actions = actions.into_iter().map(action_command).collect();
    config.sensor_commands = sensor_commands.into_iter().map(sensor_command).collect();
    Ok(config)
}

fn action_command(entry: ActionEntry) -> ActionCommand {
    let mut action = ActionCommand::new(entry.key, entry.command);
    if let Some(name) = entry.name {
        action.name = name;
    }
    action.command.timeout = entry.timeout.map(Duration::from_secs);
    action.required_variables = entry.required_variables;
    action
}

fn sensor_command(entry: SensorCommandEntry) -> SensorCommand {
    SensorCommand {
        command: CommandSpec {
            template: entry.command,
            timeout: entry.timeout.map(Duration::from_secs),
        },
        interval: entry.interval.map(Duration::from_secs),
        sensors: entry.sensors,
    }
}

/// Transport settings with credentials resolved.
pub fn ssh_config(
    id: &str,
    entry: &DeviceEntry,
    defaults: &Defaults,
) -> Result<SshConfig, ConfigError> {
    let host_keys = match (&entry.host_key_fingerprint, &entry.known_hosts) {
        (Some(fingerprint), _) => HostKeyPolicy::Fingerprint(fingerprint.clone()),
        (None, Some(path)) => HostKeyPolicy::KnownHosts(expand_home(path)),
        (None, None) => HostKeyPolicy::AcceptAny,
    };

    Ok(SshConfig {
        host: entry.host.clone(),
        port: entry.port.unwrap_or(22),
        username: entry.username.clone(),
        auth: resolve_auth(id, entry)?,
        host_keys,
        connect_timeout: Duration::from_secs(defaults.connect_timeout),
        mac_address: entry.mac_address,
    })
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve credentials: password env var, then plaintext password, then
/// identity file.
pub fn resolve_auth(id: &str, entry: &DeviceEntry) -> Result<SshAuth, ConfigError> {
    // 1. Entry's password_env → env var lookup
    if let Some(ref env_name) = entry.password_env {
        if let Ok(val) = std::env::var(env_name) {
            return Ok(SshAuth::Password(SecretString::from(val)));
        }
    }

    // 2. Plaintext in config
    if let Some(ref password) = entry.password {
        return Ok(SshAuth::Password(SecretString::from(password.clone())));
    }

    // 3. Key file
    if let Some(ref path) = entry.identity_file {
        return Ok(SshAuth::KeyFile {
            path: expand_home(path),
            passphrase: entry.passphrase.clone().map(SecretString::from),
        });
    }

    Err(ConfigError::NoCredentials { device: id.into() })
}
