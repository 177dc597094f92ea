// ── Command descriptors ──

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

use super::sensor::SensorSpec;

/// Template variables passed when rendering a command.
pub type Variables = BTreeMap<String, serde_json::Value>;

/// A command template plus its execution limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandSpec {
    /// minijinja template, rendered with the call's variables.
    pub template: String,
    /// Overrides the device's command timeout.
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            timeout: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A named command the user can trigger (`turn_off`, `restart`, custom).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionCommand {
    pub key: String,
    pub name: String,
    pub command: CommandSpec,
    /// Variables that must be supplied for the template to render.
    pub required_variables: Vec<String>,
}

impl ActionCommand {
    pub fn new(key: impl Into<String>, template: impl Into<String>) -> Self {
        let key = key.into();
        Self {
            name: humanize(&key),
            key,
            command: CommandSpec::new(template),
            required_variables: Vec::new(),
        }
    }
}

/// A read command whose output feeds one or more sensors.
///
/// With an `interval` it gets its own Sensor Batch Coordinator; without
/// one it only runs on demand.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorCommand {
    pub command: CommandSpec,
    pub interval: Option<Duration>,
    pub sensors: Vec<SensorSpec>,
}

impl SensorCommand {
    pub fn new(template: impl Into<String>, sensors: Vec<SensorSpec>) -> Self {
        Self {
            command: CommandSpec::new(template),
            interval: None,
            sensors,
        }
    }

    pub fn every(mut self, interval: Duration) -> Self {
        self.interval = Some(interval);
        self
    }
}

/// `cpu_temperature` -> `Cpu temperature`.
pub(crate) fn humanize(key: &str) -> String {
    let spaced = key.replace(['_', '-'], " ");
    let mut chars = spaced.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
