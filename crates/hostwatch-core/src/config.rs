// ── Runtime device configuration ──
//
// Describes *what* to poll and *how often* for one device. Built by the
// config crate (or tests) and handed to `Device::new`; core never reads
// config files.

use std::time::Duration;

use crate::model::{ActionCommand, SensorCommand};

/// Default regular interval of the State Coordinator.
pub const DEFAULT_UPDATE_INTERVAL: Duration = Duration::from_secs(30);
/// Interval used while fast-polling after a power transition.
pub const DEFAULT_FAST_POLL_INTERVAL: Duration = Duration::from_secs(2);
/// Ceiling on how long fast-poll mode may last.
pub const DEFAULT_FAST_POLL_WINDOW: Duration = Duration::from_secs(120);
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(15);

/// Well-known action keys.
pub const ACTION_TURN_OFF: &str = "turn_off";
pub const ACTION_RESTART: &str = "restart";

/// Configuration for one device.
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Stable identifier, used as the prefix of every entity id.
    pub id: String,
    /// Display name.
    pub name: String,
    pub update_interval: Duration,
    pub fast_poll_interval: Duration,
    pub fast_poll_window: Duration,
    /// Applied to every command that does not declare its own timeout.
    pub command_timeout: Duration,
    /// Gate for the `turn_off` action.
    pub allow_turn_off: bool,
    pub actions: Vec<ActionCommand>,
    pub sensor_commands: Vec<SensorCommand>,
}

impl DeviceConfig {
    pub fn new(id: impl Into<String>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            update_interval: DEFAULT_UPDATE_INTERVAL,
            fast_poll_interval: DEFAULT_FAST_POLL_INTERVAL,
            fast_poll_window: DEFAULT_FAST_POLL_WINDOW,
            command_timeout: DEFAULT_COMMAND_TIMEOUT,
            allow_turn_off: false,
            actions: Vec::new(),
            sensor_commands: Vec::new(),
        }
    }

    pub fn action(&self, key: &str) -> Option<&ActionCommand> {
        self.actions.iter().find(|a| a.key == key)
    }
}
