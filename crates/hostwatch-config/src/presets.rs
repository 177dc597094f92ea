// ── Built-in presets ──
//
// Ready-made action and sensor sets, embedded as TOML in the same shape
// a device entry uses.

use serde::Deserialize;

use crate::{ActionEntry, ConfigError, SensorCommandEntry};

const LINUX: &str = r#"
[[actions]]
key = "turn_off"
command = "poweroff"

[[actions]]
key = "restart"
command = "reboot"

[[sensor_commands]]
command = "hostname; uname -r; uname -m"
[[sensor_commands.sensors]]
key = "hostname"
kind = "text"
[[sensor_commands.sensors]]
key = "kernel_version"
kind = "text"
[[sensor_commands.sensors]]
key = "architecture"
kind = "text"

[[sensor_commands]]
command = "cut -d' ' -f1 /proc/loadavg; free | awk '/^Mem:/ { printf \"%.1f\\n\", $3 * 100 / $2 }'; cut -d. -f1 /proc/uptime"
interval = 30
[[sensor_commands.sensors]]
key = "load"
kind = "number"
float = true
[[sensor_commands.sensors]]
key = "memory_usage"
kind = "number"
float = true
unit = "%"
[[sensor_commands.sensors]]
key = "uptime"
kind = "number"
unit = "s"

[[sensor_commands]]
command = "df -P -x tmpfs -x devtmpfs | awk 'NR > 1 { print $1, $5 }'"
interval = 300
[[sensor_commands.sensors]]
key = "disk_usage"
kind = "number"
dynamic = true
unit = "%"
"#;

#[derive(Debug, Default, Deserialize)]
pub(crate) struct Preset {
    #[serde(default)]
    pub actions: Vec<ActionEntry>,
    #[serde(default)]
    pub sensor_commands: Vec<SensorCommandEntry>,
}

/// Names accepted by a device entry's `preset` field.
pub fn preset_names() -> &'static [&'static str] {
    &["linux"]
}

pub(crate) fn load(name: &str) -> Result<Preset, ConfigError> {
    match name {
        "linux" => Ok(toml::from_str(LINUX)?),
        other => Err(ConfigError::Validation {
            field: "preset".into(),
            reason: format!("unknown preset '{other}'"),
        }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn every_preset_parses() {
        for name in preset_names() {
            let preset = load(name).unwrap();
            assert!(!preset.sensor_commands.is_empty(), "{name}");
        }
    }

    #[test]
    fn linux_disk_usage_is_dynamic() {
        let preset = load("linux").unwrap();
        let disk = preset
            .sensor_commands
            .iter()
            .flat_map(|c| &c.sensors)
            .find(|s| s.key == "disk_usage")
            .unwrap();
        assert!(disk.dynamic);
        assert_eq!(disk.unit.as_deref(), Some("%"));
    }
}
