//! `hostwatch devices`: configured devices, read from the config alone.

use serde::Serialize;
use tabled::Tabled;

use hostwatch_config::device_config;

use crate::cli::GlobalOpts;
use crate::error::CliError;
use crate::output;

use super::Context;

#[derive(Debug, Serialize)]
struct DeviceSummary {
    id: String,
    name: String,
    host: String,
    port: u16,
    username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    mac_address: Option<String>,
    allow_turn_off: bool,
    actions: Vec<String>,
    sensors: Vec<String>,
}

// ── Table row ───────────────────────────────────────────────────────

#[derive(Tabled)]
struct DeviceRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Wake")]
    wake: String,
    #[tabled(rename = "Actions")]
    actions: String,
    #[tabled(rename = "Sensors")]
    sensors: usize,
}

impl From<&DeviceSummary> for DeviceRow {
    fn from(d: &DeviceSummary) -> Self {
        Self {
            id: d.id.clone(),
            name: d.name.clone(),
            address: format!("{}@{}:{}", d.username, d.host, d.port),
            wake: d.mac_address.clone().unwrap_or_else(|| "-".into()),
            actions: if d.actions.is_empty() {
                "-".into()
            } else {
                d.actions.join(", ")
            },
            sensors: d.sensors.len(),
        }
    }
}

pub fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    for name in &global.devices {
        ctx.config.device(name)?;
    }

    let mut summaries = Vec::new();
    for (id, entry) in &ctx.config.devices {
        if !global.devices.is_empty() && !global.devices.contains(id) {
            continue;
        }
        let device = device_config(id, entry, &ctx.config.defaults)?;
        summaries.push(DeviceSummary {
            id: device.id.clone(),
            name: device.name.clone(),
            host: entry.host.clone(),
            port: entry.port.unwrap_or(22),
            username: entry.username.clone(),
            mac_address: entry.mac_address.map(|mac| mac.to_string()),
            allow_turn_off: device.allow_turn_off,
            actions: device.actions.iter().map(|a| a.key.clone()).collect(),
            sensors: device
                .sensor_commands
                .iter()
                .flat_map(|c| c.sensors.iter().map(|s| s.key.clone()))
                .collect(),
        });
    }

    let out = output::render_list(ctx.format, &summaries, |s| DeviceRow::from(s))?;
    output::print_output(&out, ctx.quiet);
    Ok(())
}
