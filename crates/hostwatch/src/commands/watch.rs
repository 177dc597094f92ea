//! `hostwatch watch`: run every coordinator and print changes until ctrl-c.
//!
//! Table output prints one human-readable line per change. JSON output
//! prints one compact object per line, tagged by `event`.

use std::collections::BTreeMap;

use chrono::{DateTime, Local, Utc};
use owo_colors::OwoColorize;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use hostwatch_core::{Device, ErrorKind, SensorValue, SessionState};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::error::CliError;
use crate::output;

use super::{Context, SetupMode, build_hub, setup};

pub async fn handle(ctx: &Context, global: &GlobalOpts) -> Result<(), CliError> {
    let (hub, _registry) = build_hub(ctx, &global.devices)?;
    if let Some(missing) = global.devices.iter().find(|d| hub.get(d).is_none()) {
        hub.shutdown_all().await;
        return Err(CliError::NotFound {
            resource_type: "device".into(),
            identifier: missing.clone(),
        });
    }

    setup(&hub, SetupMode::Watch).await;

    let printer = Printer {
        format: ctx.format,
        color: ctx.color,
        quiet: ctx.quiet,
    };
    let mut watchers: Vec<JoinHandle<()>> = Vec::new();
    for device in hub.devices() {
        watchers.push(tokio::spawn(watch_state(device.clone(), printer)));
        watchers.push(tokio::spawn(watch_sensors(device.clone(), printer)));
        watchers.push(tokio::spawn(watch_auth(device, printer)));
    }
    info!(devices = hub.len(), "watching, press ctrl-c to stop");

    let signal = tokio::signal::ctrl_c().await;
    info!("shutting down");
    for watcher in &watchers {
        watcher.abort();
    }
    hub.shutdown_all().await;
    signal?;
    Ok(())
}

// ── Events ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
enum WatchEvent<'a> {
    State {
        device: &'a str,
        at: DateTime<Utc>,
        reachable: bool,
        authenticated: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        last_error: Option<ErrorKind>,
    },
    Sensor {
        device: &'a str,
        at: DateTime<Utc>,
        key: &'a str,
        value: Option<&'a SensorValue>,
        #[serde(skip_serializing_if = "Option::is_none")]
        unit: Option<&'a str>,
    },
    Removed {
        device: &'a str,
        at: DateTime<Utc>,
        key: &'a str,
    },
    Halted {
        device: &'a str,
        at: DateTime<Utc>,
        source: &'a str,
        message: &'a str,
    },
}

impl<'a> WatchEvent<'a> {
    fn state(device: &'a str, state: &SessionState) -> Self {
        Self::State {
            device,
            at: state.updated_at.unwrap_or_else(Utc::now),
            reachable: state.reachable,
            authenticated: state.authenticated,
            last_error: state.last_error,
        }
    }

    fn device(&self) -> &str {
        match self {
            Self::State { device, .. }
            | Self::Sensor { device, .. }
            | Self::Removed { device, .. }
            | Self::Halted { device, .. } => device,
        }
    }

    fn describe(&self, color: bool) -> String {
        match self {
            Self::State {
                reachable,
                authenticated,
                last_error,
                ..
            } => {
                let label = match (reachable, authenticated) {
                    (true, true) => paint("online", color, Tone::Good),
                    (true, false) => paint("reachable, no session", color, Tone::Warn),
                    (false, _) => paint("offline", color, Tone::Bad),
                };
                match last_error {
                    Some(kind) => format!("{label} (last error: {kind})"),
                    None => label,
                }
            }
            Self::Sensor {
                key, value, unit, ..
            } => match value {
                Some(value) => format!("{key} = {value}{}", unit.unwrap_or_default()),
                None => format!("{key} = {}", paint("unavailable", color, Tone::Warn)),
            },
            Self::Removed { key, .. } => format!("{key} removed"),
            Self::Halted {
                source, message, ..
            } => paint(&format!("halted by {source}: {message}"), color, Tone::Bad),
        }
    }
}

#[derive(Clone, Copy)]
enum Tone {
    Good,
    Warn,
    Bad,
}

fn paint(text: &str, color: bool, tone: Tone) -> String {
    if !color {
        return text.to_owned();
    }
    match tone {
        Tone::Good => text.green().to_string(),
        Tone::Warn => text.yellow().to_string(),
        Tone::Bad => text.red().bold().to_string(),
    }
}

// ── Printer ─────────────────────────────────────────────────────────

#[derive(Clone, Copy)]
struct Printer {
    format: OutputFormat,
    color: bool,
    quiet: bool,
}

impl Printer {
    fn emit(self, event: &WatchEvent<'_>) {
        let line = match self.format {
            OutputFormat::Table => {
                let time = Local::now().format("%H:%M:%S").to_string();
                let device = event.device();
                if self.color {
                    format!(
                        "{} {:<12} {}",
                        time.dimmed(),
                        device.bold(),
                        event.describe(true)
                    )
                } else {
                    format!("{time} {device:<12} {}", event.describe(false))
                }
            }
            OutputFormat::Json | OutputFormat::JsonCompact => {
                match output::render_json(event, true) {
                    Ok(line) => line,
                    Err(e) => {
                        warn!(error = %e, "cannot render watch event");
                        return;
                    }
                }
            }
        };
        output::print_output(&line, self.quiet);
    }
}

// ── Watchers ────────────────────────────────────────────────────────

async fn watch_state(device: Device, printer: Printer) {
    let mut rx = device.subscribe_state();
    let mut last = rx.borrow_and_update().clone();
    printer.emit(&WatchEvent::state(device.id(), &last));

    while rx.changed().await.is_ok() {
        let state = rx.borrow_and_update().clone();
        if state.reachable != last.reachable
            || state.authenticated != last.authenticated
            || state.last_error != last.last_error
        {
            printer.emit(&WatchEvent::state(device.id(), &state));
        }
        last = state;
    }
}

async fn watch_sensors(device: Device, printer: Printer) {
    let mut rx = device.sensors().subscribe();
    let mut known: BTreeMap<String, Option<SensorValue>> = BTreeMap::new();

    loop {
        let sensors = rx.borrow_and_update().clone();
        let now = Utc::now();
        for sensor in sensors.iter().filter(|s| !s.is_dynamic) {
            if known.get(&sensor.key) == Some(&sensor.value) {
                continue;
            }
            printer.emit(&WatchEvent::Sensor {
                device: device.id(),
                at: now,
                key: &sensor.key,
                value: sensor.value.as_ref(),
                unit: sensor.unit.as_deref(),
            });
            known.insert(sensor.key.clone(), sensor.value.clone());
        }
        known.retain(|key, _| {
            let present = sensors.iter().any(|s| s.key == *key);
            if !present {
                printer.emit(&WatchEvent::Removed {
                    device: device.id(),
                    at: now,
                    key,
                });
            }
            present
        });

        if rx.changed().await.is_err() {
            break;
        }
    }
}

async fn watch_auth(device: Device, printer: Printer) {
    let mut rx = device.subscribe_auth_failures();
    loop {
        let failure = rx.borrow_and_update().clone();
        if let Some(failure) = failure {
            printer.emit(&WatchEvent::Halted {
                device: device.id(),
                at: failure.at,
                source: &failure.source,
                message: &failure.message,
            });
        }
        if rx.changed().await.is_err() {
            break;
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn state_lines_name_the_condition() {
        let mut state = SessionState {
            reachable: true,
            authenticated: true,
            ..SessionState::default()
        };
        assert_eq!(WatchEvent::state("nas", &state).describe(false), "online");

        state.authenticated = false;
        state.last_error = Some(ErrorKind::Authentication);
        assert_eq!(
            WatchEvent::state("nas", &state).describe(false),
            "reachable, no session (last error: authentication)"
        );
    }

    #[test]
    fn sensor_events_serialize_with_a_tag() {
        let value = SensorValue::Number(41.0);
        let event = WatchEvent::Sensor {
            device: "nas",
            at: Utc::now(),
            key: "disk_sda1",
            value: Some(&value),
            unit: Some("%"),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "sensor");
        assert_eq!(json["value"], 41.0);
        assert_eq!(event.describe(false), "disk_sda1 = 41%");
    }
}
