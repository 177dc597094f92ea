// ── Remote session ──
//
// Wraps one transport with the device's observable liveness state and
// sensor store. Calls that touch the network (`probe`, `execute`) have no
// side effects; callers fold their outcome back in with `record_*`, which
// lets a coordinator drop results that arrive after shutdown.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tracing::debug;

use hostwatch_api::{CommandOutput, Probe, Transport};

use crate::error::{CoreError, ErrorKind};
use crate::model::{CommandSpec, SensorCommand, SensorValue, Variables};
use crate::render::render_command;
use crate::store::SensorStore;

/// Liveness flags observable by consumers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SessionState {
    pub reachable: bool,
    pub authenticated: bool,
    pub last_error: Option<ErrorKind>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SessionState {
    /// Reachable with an authenticated session.
    pub fn connected(&self) -> bool {
        self.reachable && self.authenticated
    }
}

pub struct RemoteSession {
    device: String,
    transport: Arc<dyn Transport>,
    state: watch::Sender<SessionState>,
    sensors: SensorStore,
    command_timeout: Duration,
}

impl RemoteSession {
    pub fn new(
        device: impl Into<String>,
        transport: Arc<dyn Transport>,
        sensor_commands: &[SensorCommand],
        command_timeout: Duration,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::default());
        Self {
            device: device.into(),
            transport,
            state,
            sensors: SensorStore::new(sensor_commands),
            command_timeout,
        }
    }

    pub fn device(&self) -> &str {
        &self.device
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    pub fn sensors(&self) -> &SensorStore {
        &self.sensors
    }

    // ── State ────────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn record_probe(&self, probe: Probe) {
        self.state.send_modify(|state| {
            state.reachable = probe.reachable;
            state.authenticated = probe.authenticated;
            state.last_error = None;
            state.updated_at = Some(Utc::now());
        });
    }

    /// Fold a failure into the liveness flags.
    pub fn record_error(&self, err: &CoreError) {
        let kind = err.kind();
        self.state.send_if_modified(|state| {
            match kind {
                ErrorKind::Offline => {
                    state.reachable = false;
                    state.authenticated = false;
                }
                // The host answered, but there is no usable session.
                ErrorKind::Connect | ErrorKind::Authentication => {
                    state.reachable = true;
                    state.authenticated = false;
                }
                // Remote command failures say nothing about liveness.
                _ => return false,
            }
            state.last_error = Some(kind);
            state.updated_at = Some(Utc::now());
            true
        });
    }

    /// Mark the session unusable without touching reachability.
    pub fn invalidate(&self) {
        self.state.send_if_modified(|state| {
            let was = state.authenticated;
            state.authenticated = false;
            was
        });
    }

    // ── Remote calls ─────────────────────────────────────────────────

    pub async fn probe(&self) -> Result<Probe, CoreError> {
        Ok(self.transport.probe().await?)
    }

    /// Render and run a command, returning its output whatever the exit
    /// status.
    pub async fn execute(
        &self,
        spec: &CommandSpec,
        variables: &Variables,
        required: &[String],
    ) -> Result<CommandOutput, CoreError> {
        let command = render_command(&spec.template, variables, required)?;
        let timeout = spec.timeout.unwrap_or(self.command_timeout);
        debug!(device = %self.device, %command, "running command");
        Ok(self.transport.execute(&command, timeout).await?)
    }

    /// Like [`execute`](Self::execute), but a non-zero exit is an error.
    pub async fn execute_checked(
        &self,
        spec: &CommandSpec,
        variables: &Variables,
        required: &[String],
    ) -> Result<CommandOutput, CoreError> {
        let output = self.execute(spec, variables, required).await?;
        if output.success() {
            Ok(output)
        } else {
            Err(CoreError::ExecutionFailed {
                command: output.command,
                exit_status: output.exit_status,
                stderr: output.stderr.trim().to_owned(),
            })
        }
    }

    /// Validate locally, run the sensor's write command, then store the
    /// value.
    pub async fn write_sensor(
        &self,
        key: &str,
        value: &SensorValue,
    ) -> Result<SensorValue, CoreError> {
        let target = self.sensors.write_target(key)?;
        let template = target
            .spec
            .set_command
            .clone()
            .ok_or_else(|| CoreError::Unsupported {
                operation: format!("set {key}"),
                required: "a set_command for the sensor".into(),
            })?;
        let (typed, rendered) = target.spec.kind.validate(value)?;

        let mut variables = Variables::new();
        variables.insert("value".into(), rendered.into());
        if let Some(id) = target.child_id {
            variables.insert("id".into(), id.into());
        }

        self.execute_checked(&CommandSpec::new(template), &variables, &[])
            .await?;
        self.sensors.set_value(key, typed.clone());
        Ok(typed)
    }

    pub async fn close(&self) {
        self.transport.close().await;
        self.invalidate();
    }
}
