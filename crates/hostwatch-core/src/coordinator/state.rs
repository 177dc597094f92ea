// ── State coordinator ──
//
// The device heartbeat. Each tick probes the session; a fatal failure
// halts the whole group. After a user-triggered power transition the
// coordinator fast-polls until the expected state shows up or the
// window closes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use hostwatch_api::CommandOutput;

use super::group::CoordinatorGroup;
use super::task::{PeriodicTask, Tick, TickGuard};
use crate::config::{ACTION_RESTART, ACTION_TURN_OFF, DeviceConfig};
use crate::error::CoreError;
use crate::model::{ActionCommand, SensorValue, Variables};
use crate::session::{RemoteSession, SessionState};

/// Condition that ends fast-poll mode.
pub type DonePredicate = Arc<dyn Fn(&SessionState) -> bool + Send + Sync>;

struct FastPoll {
    deadline: Instant,
    is_done: DonePredicate,
}

pub struct StateCoordinator {
    task: Arc<PeriodicTask>,
    session: Arc<RemoteSession>,
    group: Arc<CoordinatorGroup>,
    regular_interval: Duration,
    fast_interval: Duration,
    fast_window: Duration,
    allow_turn_off: bool,
    actions: Vec<ActionCommand>,
    fast_poll: Mutex<Option<FastPoll>>,
}

impl StateCoordinator {
    pub fn new(
        config: &DeviceConfig,
        session: Arc<RemoteSession>,
        group: Arc<CoordinatorGroup>,
    ) -> Arc<Self> {
        let task = Arc::new(PeriodicTask::new(
            format!("{}:state", config.id),
            config.update_interval,
        ));
        group.attach(Arc::clone(&task));

        Arc::new(Self {
            task,
            session,
            group,
            regular_interval: config.update_interval,
            fast_interval: config.fast_poll_interval,
            fast_window: config.fast_poll_window,
            allow_turn_off: config.allow_turn_off,
            actions: config.actions.clone(),
            fast_poll: Mutex::new(None),
        })
    }

    /// Spawn the scheduling loop (stopped until the group starts it).
    pub fn spawn(self: &Arc<Self>) {
        self.task.spawn(Arc::clone(self) as Arc<dyn Tick>);
    }

    pub fn task(&self) -> &Arc<PeriodicTask> {
        &self.task
    }

    pub fn is_fast_polling(&self) -> bool {
        self.fast_poll.lock().is_ok_and(|slot| slot.is_some())
    }

    // ── Refresh ──────────────────────────────────────────────────────

    /// Run one tick now, serialized with scheduled ticks, and report the
    /// probe outcome.
    pub async fn refresh(&self) -> Result<SessionState, CoreError> {
        let guard = self.task.guard();
        self.task.exclusive(self.update(&guard)).await
    }

    async fn update(&self, guard: &TickGuard) -> Result<SessionState, CoreError> {
        let outcome = self.session.probe().await;
        if guard.is_stale() {
            debug!(task = %self.task.name(), "discarding probe result after shutdown");
            return outcome.map(|_| self.session.state());
        }

        let result = match outcome {
            Ok(probe) => {
                self.session.record_probe(probe);
                Ok(self.session.state())
            }
            Err(err) => {
                if self.group.observe(self.task.name(), &err) {
                    return Err(err);
                }
                debug!(task = %self.task.name(), error = %err, "state refresh failed");
                Err(err)
            }
        };

        self.evaluate_fast_poll();
        result
    }

    // ── Fast poll ────────────────────────────────────────────────────

    /// Switch to the fast interval until `is_done` holds or the window
    /// closes, and tick immediately.
    pub fn enter_fast_poll(&self, is_done: DonePredicate) {
        let deadline = Instant::now() + self.fast_window;
        if let Ok(mut slot) = self.fast_poll.lock() {
            *slot = Some(FastPoll { deadline, is_done });
        }
        self.task.set_interval(self.fast_interval);
        self.task.trigger_now();
        info!(
            task = %self.task.name(),
            interval = ?self.fast_interval,
            window = ?self.fast_window,
            "fast polling"
        );
    }

    fn evaluate_fast_poll(&self) {
        let Ok(mut slot) = self.fast_poll.lock() else {
            return;
        };
        let Some(fast) = slot.as_ref() else {
            return;
        };

        let done = (fast.is_done)(&self.session.state());
        let expired = Instant::now() > fast.deadline;
        if done || expired {
            *slot = None;
            self.task.set_interval(self.regular_interval);
            info!(
                task = %self.task.name(),
                done,
                expired,
                "leaving fast poll"
            );
        }
    }

    // ── Power operations ─────────────────────────────────────────────

    /// Send the wake signal, then fast-poll until the device is reachable.
    pub async fn turn_on(&self) -> Result<(), CoreError> {
        if !self.session.transport().can_wake() {
            return Err(CoreError::validation(
                "device has no wake capability (configure a MAC address)",
            ));
        }
        self.session.transport().wake().await?;
        self.enter_fast_poll(Arc::new(|state: &SessionState| state.reachable));
        Ok(())
    }

    /// Run the `turn_off` action, then fast-poll until unreachable.
    pub async fn turn_off(&self) -> Result<CommandOutput, CoreError> {
        if !self.allow_turn_off {
            return Err(CoreError::PermissionDenied {
                operation: ACTION_TURN_OFF.into(),
                reason: "allow_turn_off is not enabled".into(),
            });
        }
        self.power_action(ACTION_TURN_OFF).await
    }

    /// Run the `restart` action, then fast-poll until unreachable.
    pub async fn restart(&self) -> Result<CommandOutput, CoreError> {
        self.power_action(ACTION_RESTART).await
    }

    async fn power_action(&self, key: &str) -> Result<CommandOutput, CoreError> {
        let action = self
            .actions
            .iter()
            .find(|a| a.key == key)
            .ok_or_else(|| CoreError::Unsupported {
                operation: key.to_owned(),
                required: format!("a '{key}' action"),
            })?;

        let output = self
            .session
            .execute_checked(&action.command, &Variables::new(), &action.required_variables)
            .await
            .inspect_err(|err| {
                self.group.observe(key, err);
            })?;
        self.enter_fast_poll(Arc::new(|state: &SessionState| !state.reachable));
        Ok(output)
    }

    /// Validate and write one sensor value through the session.
    pub async fn set_sensor_value(
        &self,
        key: &str,
        value: &SensorValue,
    ) -> Result<SensorValue, CoreError> {
        self.session
            .write_sensor(key, value)
            .await
            .inspect_err(|err| {
                self.group.observe("set_sensor_value", err);
            })
    }
}

#[async_trait]
impl Tick for StateCoordinator {
    async fn tick(&self, guard: &TickGuard) {
        if let Err(err) = self.update(guard).await {
            if !err.kind().is_fatal() && !err.kind().is_transient() {
                warn!(task = %self.task.name(), error = %err, "unexpected state refresh failure");
            }
        }
    }
}
