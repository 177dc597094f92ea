// ── Sensor batch coordinator ──
//
// One batched read command feeding the sensors it owns. Scheduled ticks
// skip entirely while the device is not connected and swallow every
// non-fatal failure; on-demand polls report them.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::group::CoordinatorGroup;
use super::task::{PeriodicTask, Tick, TickGuard};
use crate::convert::parse_output;
use crate::error::CoreError;
use crate::model::{SensorCommand, Variables};
use crate::reconcile::ChildReconciler;
use crate::session::RemoteSession;

pub struct SensorBatchCoordinator {
    index: usize,
    command: SensorCommand,
    /// `None` for on-demand commands (no interval).
    task: Option<Arc<PeriodicTask>>,
    /// Cancelled when the owning device shuts down.
    device_shut_down: CancellationToken,
    name: String,
    session: Arc<RemoteSession>,
    group: Arc<CoordinatorGroup>,
    reconciler: Arc<ChildReconciler>,
}

impl SensorBatchCoordinator {
    pub fn new(
        device: &str,
        index: usize,
        command: SensorCommand,
        session: Arc<RemoteSession>,
        group: Arc<CoordinatorGroup>,
        reconciler: Arc<ChildReconciler>,
        device_shut_down: CancellationToken,
    ) -> Arc<Self> {
        let name = format!("{device}:sensors#{index}");
        let task = command.interval.map(|interval| {
            let task = Arc::new(PeriodicTask::new(name.clone(), interval));
            group.attach(Arc::clone(&task));
            task
        });

        Arc::new(Self {
            index,
            command,
            task,
            device_shut_down,
            name,
            session,
            group,
            reconciler,
        })
    }

    pub fn spawn(self: &Arc<Self>) {
        if let Some(task) = &self.task {
            task.spawn(Arc::clone(self) as Arc<dyn Tick>);
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn command(&self) -> &SensorCommand {
        &self.command
    }

    pub fn task(&self) -> Option<&Arc<PeriodicTask>> {
        self.task.as_ref()
    }

    /// Run the batch now, serialized with scheduled ticks, and report
    /// the outcome.
    pub async fn refresh(&self) -> Result<(), CoreError> {
        if !self.session.state().connected() {
            return Err(CoreError::Offline {
                device: self.session.device().to_owned(),
            });
        }
        match &self.task {
            Some(task) => {
                let guard = task.guard();
                task.exclusive(self.run(&guard)).await
            }
            None => {
                let guard = TickGuard::from_token(self.device_shut_down.clone());
                self.run(&guard).await
            }
        }
    }

    async fn run(&self, guard: &TickGuard) -> Result<(), CoreError> {
        let outcome = self
            .session
            .execute(&self.command.command, &Variables::new(), &[])
            .await;
        if guard.is_stale() {
            debug!(task = %self.name, "discarding batch result after shutdown");
            return Ok(());
        }

        match outcome {
            Ok(output) if output.success() => {
                let readings = parse_output(&self.command.sensors, &output.stdout);
                let events = self.session.sensors().apply(&self.command.sensors, readings);
                self.reconciler.handle_all(events);
                Ok(())
            }
            Ok(output) => Err(CoreError::ExecutionFailed {
                command: output.command,
                exit_status: output.exit_status,
                stderr: output.stderr.trim().to_owned(),
            }),
            Err(err) => {
                self.group.observe(&self.name, &err);
                Err(err)
            }
        }
    }
}

#[async_trait]
impl Tick for SensorBatchCoordinator {
    async fn tick(&self, guard: &TickGuard) {
        if !self.session.state().connected() {
            debug!(task = %self.name, "device not connected; skipping");
            return;
        }
        if let Err(err) = self.run(guard).await {
            if !err.kind().is_fatal() {
                warn!(task = %self.name, error = %err, "sensor batch failed");
            }
        }
    }
}
