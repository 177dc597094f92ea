// ── Device context ──
//
// Everything that belongs to one configured device: its session, its
// coordinators, and the entities it registers. Cheaply cloneable; one
// context per device, created at setup and torn down at shutdown.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use hostwatch_api::{CommandOutput, Transport};

use crate::config::DeviceConfig;
use crate::coordinator::{AuthFailure, CoordinatorGroup, SensorBatchCoordinator, StateCoordinator};
use crate::error::{CoreError, OperationError};
use crate::model::{
    Capability, CommandSpec, EntityDescriptor, EntitySource, SensorValue, Variables,
};
use crate::reconcile::ChildReconciler;
use crate::registry::RegistryBoundary;
use crate::session::{RemoteSession, SessionState};
use crate::store::SensorStore;

pub const NETWORK_AVAILABILITY: &str = "network_availability";
pub const SSH_AVAILABILITY: &str = "ssh_availability";

/// Outcome of polling one sensor key.
#[derive(Debug, Clone)]
pub struct SensorPoll {
    pub key: String,
    pub name: Option<String>,
    pub result: Result<Option<SensorValue>, OperationError>,
}

#[derive(Clone)]
pub struct Device {
    inner: Arc<DeviceInner>,
}

struct DeviceInner {
    config: DeviceConfig,
    session: Arc<RemoteSession>,
    group: Arc<CoordinatorGroup>,
    state: Arc<StateCoordinator>,
    batches: Vec<Arc<SensorBatchCoordinator>>,
    boundary: Arc<RegistryBoundary>,
    shut_down: CancellationToken,
}

impl Device {
    /// Build the device context. Nothing runs until [`setup`](Self::setup).
    pub fn new(
        config: DeviceConfig,
        transport: Arc<dyn Transport>,
        boundary: Arc<RegistryBoundary>,
    ) -> Self {
        let session = Arc::new(RemoteSession::new(
            config.id.clone(),
            transport,
            &config.sensor_commands,
            config.command_timeout,
        ));
        let group = Arc::new(CoordinatorGroup::new(Arc::clone(&session)));
        let state = StateCoordinator::new(&config, Arc::clone(&session), Arc::clone(&group));
        let reconciler = Arc::new(ChildReconciler::new(config.id.clone(), Arc::clone(&boundary)));
        let shut_down = CancellationToken::new();

        let batches = config
            .sensor_commands
            .iter()
            .enumerate()
            .map(|(index, command)| {
                SensorBatchCoordinator::new(
                    &config.id,
                    index,
                    command.clone(),
                    Arc::clone(&session),
                    Arc::clone(&group),
                    Arc::clone(&reconciler),
                    shut_down.clone(),
                )
            })
            .collect();

        Self {
            inner: Arc::new(DeviceInner {
                config,
                session,
                group,
                state,
                batches,
                boundary,
                shut_down,
            }),
        }
    }

    // ── Accessors ────────────────────────────────────────────────────

    pub fn id(&self) -> &str {
        &self.inner.config.id
    }

    pub fn name(&self) -> &str {
        &self.inner.config.name
    }

    pub fn config(&self) -> &DeviceConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Arc<RemoteSession> {
        &self.inner.session
    }

    pub fn state(&self) -> SessionState {
        self.inner.session.state()
    }

    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.inner.session.subscribe()
    }

    pub fn sensors(&self) -> &SensorStore {
        self.inner.session.sensors()
    }

    pub fn state_coordinator(&self) -> &Arc<StateCoordinator> {
        &self.inner.state
    }

    pub fn sensor_coordinators(&self) -> &[Arc<SensorBatchCoordinator>] {
        &self.inner.batches
    }

    pub fn group(&self) -> &Arc<CoordinatorGroup> {
        &self.inner.group
    }

    pub fn auth_failure(&self) -> Option<AuthFailure> {
        self.inner.group.failure()
    }

    pub fn subscribe_auth_failures(&self) -> watch::Receiver<Option<AuthFailure>> {
        self.inner.group.subscribe()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.is_cancelled()
    }

    // ── Lifecycle ────────────────────────────────────────────────────

    /// First refresh, initial sensor read, entity registration and
    /// (optionally) timer start.
    ///
    /// A fatal failure aborts setup. An offline device still sets up and
    /// recovers on a later tick.
    pub async fn setup(&self, start_timers: bool) -> Result<(), CoreError> {
        self.setup_with(start_timers, true).await
    }

    /// Setup ahead of a one-shot operation: first refresh and entity
    /// registration only. The operation does whatever reads it needs.
    pub async fn setup_for_dispatch(&self) -> Result<(), CoreError> {
        self.setup_with(false, false).await
    }

    async fn setup_with(&self, start_timers: bool, initial_read: bool) -> Result<(), CoreError> {
        self.ensure_active()?;
        let inner = &self.inner;

        inner.state.spawn();
        for batch in &inner.batches {
            batch.spawn();
        }

        for descriptor in self.static_entities() {
            inner.boundary.schedule_register(descriptor);
        }

        match inner.state.refresh().await {
            Ok(state) => debug!(device = %self.id(), ?state, "first refresh"),
            Err(err) if err.kind().is_fatal() => return Err(err),
            Err(err) => info!(device = %self.id(), error = %err, "device unavailable at setup"),
        }

        if initial_read && self.state().connected() {
            for batch in &inner.batches {
                if let Err(err) = batch.refresh().await {
                    if err.kind().is_fatal() {
                        return Err(err);
                    }
                    warn!(device = %self.id(), error = %err, "initial sensor read failed");
                }
            }
        }

        if start_timers {
            self.start();
        }
        info!(device = %self.id(), "device ready");
        Ok(())
    }

    /// Start every coordinator (clears a previous auth failure).
    pub fn start(&self) {
        if !self.is_shut_down() {
            self.inner.group.start_all();
        }
    }

    pub fn stop(&self) {
        self.inner.group.stop_all();
    }

    /// Stop all coordinators, deregister entities and close the session.
    /// In-flight ticks finish but their results are discarded.
    pub async fn shutdown(&self) {
        if self.is_shut_down() {
            return;
        }
        self.inner.shut_down.cancel();
        self.inner.group.shutdown_all().await;

        let mut ids: Vec<String> = self.static_entities().into_iter().map(|e| e.id).collect();
        ids.extend(
            self.sensors()
                .snapshot()
                .into_iter()
                .filter(|s| s.parent.is_some())
                .map(|s| EntityDescriptor::entity_id(self.id(), &s.key)),
        );
        for id in ids {
            self.inner.boundary.schedule_remove(id);
        }

        self.inner.session.close().await;
        info!(device = %self.id(), "device shut down");
    }

    // ── Entities ─────────────────────────────────────────────────────

    /// Entities that exist for the device's whole lifetime.
    pub fn static_entities(&self) -> Vec<EntityDescriptor> {
        let id = self.id();
        let mut entities = vec![
            EntityDescriptor::new(
                id,
                NETWORK_AVAILABILITY,
                "Network availability",
                Capability::Readable,
                EntitySource::NetworkAvailability,
            ),
            EntityDescriptor::new(
                id,
                SSH_AVAILABILITY,
                "SSH availability",
                Capability::Readable,
                EntitySource::SshAvailability,
            ),
        ];

        for action in &self.inner.config.actions {
            entities.push(EntityDescriptor::new(
                id,
                action.key.clone(),
                action.name.clone(),
                Capability::Pressable,
                EntitySource::Action {
                    key: action.key.clone(),
                },
            ));
        }

        for spec in self.sensors().declared().filter(|s| !s.dynamic) {
            let mut descriptor = EntityDescriptor::new(
                id,
                spec.key.clone(),
                spec.display_name(),
                Capability::for_sensor(spec),
                EntitySource::Sensor {
                    key: spec.key.clone(),
                },
            );
            descriptor.unit.clone_from(&spec.unit);
            descriptor.attributes.clone_from(&spec.attributes);
            entities.push(descriptor);
        }
        entities
    }

    /// Current value behind an entity.
    pub fn entity_value(&self, source: &EntitySource) -> Option<SensorValue> {
        match source {
            EntitySource::Sensor { key } => self.sensors().value(key),
            EntitySource::NetworkAvailability => Some(SensorValue::Bool(self.state().reachable)),
            EntitySource::SshAvailability => Some(SensorValue::Bool(self.state().authenticated)),
            EntitySource::Action { .. } => None,
        }
    }

    // ── Operations ───────────────────────────────────────────────────

    /// Run an ad-hoc command. A non-zero exit is returned as output, not
    /// as an error.
    pub async fn execute_command(
        &self,
        command: &str,
        variables: &Variables,
        timeout: Option<Duration>,
    ) -> Result<CommandOutput, CoreError> {
        self.ensure_active()?;
        let spec = CommandSpec {
            template: command.to_owned(),
            timeout,
        };
        self.inner
            .session
            .execute(&spec, variables, &[])
            .await
            .inspect_err(|err| {
                self.inner.group.observe("execute_command", err);
            })
    }

    /// Run a configured action. A non-zero exit is an execution error.
    pub async fn run_action(
        &self,
        key: &str,
        variables: &Variables,
    ) -> Result<CommandOutput, CoreError> {
        self.ensure_active()?;
        let action = self
            .inner
            .config
            .action(key)
            .ok_or_else(|| CoreError::ActionNotFound { key: key.to_owned() })?;
        self.inner
            .session
            .execute_checked(&action.command, variables, &action.required_variables)
            .await
            .inspect_err(|err| {
                self.inner.group.observe("run_action", err);
            })
    }

    /// Poll `keys`, running each owning command once. One result per key,
    /// in input order. A key succeeds iff it has a value afterwards.
    ///
    /// A child key not seen yet runs its dynamic parent's command and is
    /// resolved against that read.
    pub async fn poll_sensors(&self, keys: &[String]) -> Result<Vec<SensorPoll>, CoreError> {
        self.ensure_active()?;
        let sensors = self.sensors();
        let owners: Vec<usize> = keys
            .iter()
            .filter_map(|k| sensors.owner(k).or_else(|| sensors.pending_owner(k)))
            .collect();
        let outcomes = self.refresh_batches(owners).await;
        Ok(self.collect_polls(keys, &outcomes))
    }

    /// Run every sensor command once, then report every pollable key,
    /// including children the reads just discovered.
    pub async fn poll_all_sensors(&self) -> Result<Vec<SensorPoll>, CoreError> {
        self.ensure_active()?;
        let outcomes = self.refresh_batches(0..self.inner.batches.len()).await;
        let keys = self.sensors().pollable_keys();
        Ok(self.collect_polls(&keys, &outcomes))
    }

    async fn refresh_batches(
        &self,
        indices: impl IntoIterator<Item = usize>,
    ) -> BTreeMap<usize, Result<(), OperationError>> {
        let mut indices: Vec<usize> = indices.into_iter().collect();
        indices.sort_unstable();
        indices.dedup();

        let mut outcomes = BTreeMap::new();
        for index in indices {
            let Some(batch) = self.inner.batches.get(index) else {
                continue;
            };
            let outcome = batch.refresh().await.map_err(|e| OperationError::from(&e));
            outcomes.insert(index, outcome);
        }
        outcomes
    }

    fn collect_polls(
        &self,
        keys: &[String],
        outcomes: &BTreeMap<usize, Result<(), OperationError>>,
    ) -> Vec<SensorPoll> {
        let sensors = self.sensors();
        keys.iter()
            .map(|key| {
                let failed = sensors
                    .owner(key)
                    .or_else(|| sensors.pending_owner(key))
                    .and_then(|index| outcomes.get(&index))
                    .and_then(|outcome| outcome.as_ref().err());
                let result = match (failed, sensors.owner(key)) {
                    (Some(err), _) => Err(err.clone()),
                    (None, None) => Err(OperationError::from(&CoreError::SensorNotFound {
                        key: key.clone(),
                    })),
                    (None, Some(_)) => Ok(sensors.value(key)),
                };
                SensorPoll {
                    key: key.clone(),
                    name: sensors.get(key).map(|s| s.name),
                    result,
                }
            })
            .collect()
    }

    /// Validate and write one sensor value. A child not read yet is
    /// discovered first through its parent's command.
    pub async fn set_sensor_value(
        &self,
        key: &str,
        value: &SensorValue,
    ) -> Result<SensorValue, CoreError> {
        self.ensure_active()?;
        let sensors = self.sensors();
        let pending = match sensors.get(key) {
            Some(_) => None,
            None => sensors.pending_owner(key),
        };
        if let Some(batch) = pending.and_then(|index| self.inner.batches.get(index)) {
            batch.refresh().await?;
        }
        self.inner.state.set_sensor_value(key, value).await
    }

    pub async fn turn_on(&self) -> Result<(), CoreError> {
        self.ensure_active()?;
        self.inner.state.turn_on().await
    }

    pub async fn turn_off(&self) -> Result<CommandOutput, CoreError> {
        self.ensure_active()?;
        self.inner.state.turn_off().await
    }

    pub async fn restart(&self) -> Result<CommandOutput, CoreError> {
        self.ensure_active()?;
        self.inner.state.restart().await
    }

    fn ensure_active(&self) -> Result<(), CoreError> {
        if self.is_shut_down() {
            Err(CoreError::ShutDown {
                device: self.id().to_owned(),
            })
        } else {
            Ok(())
        }
    }
}
