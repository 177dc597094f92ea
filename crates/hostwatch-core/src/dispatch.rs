// ── Fan-out dispatch ──
//
// One logical operation, run concurrently against every resolved target.
// Per-target failures become result records; only malformed requests
// fail the whole call, and they fail before anything runs.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::device::{Device, SensorPoll};
use crate::error::{CoreError, OperationError};
use crate::model::{SensorValue, Variables};

// ── Requests ─────────────────────────────────────────────────────────

/// A logical operation and its payload.
#[derive(Debug, Clone)]
pub enum Operation {
    ExecuteCommand {
        command: String,
        variables: Variables,
        timeout: Option<Duration>,
    },
    RunAction {
        key: String,
        variables: Variables,
    },
    PollSensors,
    /// Values pair positionally with the selected entities.
    SetSensorValues {
        values: Vec<SensorValue>,
    },
    TurnOn,
    TurnOff,
    Restart,
}

impl Operation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::ExecuteCommand { .. } => "execute_command",
            Self::RunAction { .. } => "run_action",
            Self::PollSensors => "poll_sensors",
            Self::SetSensorValues { .. } => "set_sensor_values",
            Self::TurnOn => "turn_on",
            Self::TurnOff => "turn_off",
            Self::Restart => "restart",
        }
    }

    /// Produces one record per selected entity rather than per device.
    pub fn is_entity_scoped(&self) -> bool {
        matches!(self, Self::PollSensors | Self::SetSensorValues { .. })
    }
}

/// Which devices or entities a request addresses.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum TargetSelection {
    #[default]
    All,
    /// Device ids.
    Devices(Vec<String>),
    /// Entity ids of the form `{device}.{key}`.
    Entities(Vec<String>),
}

#[derive(Debug, Clone)]
pub struct Request {
    pub operation: Operation,
    pub selection: TargetSelection,
}

impl Request {
    pub fn new(operation: Operation, selection: TargetSelection) -> Self {
        Self {
            operation,
            selection,
        }
    }
}

// ── Targets ──────────────────────────────────────────────────────────

/// One selected entity and its position in the request's selection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedEntity {
    pub position: usize,
    pub key: String,
}

/// A device and the entity subset an operation is scoped to.
#[derive(Clone)]
pub struct Target {
    pub device_id: String,
    /// `None` if the id matched no configured device.
    pub device: Option<Device>,
    /// `None` means the whole device.
    pub entities: Option<Vec<SelectedEntity>>,
}

/// Expands a selection into targets, in selection order.
pub trait TargetResolver: Send + Sync {
    fn resolve(&self, selection: &TargetSelection) -> Vec<Target>;
}

/// Split `{device}.{key}` at the first dot.
pub fn split_entity_id(id: &str) -> Option<(&str, &str)> {
    id.split_once('.')
        .filter(|(device, key)| !device.is_empty() && !key.is_empty())
}

// ── Results ──────────────────────────────────────────────────────────

/// Outcome for one device or one entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetResult {
    /// Device id, or entity id for entity-scoped records.
    pub target: String,
    pub device: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entity: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OperationError>,
    #[serde(skip)]
    position: usize,
}

impl TargetResult {
    fn from_result(
        device: &str,
        entity: Option<&SelectedEntity>,
        result: Result<Option<serde_json::Value>, OperationError>,
    ) -> Self {
        let (target, key, position) = match entity {
            Some(selected) => (
                format!("{device}.{}", selected.key),
                Some(selected.key.clone()),
                selected.position,
            ),
            None => (device.to_owned(), None, 0),
        };
        let (success, payload, error) = match result {
            Ok(payload) => (true, payload, None),
            Err(err) => (false, None, Some(err)),
        };
        Self {
            target,
            device: device.to_owned(),
            entity: key,
            success,
            payload,
            error,
            position,
        }
    }
}

/// All records of one dispatched operation.
#[derive(Debug, Clone, Serialize)]
pub struct AggregatedResult {
    pub operation: &'static str,
    pub results: Vec<TargetResult>,
}

impl AggregatedResult {
    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.success).count()
    }

    pub fn failed(&self) -> usize {
        self.results.len() - self.succeeded()
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.success)
    }
}

// ── Dispatcher ───────────────────────────────────────────────────────

pub struct Dispatcher {
    resolver: Arc<dyn TargetResolver>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<dyn TargetResolver>) -> Self {
        Self { resolver }
    }

    /// Validate, resolve, fan out and aggregate.
    ///
    /// Only request-level validation fails the call. Entity-scoped
    /// records come back in selection order.
    pub async fn dispatch(&self, request: &Request) -> Result<AggregatedResult, CoreError> {
        validate(request)?;

        let targets = self.resolver.resolve(&request.selection);
        debug!(
            operation = request.operation.name(),
            targets = targets.len(),
            "dispatching"
        );

        let futs = targets
            .iter()
            .map(|target| run_target(&request.operation, target));
        let mut results: Vec<TargetResult> = futures_util::future::join_all(futs)
            .await
            .into_iter()
            .flatten()
            .collect();

        if matches!(request.selection, TargetSelection::Entities(_)) {
            results.sort_by_key(|r| r.position);
        }

        let aggregated = AggregatedResult {
            operation: request.operation.name(),
            results,
        };
        info!(
            operation = aggregated.operation,
            succeeded = aggregated.succeeded(),
            failed = aggregated.failed(),
            "dispatch finished"
        );
        Ok(aggregated)
    }
}

fn validate(request: &Request) -> Result<(), CoreError> {
    if let Operation::SetSensorValues { values } = &request.operation {
        let TargetSelection::Entities(entities) = &request.selection else {
            return Err(CoreError::validation(
                "setting values requires an explicit entity selection",
            ));
        };
        if values.len() < entities.len() {
            return Err(CoreError::validation(format!(
                "{} value(s) supplied for {} entities",
                values.len(),
                entities.len()
            )));
        }
    }
    if let TargetSelection::Entities(entities) = &request.selection {
        if let Some(bad) = entities.iter().find(|id| split_entity_id(id).is_none()) {
            return Err(CoreError::validation(format!(
                "'{bad}' is not an entity id (expected device.key)"
            )));
        }
    }
    Ok(())
}

/// Run the operation against one target. Never fails: errors become
/// records.
async fn run_target(operation: &Operation, target: &Target) -> Vec<TargetResult> {
    let Some(device) = &target.device else {
        let err = OperationError::from(CoreError::DeviceNotFound {
            identifier: target.device_id.clone(),
        });
        return match &target.entities {
            Some(entities) => entities
                .iter()
                .map(|e| TargetResult::from_result(&target.device_id, Some(e), Err(err.clone())))
                .collect(),
            None => vec![TargetResult::from_result(&target.device_id, None, Err(err))],
        };
    };

    let id = device.id();
    let whole = |result: Result<Option<serde_json::Value>, CoreError>| {
        vec![TargetResult::from_result(
            id,
            None,
            result.map_err(OperationError::from),
        )]
    };

    match operation {
        Operation::ExecuteCommand {
            command,
            variables,
            timeout,
        } => whole(
            device
                .execute_command(command, variables, *timeout)
                .await
                .map(|output| Some(json!(output))),
        ),
        Operation::RunAction { key, variables } => whole(
            device
                .run_action(key, variables)
                .await
                .map(|output| Some(json!(output))),
        ),
        Operation::TurnOn => whole(device.turn_on().await.map(|()| None)),
        Operation::TurnOff => whole(device.turn_off().await.map(|output| Some(json!(output)))),
        Operation::Restart => whole(device.restart().await.map(|output| Some(json!(output)))),
        Operation::PollSensors => poll_target(device, target.entities.as_deref()).await,
        Operation::SetSensorValues { values } => {
            set_target(device, target.entities.as_deref().unwrap_or_default(), values).await
        }
    }
}

async fn poll_target(device: &Device, entities: Option<&[SelectedEntity]>) -> Vec<TargetResult> {
    let Some(entities) = entities else {
        // Whole device: the key list is only known after the reads.
        return match device.poll_all_sensors().await {
            Ok(polls) => polls
                .into_iter()
                .enumerate()
                .map(|(position, poll)| {
                    let entity = SelectedEntity {
                        position,
                        key: poll.key.clone(),
                    };
                    TargetResult::from_result(device.id(), Some(&entity), poll_value(poll))
                })
                .collect(),
            Err(err) => vec![TargetResult::from_result(
                device.id(),
                None,
                Err(OperationError::from(err)),
            )],
        };
    };

    let keys: Vec<String> = entities.iter().map(|e| e.key.clone()).collect();
    match device.poll_sensors(&keys).await {
        Ok(polls) => entities
            .iter()
            .zip(polls)
            .map(|(entity, poll)| {
                TargetResult::from_result(device.id(), Some(entity), poll_value(poll))
            })
            .collect(),
        Err(err) => {
            let err = OperationError::from(err);
            entities
                .iter()
                .map(|e| TargetResult::from_result(device.id(), Some(e), Err(err.clone())))
                .collect()
        }
    }
}

fn poll_value(poll: SensorPoll) -> Result<Option<serde_json::Value>, OperationError> {
    match poll.result {
        Ok(Some(value)) => Ok(Some(json!({
            "key": poll.key,
            "name": poll.name,
            "value": value,
        }))),
        Ok(None) => Err(OperationError::from(CoreError::Session {
            message: format!("no value reported for {}", poll.key),
        })),
        Err(err) => Err(err),
    }
}

/// Writes run one after another, in selection order.
async fn set_target(
    device: &Device,
    entities: &[SelectedEntity],
    values: &[SensorValue],
) -> Vec<TargetResult> {
    let mut results = Vec::with_capacity(entities.len());
    for entity in entities {
        let result = match values.get(entity.position) {
            Some(value) => device
                .set_sensor_value(&entity.key, value)
                .await
                .map(|stored| Some(json!({ "key": entity.key, "value": stored })))
                .map_err(OperationError::from),
            None => Err(OperationError::from(CoreError::validation(format!(
                "no value for {}",
                entity.key
            )))),
        };
        results.push(TargetResult::from_result(device.id(), Some(entity), result));
    }
    results
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    struct NoTargets;

    impl TargetResolver for NoTargets {
        fn resolve(&self, _selection: &TargetSelection) -> Vec<Target> {
            Vec::new()
        }
    }

    #[test]
    fn splits_entity_ids_at_first_dot() {
        assert_eq!(split_entity_id("nas.disk_sda1"), Some(("nas", "disk_sda1")));
        assert_eq!(split_entity_id("nas.a.b"), Some(("nas", "a.b")));
        assert_eq!(split_entity_id("nas"), None);
        assert_eq!(split_entity_id(".key"), None);
    }

    #[test]
    fn fewer_values_than_entities_is_rejected() {
        let request = Request::new(
            Operation::SetSensorValues {
                values: vec![SensorValue::Bool(true)],
            },
            TargetSelection::Entities(vec!["nas.a".into(), "nas.b".into()]),
        );
        let err = validate(&request).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed { .. }));
    }

    #[test]
    fn set_without_entities_is_rejected() {
        let request = Request::new(
            Operation::SetSensorValues { values: Vec::new() },
            TargetSelection::All,
        );
        assert!(validate(&request).is_err());
    }

    #[test]
    fn malformed_entity_id_is_rejected() {
        let request = Request::new(
            Operation::PollSensors,
            TargetSelection::Entities(vec!["nas".into()]),
        );
        assert!(validate(&request).is_err());
    }

    #[tokio::test]
    async fn empty_selection_yields_empty_result() {
        let dispatcher = Dispatcher::new(Arc::new(NoTargets));
        let result = dispatcher
            .dispatch(&Request::new(Operation::TurnOn, TargetSelection::All))
            .await
            .unwrap();
        assert_eq!(result.operation, "turn_on");
        assert!(result.results.is_empty());
        assert!(result.all_succeeded());
    }

    #[test]
    fn failure_record_serializes_without_payload() {
        let record = TargetResult::from_result(
            "nas",
            None,
            Err(OperationError::from(CoreError::Offline {
                device: "nas".into(),
            })),
        );
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["error"]["kind"], "offline");
        assert!(json.get("payload").is_none());
        assert!(json.get("entity").is_none());
    }
}
