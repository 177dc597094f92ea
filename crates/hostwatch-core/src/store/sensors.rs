// ── Sensor value store ──
//
// Holds the runtime state of every declared sensor and every live
// dynamic child for one device. Structural changes (children appearing
// or disappearing) are returned as `ChildEvent`s for the reconciler.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use tokio::sync::watch;

use super::collection::KeyedCollection;
use crate::convert::{Reading, child_key};
use crate::error::CoreError;
use crate::model::{Capability, Sensor, SensorCommand, SensorSpec, SensorValue};

/// Structural change to a dynamic sensor's children.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildEvent {
    Added { sensor: Sensor, capability: Capability },
    Removed { parent: String, key: String },
}

impl ChildEvent {
    pub fn key(&self) -> &str {
        match self {
            Self::Added { sensor, .. } => &sensor.key,
            Self::Removed { key, .. } => key,
        }
    }
}

/// Where a write to a sensor goes.
#[derive(Debug, Clone)]
pub struct WriteTarget {
    pub spec: Arc<SensorSpec>,
    /// Raw child id when writing to a dynamic child.
    pub child_id: Option<String>,
}

pub struct SensorStore {
    sensors: KeyedCollection<Sensor>,
    /// Declared sensors by key.
    specs: HashMap<String, Arc<SensorSpec>>,
    /// Declared sensor key -> index of the owning sensor command.
    owners: HashMap<String, usize>,
    /// Declared keys in configuration order.
    declared: Vec<String>,
}

impl SensorStore {
    pub fn new(commands: &[SensorCommand]) -> Self {
        let sensors = KeyedCollection::new();
        let mut specs = HashMap::new();
        let mut owners = HashMap::new();
        let mut declared = Vec::new();

        for (index, command) in commands.iter().enumerate() {
            for spec in &command.sensors {
                sensors.upsert(spec.key.clone(), Sensor::from_spec(spec));
                specs.insert(spec.key.clone(), Arc::new(spec.clone()));
                owners.insert(spec.key.clone(), index);
                declared.push(spec.key.clone());
            }
        }

        Self {
            sensors,
            specs,
            owners,
            declared,
        }
    }

    // ── Reads ────────────────────────────────────────────────────────

    pub fn get(&self, key: &str) -> Option<Sensor> {
        self.sensors.get(key).map(|s| Sensor::clone(&s))
    }

    pub fn value(&self, key: &str) -> Option<SensorValue> {
        self.sensors.get(key).and_then(|s| s.value.clone())
    }

    pub fn contains(&self, key: &str) -> bool {
        self.sensors.contains(key)
    }

    /// Every sensor, parents and children, sorted by key.
    pub fn snapshot(&self) -> Vec<Sensor> {
        self.sensors
            .snapshot()
            .iter()
            .map(|s| Sensor::clone(s))
            .collect()
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<Sensor>>>> {
        self.sensors.subscribe()
    }

    /// Declared sensor specs in configuration order.
    pub fn declared(&self) -> impl Iterator<Item = &Arc<SensorSpec>> {
        self.declared.iter().filter_map(|key| self.specs.get(key))
    }

    /// Every pollable key: declared static sensors and live children.
    pub fn pollable_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        for key in &self.declared {
            match self.sensors.get(key) {
                Some(sensor) if sensor.is_dynamic => {
                    keys.extend(sensor.children.iter().flatten().cloned());
                }
                Some(_) => keys.push(key.clone()),
                None => {}
            }
        }
        keys
    }

    /// Index of the sensor command that produces `key`.
    pub fn owner(&self, key: &str) -> Option<usize> {
        self.owners.get(self.declared_key(key)?).copied()
    }

    /// Index of the command that would report `key` as a child of a
    /// dynamic sensor, for children not read yet.
    pub fn pending_owner(&self, key: &str) -> Option<usize> {
        self.specs
            .values()
            .filter(|spec| spec.dynamic)
            .filter(|spec| {
                key.strip_prefix(spec.key.as_str())
                    .and_then(|rest| rest.strip_prefix('_'))
                    .is_some_and(|slug| !slug.is_empty())
            })
            .max_by_key(|spec| spec.key.len())
            .and_then(|spec| self.owners.get(&spec.key).copied())
    }

    /// Spec governing `key` (the parent's spec for a child).
    pub fn spec(&self, key: &str) -> Option<Arc<SensorSpec>> {
        self.specs.get(self.declared_key(key)?).cloned()
    }

    pub fn write_target(&self, key: &str) -> Result<WriteTarget, CoreError> {
        let sensor = self.sensors.get(key).ok_or_else(|| CoreError::SensorNotFound {
            key: key.to_owned(),
        })?;
        let spec = self.spec(key).ok_or_else(|| CoreError::SensorNotFound {
            key: key.to_owned(),
        })?;
        if sensor.is_dynamic {
            return Err(CoreError::validation(format!(
                "'{key}' is a dynamic sensor; write to one of its children"
            )));
        }
        let child_id = sensor
            .parent
            .as_ref()
            .and_then(|_| sensor.attributes.get("id").cloned());
        Ok(WriteTarget { spec, child_id })
    }

    fn declared_key<'a>(&'a self, key: &'a str) -> Option<&'a str> {
        if self.specs.contains_key(key) {
            return Some(key);
        }
        let parent = self.sensors.get(key)?.parent.clone()?;
        self.specs.get_key_value(&parent).map(|(k, _)| k.as_str())
    }

    // ── Writes ───────────────────────────────────────────────────────

    pub fn set_value(&self, key: &str, value: SensorValue) -> bool {
        self.sensors.update(key, |sensor| sensor.set_value(Some(value)))
    }

    /// Apply one successful batch: `readings[i]` belongs to `sensors[i]`.
    pub fn apply(&self, sensors: &[SensorSpec], readings: Vec<Reading>) -> Vec<ChildEvent> {
        let mut events = Vec::new();

        for (spec, reading) in sensors.iter().zip(readings) {
            match reading {
                Reading::Static(value) => {
                    self.sensors.update(&spec.key, |sensor| sensor.set_value(value));
                }
                Reading::Dynamic(children) => {
                    self.apply_children(spec, children, &mut events);
                }
            }
        }
        events
    }

    fn apply_children(
        &self,
        spec: &SensorSpec,
        children: Vec<(String, Option<SensorValue>)>,
        events: &mut Vec<ChildEvent>,
    ) {
        let previous: Vec<String> = self
            .sensors
            .get(&spec.key)
            .and_then(|parent| parent.children.clone())
            .unwrap_or_default();

        let capability = Capability::for_sensor(spec);
        let mut current = Vec::with_capacity(children.len());
        let mut seen = HashSet::new();

        for (raw_id, value) in children {
            let key = child_key(&spec.key, &raw_id);
            if !seen.insert(key.clone()) {
                continue;
            }
            let updated = self
                .sensors
                .update(&key, |sensor| sensor.set_value(value.clone()));
            if !updated {
                let mut sensor = Sensor::child_of(spec, key.clone(), &raw_id);
                sensor.set_value(value);
                self.sensors.upsert(key.clone(), sensor.clone());
                events.push(ChildEvent::Added { sensor, capability });
            }
            current.push(key);
        }

        for key in previous.into_iter().filter(|k| !seen.contains(k)) {
            self.sensors.remove(&key);
            events.push(ChildEvent::Removed {
                parent: spec.key.clone(),
                key,
            });
        }

        self.sensors.update(&spec.key, |parent| {
            parent.children = Some(current);
        });
    }
}
