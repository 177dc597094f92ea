// ── Entity descriptors ──
//
// One flat descriptor per addressable object plus a capability tag that
// presentation adapters switch on.

use std::collections::BTreeMap;

use serde::Serialize;

use super::sensor::{SensorKind, SensorSpec};

/// What a presentation adapter may do with an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, strum::Display)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum Capability {
    Readable,
    WritableBool,
    WritableNumber,
    WritableEnum,
    WritableText,
    /// Triggers an action; has no value.
    Pressable,
}

impl Capability {
    /// Capability of a sensor, derived from its kind and write template.
    pub fn for_sensor(spec: &SensorSpec) -> Self {
        if spec.set_command.is_none() {
            return Self::Readable;
        }
        match &spec.kind {
            SensorKind::Binary { .. } => Self::WritableBool,
            SensorKind::Number { .. } => Self::WritableNumber,
            SensorKind::Text {
                options: Some(_), ..
            } => Self::WritableEnum,
            SensorKind::Text { options: None, .. } => Self::WritableText,
        }
    }

    pub fn is_writable(self) -> bool {
        matches!(
            self,
            Self::WritableBool | Self::WritableNumber | Self::WritableEnum | Self::WritableText
        )
    }
}

/// Where an entity's current value comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EntitySource {
    /// A sensor (static or dynamic child) in the device's sensor store.
    Sensor { key: String },
    /// The session's `reachable` flag.
    NetworkAvailability,
    /// The session's `authenticated` flag.
    SshAvailability,
    Action { key: String },
}

/// Registry entry for one addressable object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescriptor {
    /// Globally unique: `{device}.{key}`.
    pub id: String,
    /// Device-local key.
    pub key: String,
    pub device: String,
    pub name: String,
    pub capability: Capability,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
    /// Dynamic parent for child entities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    pub source: EntitySource,
}

impl EntityDescriptor {
    pub fn entity_id(device: &str, key: &str) -> String {
        format!("{device}.{key}")
    }

    pub fn new(
        device: &str,
        key: impl Into<String>,
        name: impl Into<String>,
        capability: Capability,
        source: EntitySource,
    ) -> Self {
        let key = key.into();
        Self {
            id: Self::entity_id(device, &key),
            key,
            device: device.to_owned(),
            name: name.into(),
            capability,
            unit: None,
            attributes: BTreeMap::new(),
            parent: None,
            source,
        }
    }
}
