// ── Dynamic child reconciliation ──
//
// Turns `ChildEvent`s from the sensor store into scheduled registry
// mutations. Existence checks happen on the registration boundary, so
// repeated or out-of-date events are harmless.

use std::sync::Arc;

use tracing::debug;

use crate::model::{EntityDescriptor, EntitySource};
use crate::registry::RegistryBoundary;
use crate::store::ChildEvent;

pub struct ChildReconciler {
    device: String,
    boundary: Arc<RegistryBoundary>,
}

impl ChildReconciler {
    pub fn new(device: impl Into<String>, boundary: Arc<RegistryBoundary>) -> Self {
        Self {
            device: device.into(),
            boundary,
        }
    }

    /// Schedule the registry change for one event.
    pub fn handle(&self, event: ChildEvent) {
        match event {
            ChildEvent::Added { sensor, capability } => {
                debug!(device = %self.device, child = %sensor.key, "child appeared");
                let mut descriptor = EntityDescriptor::new(
                    &self.device,
                    sensor.key.clone(),
                    sensor.name,
                    capability,
                    EntitySource::Sensor { key: sensor.key },
                );
                descriptor.unit = sensor.unit;
                descriptor.attributes = sensor.attributes;
                descriptor.parent = sensor.parent;
                self.boundary.schedule_register(descriptor);
            }
            ChildEvent::Removed { key, parent } => {
                debug!(device = %self.device, child = %key, %parent, "child disappeared");
                self.boundary
                    .schedule_remove(EntityDescriptor::entity_id(&self.device, &key));
            }
        }
    }

    /// Schedule every event in order.
    pub fn handle_all(&self, events: impl IntoIterator<Item = ChildEvent>) {
        for event in events {
            self.handle(event);
        }
    }
}
