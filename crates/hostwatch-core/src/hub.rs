// ── Hub ──
//
// Explicit context owning every configured device and the registration
// boundary they share. Resolves fan-out targets.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::info;

use hostwatch_api::Transport;

use crate::config::DeviceConfig;
use crate::device::Device;
use crate::dispatch::{
    AggregatedResult, Dispatcher, Request, SelectedEntity, Target, TargetResolver,
    TargetSelection, split_entity_id,
};
use crate::error::CoreError;
use crate::registry::{EntityRegistry, RegistryBoundary};

pub struct Hub {
    devices: DashMap<String, Device>,
    boundary: Arc<RegistryBoundary>,
}

impl Hub {
    /// Create a hub whose entities land in `registry`.
    pub fn new(registry: Arc<dyn EntityRegistry>) -> Arc<Self> {
        Arc::new(Self {
            devices: DashMap::new(),
            boundary: Arc::new(RegistryBoundary::spawn(registry)),
        })
    }

    pub fn boundary(&self) -> &Arc<RegistryBoundary> {
        &self.boundary
    }

    /// Build and store a device context. Setup is left to the caller.
    pub fn add_device(
        &self,
        config: DeviceConfig,
        transport: Arc<dyn Transport>,
    ) -> Result<Device, CoreError> {
        if self.devices.contains_key(&config.id) {
            return Err(CoreError::Config {
                message: format!("device '{}' is already configured", config.id),
            });
        }
        let device = Device::new(config, transport, Arc::clone(&self.boundary));
        self.devices
            .insert(device.id().to_owned(), device.clone());
        Ok(device)
    }

    pub fn get(&self, id: &str) -> Option<Device> {
        self.devices.get(id).map(|d| d.value().clone())
    }

    /// All devices sorted by id.
    pub fn devices(&self) -> Vec<Device> {
        let mut devices: Vec<Device> = self.devices.iter().map(|d| d.value().clone()).collect();
        devices.sort_by(|a, b| a.id().cmp(b.id()));
        devices
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    /// Set up every device concurrently. Returns the per-device outcome.
    pub async fn setup_all(&self, start_timers: bool) -> Vec<(String, Result<(), CoreError>)> {
        let devices = self.devices();
        let futs = devices.iter().map(|device| async move {
            (device.id().to_owned(), device.setup(start_timers).await)
        });
        futures_util::future::join_all(futs).await
    }

    /// [`Device::setup_for_dispatch`] on every device concurrently.
    pub async fn setup_all_for_dispatch(&self) -> Vec<(String, Result<(), CoreError>)> {
        let devices = self.devices();
        let futs = devices.iter().map(|device| async move {
            (device.id().to_owned(), device.setup_for_dispatch().await)
        });
        futures_util::future::join_all(futs).await
    }

    /// Shut down and forget one device.
    pub async fn remove(&self, id: &str) -> Option<Device> {
        let (_, device) = self.devices.remove(id)?;
        device.shutdown().await;
        Some(device)
    }

    /// Shut down every device, then wait for pending registry changes.
    pub async fn shutdown_all(&self) {
        let devices = self.devices();
        let futs = devices.iter().map(Device::shutdown);
        futures_util::future::join_all(futs).await;
        self.devices.clear();
        self.boundary.flush().await;
        info!("all devices shut down");
    }

    /// Dispatch a request across this hub's devices.
    pub async fn dispatch(self: &Arc<Self>, request: &Request) -> Result<AggregatedResult, CoreError> {
        Dispatcher::new(Arc::clone(self) as Arc<dyn TargetResolver>)
            .dispatch(request)
            .await
    }
}

impl TargetResolver for Hub {
    fn resolve(&self, selection: &TargetSelection) -> Vec<Target> {
        match selection {
            TargetSelection::All => self
                .devices()
                .into_iter()
                .map(|device| Target {
                    device_id: device.id().to_owned(),
                    device: Some(device),
                    entities: None,
                })
                .collect(),
            TargetSelection::Devices(ids) => {
                let mut seen = Vec::with_capacity(ids.len());
                ids.iter()
                    .filter(|id| {
                        let first = !seen.contains(id);
                        seen.push(*id);
                        first
                    })
                    .map(|id| Target {
                        device_id: id.clone(),
                        device: self.get(id),
                        entities: None,
                    })
                    .collect()
            }
            TargetSelection::Entities(ids) => {
                // Group by device, keeping first-appearance order of devices.
                let mut grouped: BTreeMap<usize, (String, Vec<SelectedEntity>)> = BTreeMap::new();
                let mut order: Vec<String> = Vec::new();
                for (position, id) in ids.iter().enumerate() {
                    let Some((device, key)) = split_entity_id(id) else {
                        continue;
                    };
                    let slot = match order.iter().position(|d| d == device) {
                        Some(slot) => slot,
                        None => {
                            order.push(device.to_owned());
                            order.len() - 1
                        }
                    };
                    grouped
                        .entry(slot)
                        .or_insert_with(|| (device.to_owned(), Vec::new()))
                        .1
                        .push(SelectedEntity {
                            position,
                            key: key.to_owned(),
                        });
                }
                grouped
                    .into_values()
                    .map(|(device_id, entities)| Target {
                        device: self.get(&device_id),
                        device_id,
                        entities: Some(entities),
                    })
                    .collect()
            }
        }
    }
}
