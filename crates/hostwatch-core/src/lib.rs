//! Polling and coordination core between `hostwatch-api` and its consumers.
//!
//! This crate keeps each configured device's liveness and sensor values
//! current, and fans operations out across devices:
//!
//! - **[`Device`]**: Per-device context. [`setup()`](Device::setup) runs the
//!   first refresh and initial sensor read, registers the built-in entities
//!   and starts the timers; [`shutdown()`](Device::shutdown) tears it all down.
//!
//! - **Coordinators** ([`coordinator`]): a [`PeriodicTask`] scheduling
//!   primitive with an explicit running flag, the heartbeat
//!   [`StateCoordinator`] (with fast-poll after power transitions), one
//!   [`SensorBatchCoordinator`] per sensor command, and the
//!   [`CoordinatorGroup`] that halts every sibling on an authentication
//!   failure.
//!
//! - **[`ChildReconciler`]**: Projects dynamic sensor children onto the
//!   host's [`EntityRegistry`] through the serialized [`RegistryBoundary`].
//!
//! - **[`Dispatcher`]**: Runs one [`Operation`] concurrently against every
//!   resolved [`Target`] and aggregates one record per device or entity.
//!
//! - **[`Hub`]**: Owns every device and resolves fan-out targets.

pub mod config;
pub mod convert;
pub mod coordinator;
pub mod device;
pub mod dispatch;
pub mod error;
pub mod hub;
pub mod model;
pub mod reconcile;
pub mod registry;
pub mod render;
pub mod session;
pub mod store;

// ── Primary re-exports ──────────────────────────────────────────────
pub use config::DeviceConfig;
pub use coordinator::{
    AuthFailure, CoordinatorGroup, PeriodicTask, SensorBatchCoordinator, StateCoordinator,
};
pub use device::{Device, SensorPoll};
pub use dispatch::{
    AggregatedResult, Dispatcher, Operation, Request, Target, TargetResolver, TargetResult,
    TargetSelection,
};
pub use error::{CoreError, ErrorKind, OperationError, classify};
pub use hub::Hub;
pub use reconcile::ChildReconciler;
pub use registry::{EntityRegistry, MemoryRegistry, RegistryBoundary};
pub use session::{RemoteSession, SessionState};
pub use store::{ChildEvent, SensorStore};

pub use model::{
    ActionCommand, Capability, CommandSpec, EntityDescriptor, EntitySource, Sensor, SensorCommand,
    SensorKind, SensorSpec, SensorValue, Variables,
};
