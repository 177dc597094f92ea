// ── Coordinators ──
//
// `PeriodicTask` is the scheduling primitive. `StateCoordinator` and
// `SensorBatchCoordinator` each own one and share a `CoordinatorGroup`
// per device.

pub mod group;
pub mod sensor;
pub mod state;
pub mod task;

pub use group::{AuthFailure, CoordinatorGroup};
pub use sensor::SensorBatchCoordinator;
pub use state::{DonePredicate, StateCoordinator};
pub use task::{PeriodicTask, Tick, TickGuard};
