// ── Reactive stores ──

pub(crate) mod collection;
pub mod sensors;

pub use sensors::{ChildEvent, SensorStore};
