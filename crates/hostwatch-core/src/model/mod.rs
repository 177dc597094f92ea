// ── Domain model ──
//
// Declarative descriptors (commands, sensor specs) plus the runtime
// sensor and entity types the coordinators produce.

pub mod command;
pub mod entity;
pub mod sensor;

pub use command::{ActionCommand, CommandSpec, SensorCommand, Variables};
pub use entity::{Capability, EntityDescriptor, EntitySource};
pub use sensor::{Sensor, SensorKind, SensorSpec, SensorValue};
