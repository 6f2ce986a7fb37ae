//! Entity abstraction
//!
//! Everything an integration exposes to the engine implements `Entity`.

use super::state::SensorState;

/// Base trait that all entities must implement
pub trait Entity: Send + Sync {
    /// Engine-wide identifier, e.g. `sensor.garden_max_speed`
    fn entity_id(&self) -> String;

    /// Return the platform type of this entity (e.g. "sensor")
    fn platform(&self) -> &'static str;

    /// Snapshot of the state the engine should publish
    fn snapshot(&self) -> SensorState;
}
