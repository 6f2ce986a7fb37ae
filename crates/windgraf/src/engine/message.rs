//! Type-safe message system
//!
//! Messages are split by direction to enforce correct usage at compile time:
//! - `FromIntegrationMessage`: Events from integrations to the engine
//! - `ToIntegrationMessage`: Commands from the engine to integrations

use super::state::SensorState;

/// Messages FROM integrations TO the engine (events/state updates)
#[derive(Debug, Clone)]
pub enum FromIntegrationMessage {
    /// An entity was discovered and registered
    EntityDiscovered {
        entity_id: String,
        integration_name: String,
    },

    /// An entity was removed (integration torn down, etc.)
    EntityRemoved { entity_id: String },

    /// A sensor published a new state
    SensorStateChanged {
        entity_id: String,
        state: SensorState,
    },
}

/// Messages FROM the engine TO integrations (commands)
#[derive(Debug, Clone)]
pub enum ToIntegrationMessage {
    /// Ask a sensor to update now. The sensor's own throttle still applies.
    RefreshSensor { entity_id: String },
}

impl ToIntegrationMessage {
    /// Entity the command is addressed to
    pub fn entity_id(&self) -> &str {
        match self {
            ToIntegrationMessage::RefreshSensor { entity_id } => entity_id,
        }
    }
}
