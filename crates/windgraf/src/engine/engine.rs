use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::RwLock;

use tokio::sync::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::integration::FromIntegrationReceiver;
use super::integration::FromIntegrationSender;
use super::integration::Integration;
use super::integration::ToIntegrationSender;
use super::message::FromIntegrationMessage;
use super::message::ToIntegrationMessage;
use super::state::State;
use crate::engine::IntegrationContext;

/// Why a command could not be delivered to an integration
#[derive(Debug, thiserror::Error)]
pub enum CommandError {
    #[error("No integration found for entity: {0}")]
    UnknownEntity(String),

    #[error("Integration channel not found: {0}")]
    IntegrationUnavailable(String),
}

/// windgraf engine
///
/// This structure handles the flow of events from integrations, routes commands to the
/// integration owning an entity, and maintains a view of the world with State.
pub struct Engine {
    /// Centralized state snapshot (readers clone the Arc, the writer swaps in a new one)
    state: RwLock<Arc<State>>,

    /// Map of entity_id -> integration name for routing messages
    entity_integration_map: StdMutex<HashMap<String, String>>,

    /// Communication channels to integrations (for commands)
    integration_channels: StdMutex<HashMap<String, ToIntegrationSender>>,

    /// Receive messages from integrations (events)
    message_rx: Mutex<FromIntegrationReceiver>,

    /// Sender for integrations to report events back to the engine
    message_tx: FromIntegrationSender,

    /// Handles for integration tasks
    integration_handles: StdMutex<Vec<JoinHandle<()>>>,
}

/// Capacity for the integration→engine message channel
/// Provides backpressure when integrations send faster than the engine can process
const FROM_INTEGRATION_CHANNEL_SIZE: usize = 1024;

impl Engine {
    /// Create a new Engine instance
    pub fn new() -> Self {
        let (message_tx, message_rx) = mpsc::channel(FROM_INTEGRATION_CHANNEL_SIZE);
        Self {
            state: RwLock::new(Arc::default()),
            entity_integration_map: StdMutex::new(HashMap::new()),
            integration_channels: StdMutex::new(HashMap::new()),
            message_rx: Mutex::new(message_rx),
            message_tx,
            integration_handles: StdMutex::new(Vec::new()),
        }
    }

    /// Register integrations from configuration
    ///
    /// Every factory in the registry is offered the configuration; factories
    /// return `None` when their integration is not configured.
    pub fn register_integrations_from_config(&self, cfg: &crate::config::Config) {
        let ctx = IntegrationContext { config: cfg };
        for constr in super::integration::REGISTRY {
            let integration = match constr(&ctx) {
                Ok(Some(i)) => i,
                Err(e) => {
                    error!("failed to setup integration: {:#}", e);
                    continue;
                }
                Ok(None) => continue,
            };
            let name = integration.name().to_string();
            self.register_integration(name, integration);
        }
    }

    /// Register an integration with the engine
    ///
    /// This spawns the integration in a background task, wires up channels,
    /// and starts its setup process.
    pub fn register_integration(&self, name: String, mut integration: Box<dyn Integration>) {
        let (to_integration_tx, mut to_integration_rx) = mpsc::unbounded_channel();
        let from_integration_tx = self.message_tx.clone();

        lock(&self.integration_channels).insert(name.clone(), to_integration_tx);

        // Spawn integration task
        let handle = tokio::spawn(async move {
            // Setup integration (gives it the sender for events)
            if let Err(e) = integration.setup(from_integration_tx).await {
                warn!("Integration '{}' setup failed: {}", name, e);
                return;
            }

            // Process commands from engine until the engine drops the sender
            while let Some(msg) = to_integration_rx.recv().await {
                if let Err(e) = integration.handle_message(msg).await {
                    warn!("Integration '{}' failed to handle message: {}", name, e);
                }
            }

            if let Err(e) = integration.shutdown().await {
                warn!("Integration '{}' shutdown failed: {}", name, e);
            }
        });

        lock(&self.integration_handles).push(handle);
    }

    /// Send a command to an integration
    ///
    /// Routes the command to the appropriate integration based on entity_id.
    pub fn send_command(&self, msg: ToIntegrationMessage) -> Result<(), CommandError> {
        let entity_id = msg.entity_id().to_string();

        let integration_name = lock(&self.entity_integration_map)
            .get(&entity_id)
            .cloned()
            .ok_or_else(|| CommandError::UnknownEntity(entity_id.clone()))?;

        let channels = lock(&self.integration_channels);
        let tx = channels
            .get(&integration_name)
            .ok_or_else(|| CommandError::IntegrationUnavailable(integration_name.clone()))?;

        tx.send(msg)
            .map_err(|_| CommandError::IntegrationUnavailable(integration_name.clone()))
    }

    /// Ask the sensor behind `entity_id` to update now
    pub fn refresh_sensor(&self, entity_id: String) -> Result<(), CommandError> {
        self.send_command(ToIntegrationMessage::RefreshSensor { entity_id })
    }

    /// Run the engine's main event loop
    ///
    /// Processes incoming events from integrations and updates state.
    pub async fn run(&self) -> Result<(), Box<dyn Error + Send>> {
        info!("Engine starting");

        let mut rx = self.message_rx.lock().await;
        while let Some(msg) = rx.recv().await {
            self.handle_event(msg);
        }

        info!("Engine shutting down");
        Ok(())
    }

    /// Stop all integrations and wait for their tasks to finish
    ///
    /// Dropping the command channels ends each integration's command loop,
    /// which then runs the integration's `shutdown`.
    pub async fn shutdown(&self) {
        lock(&self.integration_channels).clear();

        let handles: Vec<JoinHandle<()>> = lock(&self.integration_handles).drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Integration task ended abnormally: {}", e);
            }
        }
    }

    /// Get a snapshot of the current engine state.
    ///
    /// Clones the `Arc`, essentially free.
    pub fn state_snapshot(&self) -> Arc<State> {
        match self.state.read() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Copy the current state, apply `f`, and publish the result as the new snapshot
    fn update_state(&self, f: impl FnOnce(&mut State)) {
        let mut guard = match self.state.write() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut state = State::clone(&guard);
        f(&mut state);
        *guard = Arc::new(state);
    }

    /// Handle an event from an integration
    pub(crate) fn handle_event(&self, msg: FromIntegrationMessage) {
        match msg {
            FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
            } => {
                info!(
                    "Entity discovered: {} (from {})",
                    entity_id, integration_name
                );

                // Record which integration owns this entity for command routing.
                // State is not populated until the first state-change message arrives.
                lock(&self.entity_integration_map).insert(entity_id, integration_name);
            }
            FromIntegrationMessage::EntityRemoved { entity_id } => {
                info!("Entity removed: {}", entity_id);

                self.update_state(|state| {
                    state.sensors.remove(&entity_id);
                });
                lock(&self.entity_integration_map).remove(&entity_id);
            }
            FromIntegrationMessage::SensorStateChanged { entity_id, state } => {
                match &state.value {
                    Some(value) => debug!(
                        "Sensor state changed: {} -> {} {}",
                        entity_id, value, state.unit_of_measurement
                    ),
                    None => debug!("Sensor state changed: {} -> unset", entity_id),
                }

                self.update_state(|s| {
                    s.sensors.insert(entity_id, state);
                });
            }
        }
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock a std mutex, recovering the data if a previous holder panicked
fn lock<T>(mutex: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;

    use super::*;
    use crate::engine::DeviceInfo;
    use crate::engine::SensorState;
    use crate::engine::SensorValue;

    fn sensor_state(value: Option<SensorValue>) -> SensorState {
        SensorState {
            name: "Garden Min Speed".to_string(),
            unique_id: "garden_min_speed".to_string(),
            friendly_name: "Garden Min Speed Min Speed".to_string(),
            value,
            native_value: value,
            unit_of_measurement: "m/s".to_string(),
            icon: "mdi:weather-windy".to_string(),
            device_info: DeviceInfo::new("windgraf", "garden_min_speed", "Garden Min Speed"),
        }
    }

    #[test]
    fn test_state_change_updates_snapshot() {
        let engine = Engine::new();
        let before = engine.state_snapshot();

        engine.handle_event(FromIntegrationMessage::SensorStateChanged {
            entity_id: "sensor.garden_min_speed".to_string(),
            state: sensor_state(Some(SensorValue::Float(1.5))),
        });

        let after = engine.state_snapshot();
        assert!(before.sensors.is_empty());
        assert_eq!(
            after.sensors["sensor.garden_min_speed"].value,
            Some(SensorValue::Float(1.5))
        );
    }

    #[test]
    fn test_entity_removed_clears_state_and_routing() {
        let engine = Engine::new();
        engine.handle_event(FromIntegrationMessage::EntityDiscovered {
            entity_id: "sensor.garden_min_speed".to_string(),
            integration_name: "windgraf".to_string(),
        });
        engine.handle_event(FromIntegrationMessage::SensorStateChanged {
            entity_id: "sensor.garden_min_speed".to_string(),
            state: sensor_state(None),
        });
        engine.handle_event(FromIntegrationMessage::EntityRemoved {
            entity_id: "sensor.garden_min_speed".to_string(),
        });

        assert!(engine.state_snapshot().sensors.is_empty());
        assert!(matches!(
            engine.refresh_sensor("sensor.garden_min_speed".to_string()),
            Err(CommandError::UnknownEntity(_))
        ));
    }

    #[test]
    fn test_command_for_unknown_entity() {
        let engine = Engine::new();
        let err = engine
            .refresh_sensor("sensor.nowhere".to_string())
            .unwrap_err();
        assert_eq!(err.to_string(), "No integration found for entity: sensor.nowhere");
    }

    /// Integration that discovers one entity and forwards every command it receives
    struct EchoIntegration {
        commands: mpsc::UnboundedSender<ToIntegrationMessage>,
    }

    #[async_trait]
    impl Integration for EchoIntegration {
        fn name(&self) -> &str {
            "echo"
        }

        async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
            tx.send(FromIntegrationMessage::EntityDiscovered {
                entity_id: "sensor.echo".to_string(),
                integration_name: "echo".to_string(),
            })
            .await
            .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
        }

        async fn handle_message(
            &mut self,
            msg: ToIntegrationMessage,
        ) -> Result<(), Box<dyn Error + Send>> {
            self.commands
                .send(msg)
                .map_err(|e| -> Box<dyn Error + Send> { Box::new(e) })
        }

        async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_refresh_is_routed_to_owning_integration() {
        let (commands_tx, mut commands_rx) = mpsc::unbounded_channel();
        let engine = Arc::new(Engine::new());
        engine.register_integration(
            "echo".to_string(),
            Box::new(EchoIntegration {
                commands: commands_tx,
            }),
        );

        let runner = engine.clone();
        let run_task = tokio::spawn(async move { runner.run().await });

        // Wait for the discovery message to be processed
        let mut routed = false;
        for _ in 0..100 {
            if engine.refresh_sensor("sensor.echo".to_string()).is_ok() {
                routed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(routed);

        let msg = commands_rx.recv().await.unwrap();
        assert_eq!(msg.entity_id(), "sensor.echo");

        engine.shutdown().await;
        run_task.abort();
    }
}
