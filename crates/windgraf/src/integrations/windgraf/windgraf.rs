use std::collections::HashMap;
use std::error::Error;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::fetch::PageFetcher;
use super::sensor::sensors_for;
use super::sensor::UpdateOutcome;
use super::sensor::WindSensor;
use super::DOMAIN;
use crate::config::WindgrafConfig;
use crate::engine::Entity;
use crate::engine::FromIntegrationMessage;
use crate::engine::FromIntegrationSender;
use crate::engine::Integration;
use crate::engine::ToIntegrationMessage;

/// Type alias for the sensors of one station, shared with its poll task
type SensorList = Arc<Mutex<Vec<WindSensor>>>;

/// One configured station and its sensors
struct Station {
    name: String,
    scan_interval: Duration,
    sensors: SensorList,
}

/// Windgraf integration
///
/// Exposes the wind speeds and direction of each configured station page as
/// sensors. Each station is polled by its own task; every sensor fetches the
/// page on its own and throttles itself.
pub struct WindgrafIntegration<F: PageFetcher> {
    fetcher: Arc<F>,
    stations: Vec<Station>,
    /// Entity id to index into `stations`
    owners: HashMap<String, usize>,
    to_engine: Option<FromIntegrationSender>,
    /// Handles to the background poll tasks, one per station
    poll_tasks: Vec<JoinHandle<()>>,
}

impl<F: PageFetcher + 'static> WindgrafIntegration<F> {
    /// Create a new windgraf integration
    pub fn new(fetcher: F, configs: &[WindgrafConfig]) -> Self {
        let mut owners = HashMap::new();
        let mut stations = Vec::with_capacity(configs.len());

        for (index, config) in configs.iter().enumerate() {
            let sensors = sensors_for(config);
            for sensor in &sensors {
                owners.insert(sensor.entity_id(), index);
            }
            stations.push(Station {
                name: config.name.clone(),
                scan_interval: config.scan_interval(),
                sensors: Arc::new(Mutex::new(sensors)),
            });
        }

        Self {
            fetcher: Arc::new(fetcher),
            stations,
            owners,
            to_engine: None,
            poll_tasks: Vec::new(),
        }
    }

    /// Update every sensor of a station on each tick of its scan interval
    async fn poll_station_task(
        station: String,
        sensors: SensorList,
        scan_interval: Duration,
        fetcher: Arc<F>,
        to_engine: FromIntegrationSender,
    ) {
        let mut ticker = tokio::time::interval(scan_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            debug!("Polling station {}", station);

            let mut guard = sensors.lock().await;
            for sensor in guard.iter_mut() {
                if !Self::update_sensor(sensor, fetcher.as_ref(), &to_engine).await {
                    info!("Engine is gone, stopping poll of station {}", station);
                    return;
                }
            }
        }
    }

    /// Update one sensor and report its state
    ///
    /// Returns false once the engine no longer accepts messages.
    async fn update_sensor(
        sensor: &mut WindSensor,
        fetcher: &F,
        to_engine: &FromIntegrationSender,
    ) -> bool {
        match sensor.update(fetcher).await {
            Ok(UpdateOutcome::Throttled) => return true,
            Ok(_) => {}
            Err(e) => warn!("Update of {} failed: {}", sensor.entity_id(), e),
        }

        Self::report_state(sensor, to_engine).await
    }

    /// Report a sensor's current state to the engine
    async fn report_state(sensor: &WindSensor, to_engine: &FromIntegrationSender) -> bool {
        let msg = FromIntegrationMessage::SensorStateChanged {
            entity_id: sensor.entity_id(),
            state: sensor.snapshot(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send SensorStateChanged message: {}", e);
            return false;
        }
        true
    }

    /// Register an entity with the engine
    async fn register_entity(entity: &dyn Entity, to_engine: &FromIntegrationSender) {
        let entity_id = entity.entity_id();
        let msg = FromIntegrationMessage::EntityDiscovered {
            entity_id: entity_id.clone(),
            integration_name: DOMAIN.to_string(),
        };
        if let Err(e) = to_engine.send(msg).await {
            warn!("Failed to send EntityDiscovered message: {}", e);
        } else {
            info!("Registered {} entity: {}", entity.platform(), entity_id);
        }
    }

    /// Sensors of the station owning `entity_id`
    fn find_sensors(&self, entity_id: &str) -> Option<SensorList> {
        self.owners
            .get(entity_id)
            .map(|&index| self.stations[index].sensors.clone())
    }

    /// Update one sensor now, subject to its throttle
    pub async fn refresh_sensor(&self, entity_id: &str) -> Result<(), Box<dyn Error + Send>> {
        let not_found = || -> Box<dyn Error + Send> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("Sensor not found: {}", entity_id),
            ))
        };

        let to_engine = self.to_engine.as_ref().ok_or_else(|| -> Box<dyn Error + Send> {
            Box::new(std::io::Error::new(
                std::io::ErrorKind::NotConnected,
                "windgraf integration is not set up",
            ))
        })?;

        let sensors = self.find_sensors(entity_id).ok_or_else(not_found)?;
        let mut sensors = sensors.lock().await;
        let sensor = sensors
            .iter_mut()
            .find(|s| s.entity_id() == entity_id)
            .ok_or_else(not_found)?;

        info!("Refreshing {}", entity_id);
        Self::update_sensor(sensor, self.fetcher.as_ref(), to_engine).await;
        Ok(())
    }
}

#[async_trait]
impl<F: PageFetcher + 'static> Integration for WindgrafIntegration<F> {
    fn name(&self) -> &str {
        DOMAIN
    }

    async fn setup(&mut self, tx: FromIntegrationSender) -> Result<(), Box<dyn Error + Send>> {
        self.to_engine = Some(tx.clone());

        for station in &self.stations {
            info!(
                "Setting up windgraf station {} (every {:?})",
                station.name, station.scan_interval
            );

            {
                let sensors = station.sensors.lock().await;
                for sensor in sensors.iter() {
                    Self::register_entity(sensor, &tx).await;
                }
            }

            let task = tokio::spawn(Self::poll_station_task(
                station.name.clone(),
                station.sensors.clone(),
                station.scan_interval,
                self.fetcher.clone(),
                tx.clone(),
            ));
            self.poll_tasks.push(task);
        }

        info!("windgraf integration ready");
        Ok(())
    }

    async fn handle_message(
        &mut self,
        msg: ToIntegrationMessage,
    ) -> Result<(), Box<dyn Error + Send>> {
        match msg {
            ToIntegrationMessage::RefreshSensor { entity_id } => {
                self.refresh_sensor(&entity_id).await
            }
        }
    }

    async fn shutdown(&mut self) -> Result<(), Box<dyn Error + Send>> {
        info!("windgraf integration shutting down");

        for task in self.poll_tasks.drain(..) {
            task.abort();
        }

        if let Some(tx) = self.to_engine.take() {
            for station in &self.stations {
                let sensors = station.sensors.lock().await;
                for sensor in sensors.iter() {
                    let msg = FromIntegrationMessage::EntityRemoved {
                        entity_id: sensor.entity_id(),
                    };
                    if tx.send(msg).await.is_err() {
                        debug!("Engine closed before {} was removed", sensor.entity_id());
                    }
                }
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::mpsc;

    use super::*;
    use crate::engine::SensorValue;
    use crate::integrations::windgraf::fetch::MockFetcher;

    const PAGE: &str = include_str!("../../../tests/fixtures/windgraf.html");

    fn garden() -> Vec<WindgrafConfig> {
        vec![WindgrafConfig::new("Garden", "http://station.local/page")]
    }

    /// Drain messages until `n` state changes have been seen
    async fn state_changes(
        rx: &mut mpsc::Receiver<FromIntegrationMessage>,
        n: usize,
    ) -> Vec<(String, Option<SensorValue>)> {
        let mut changes = Vec::new();
        while changes.len() < n {
            match rx.recv().await.unwrap() {
                FromIntegrationMessage::SensorStateChanged { entity_id, state } => {
                    changes.push((entity_id, state.value))
                }
                _ => continue,
            }
        }
        changes
    }

    #[tokio::test]
    async fn test_setup_registers_four_entities() {
        let mut integration = WindgrafIntegration::new(MockFetcher::ok(PAGE), &garden());
        let (tx, mut rx) = mpsc::channel(64);

        integration.setup(tx).await.unwrap();

        let mut discovered = Vec::new();
        while discovered.len() < 4 {
            if let FromIntegrationMessage::EntityDiscovered {
                entity_id,
                integration_name,
            } = rx.recv().await.unwrap()
            {
                assert_eq!(integration_name, "windgraf");
                discovered.push(entity_id);
            }
        }
        assert_eq!(
            discovered,
            vec![
                "sensor.garden_max_speed",
                "sensor.garden_average_speed",
                "sensor.garden_min_speed",
                "sensor.garden_wind_rotation",
            ]
        );

        integration.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_first_poll_reports_values() {
        let fetcher = MockFetcher::ok(PAGE);
        let mut integration = WindgrafIntegration::new(fetcher, &garden());
        let (tx, mut rx) = mpsc::channel(64);

        integration.setup(tx).await.unwrap();
        let changes = state_changes(&mut rx, 4).await;

        assert_eq!(
            changes,
            vec![
                ("sensor.garden_max_speed".to_string(), Some(SensorValue::Float(5.6))),
                ("sensor.garden_average_speed".to_string(), Some(SensorValue::Float(3.1))),
                ("sensor.garden_min_speed".to_string(), Some(SensorValue::Float(1.2))),
                ("sensor.garden_wind_rotation".to_string(), Some(SensorValue::Integer(123))),
            ]
        );
        assert_eq!(integration.fetcher.requests(), 4);

        integration.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_within_a_minute_is_throttled() {
        let mut integration = WindgrafIntegration::new(MockFetcher::ok(PAGE), &garden());
        let (tx, mut rx) = mpsc::channel(64);

        integration.setup(tx).await.unwrap();
        state_changes(&mut rx, 4).await;

        integration
            .handle_message(ToIntegrationMessage::RefreshSensor {
                entity_id: "sensor.garden_min_speed".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(integration.fetcher.requests(), 4);

        integration.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_does_not_wait_for_other_stations() {
        let configs = vec![
            WindgrafConfig::new("Garden", "http://garden.local/page"),
            WindgrafConfig::new("Pier", "http://pier.local/page"),
        ];
        let mut integration = WindgrafIntegration::new(MockFetcher::ok(PAGE), &configs);
        let (tx, mut rx) = mpsc::channel(64);
        integration.to_engine = Some(tx);

        // Garden is mid-poll
        let _garden = integration.stations[0].sensors.lock().await;

        let refresh = integration.refresh_sensor("sensor.pier_max_speed");
        tokio::time::timeout(Duration::from_secs(5), refresh)
            .await
            .expect("refresh blocked on another station")
            .unwrap();

        let changes = state_changes(&mut rx, 1).await;
        assert_eq!(
            changes,
            vec![("sensor.pier_max_speed".to_string(), Some(SensorValue::Float(5.6)))]
        );
    }

    #[tokio::test]
    async fn test_refresh_unknown_sensor() {
        let mut integration = WindgrafIntegration::new(MockFetcher::ok(PAGE), &garden());
        let (tx, _rx) = mpsc::channel(64);
        integration.setup(tx).await.unwrap();

        let result = integration.refresh_sensor("sensor.nowhere").await;
        assert!(result.is_err());

        integration.shutdown().await.unwrap();
    }
}
