pub mod api;
pub mod config;
mod engine;
pub mod integrations;

pub use config::Config;
pub use config::ConfigError;
pub use config::LogLevel;
pub use config::WindgrafConfig;
pub use engine::CommandError;
pub use engine::DeviceInfo;
pub use engine::Engine;
pub use engine::Entity;
pub use engine::SensorState;
pub use engine::SensorValue;
pub use engine::State;
