use std::collections::HashMap;
use std::fmt;

use serde::Serialize;

use super::device::DeviceInfo;

/// A numeric sensor value.
///
/// Serialized as a bare JSON number.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum SensorValue {
    Float(f64),
    Integer(i64),
}

impl fmt::Display for SensorValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Float(v) => write!(f, "{}", v),
            Self::Integer(v) => write!(f, "{}", v),
        }
    }
}

/// State of a sensor entity.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorState {
    pub name: String,
    pub unique_id: String,
    pub friendly_name: String,

    /// Display value; `None` until the first successful update.
    pub value: Option<SensorValue>,

    /// Value as read from the source, before display rounding.
    pub native_value: Option<SensorValue>,

    pub unit_of_measurement: String,
    pub icon: String,
    pub device_info: DeviceInfo,
}

/// Centralized snapshot of the entire engine state.
#[derive(Debug, Clone, Default, Serialize)]
pub struct State {
    pub sensors: HashMap<String, SensorState>,
}
