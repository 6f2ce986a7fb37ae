use strum::EnumIter;
use strum::IntoEnumIterator;
use strum::IntoStaticStr;
use tokio::time::Instant;
use tracing::debug;
use tracing::error;

use super::extract;
use super::fetch::PageFetcher;
use super::throttle::Throttle;
use super::DOMAIN;
use crate::config::object_id;
use crate::config::WindgrafConfig;
use crate::engine::DeviceInfo;
use crate::engine::Entity;
use crate::engine::SensorState;
use crate::engine::SensorValue;

pub const ICON_CALM: &str = "mdi:weather-windy";
pub const ICON_WINDY: &str = "mdi:weather-windy-variant";
pub const ICON_COMPASS: &str = "mdi:compass";
pub const ICON_UNAVAILABLE: &str = "mdi:alert-circle-outline";

const UNIT_SPEED: &str = "m/s";
const UNIT_DEGREES: &str = "°";

/// Which value of the windgraf page a sensor reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum SensorKind {
    MaxSpeed,
    AvgSpeed,
    MinSpeed,
    WindRotation,
}

impl SensorKind {
    /// Position of the value among the page's `text` nodes
    pub fn node_index(self) -> usize {
        match self {
            SensorKind::MaxSpeed => extract::MAX_SPEED_NODE,
            SensorKind::AvgSpeed => extract::AVG_SPEED_NODE,
            SensorKind::MinSpeed => extract::MIN_SPEED_NODE,
            SensorKind::WindRotation => extract::DIRECTION_NODE,
        }
    }

    /// Suffix of the display name, e.g. "Garden Average Speed"
    pub fn display_suffix(self) -> &'static str {
        match self {
            SensorKind::MaxSpeed => "Max Speed",
            SensorKind::AvgSpeed => "Average Speed",
            SensorKind::MinSpeed => "Min Speed",
            SensorKind::WindRotation => "Wind Rotation",
        }
    }

    /// Suffix of the unique id, e.g. "garden_average_speed"
    pub fn id_suffix(self) -> &'static str {
        match self {
            SensorKind::AvgSpeed => "average_speed",
            other => other.into(),
        }
    }

    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::WindRotation => UNIT_DEGREES,
            _ => UNIT_SPEED,
        }
    }

    /// Attribute name in title case ("avg_speed" -> "Avg Speed")
    fn attribute_title(self) -> String {
        let attribute: &'static str = self.into();
        attribute
            .split('_')
            .map(|word| {
                let mut chars = word.chars();
                match chars.next() {
                    Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                    None => String::new(),
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Convert the raw node text into a reading
    pub fn parse(self, raw: &str) -> Result<Reading, UpdateError> {
        let invalid = || UpdateError::InvalidValue {
            kind: self,
            raw: raw.to_string(),
        };

        match self {
            SensorKind::WindRotation => raw
                .trim()
                .trim_end_matches('°')
                .trim_end()
                .parse::<i64>()
                .map(Reading::Direction)
                .map_err(|_| invalid()),
            _ => match raw.trim().parse::<f64>() {
                Ok(speed) if speed.is_finite() && speed >= 0.0 => Ok(Reading::Speed(speed)),
                _ => Err(invalid()),
            },
        }
    }
}

impl std::fmt::Display for SensorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name: &'static str = self.into();
        f.write_str(name)
    }
}

/// Last value read from the page
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    /// Wind speed in m/s
    Speed(f64),
    /// Wind direction in degrees
    Direction(i64),
}

impl Reading {
    /// Value shown to users: speeds are rounded to one decimal place
    pub fn display_value(self) -> SensorValue {
        match self {
            Reading::Speed(speed) => SensorValue::Float(round_one_decimal(speed)),
            Reading::Direction(degrees) => SensorValue::Integer(degrees),
        }
    }

    /// Value as read from the page
    pub fn native_value(self) -> SensorValue {
        match self {
            Reading::Speed(speed) => SensorValue::Float(speed),
            Reading::Direction(degrees) => SensorValue::Integer(degrees),
        }
    }
}

/// Round to one decimal place using the exact binary value (2.35 -> 2.4)
fn round_one_decimal(value: f64) -> f64 {
    format!("{:.1}", value).parse().unwrap_or(value)
}

/// Icon for a wind speed in m/s
#[allow(clippy::if_same_then_else)]
fn speed_icon(speed: f64) -> &'static str {
    if speed <= 2.0 {
        ICON_CALM
    } else if speed <= 5.0 {
        ICON_WINDY
    } else {
        // Strong wind has no icon of its own.
        ICON_WINDY
    }
}

/// Result of a call to [`WindSensor::update`] that did not fail
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// A new value was stored
    Updated,
    /// The page could not be fetched; the previous value is kept
    Unavailable,
    /// Called too soon after the previous update; nothing was fetched
    Throttled,
}

/// The page was fetched but did not have the expected layout
#[derive(Debug, thiserror::Error)]
pub enum UpdateError {
    #[error("text node {index} not found in page from {url}")]
    NodeMissing { url: String, index: usize },

    #[error("'{raw}' is not a valid {kind} value")]
    InvalidValue { kind: SensorKind, raw: String },
}

/// One wind value of a windgraf station
#[derive(Debug)]
pub struct WindSensor {
    name: String,
    url: String,
    kind: SensorKind,
    unique_id: String,
    last_value: Option<Reading>,
    throttle: Throttle,
}

impl WindSensor {
    pub fn new(base_name: &str, url: &str, kind: SensorKind) -> Self {
        Self {
            name: format!("{} {}", base_name, kind.display_suffix()),
            url: url.to_string(),
            kind,
            unique_id: format!("{}_{}", object_id(base_name), kind.id_suffix()),
            last_value: None,
            throttle: Throttle::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn kind(&self) -> SensorKind {
        self.kind
    }

    pub fn unique_id(&self) -> &str {
        &self.unique_id
    }

    pub fn unit(&self) -> &'static str {
        self.kind.unit()
    }

    /// `"{name} {Attribute Title}"`, e.g. "Garden Max Speed Max Speed"
    pub fn friendly_name(&self) -> String {
        format!("{} {}", self.name, self.kind.attribute_title())
    }

    pub fn last_value(&self) -> Option<Reading> {
        self.last_value
    }

    /// Value to display, `None` until the first successful update
    pub fn current_reading(&self) -> Option<SensorValue> {
        self.last_value.map(Reading::display_value)
    }

    /// Value as read from the page, `None` until the first successful update
    pub fn native_value(&self) -> Option<SensorValue> {
        self.last_value.map(Reading::native_value)
    }

    pub fn display_icon(&self) -> &'static str {
        match (self.kind, self.last_value) {
            (SensorKind::WindRotation, _) => ICON_COMPASS,
            (_, Some(Reading::Speed(speed))) => speed_icon(speed),
            (_, Some(Reading::Direction(_))) => ICON_COMPASS,
            (_, None) => ICON_UNAVAILABLE,
        }
    }

    /// Fetch the page and store the value this sensor reads.
    ///
    /// Transport failures and non-200 responses are logged and keep the previous
    /// value. A page without the expected node or value is an error. Calls made
    /// within a minute of the last completed update do nothing.
    pub async fn update(&mut self, fetcher: &dyn PageFetcher) -> Result<UpdateOutcome, UpdateError> {
        if !self.throttle.is_ready(Instant::now()) {
            debug!("Skipping update of {}: throttled", self.unique_id);
            return Ok(UpdateOutcome::Throttled);
        }

        debug!("Fetching {} for {}", self.url, self.unique_id);
        let outcome = match fetcher.fetch(&self.url).await {
            Ok(page) if page.status == reqwest::StatusCode::OK => {
                let reading = self.read_page(&page.body)?;
                self.last_value = Some(reading);
                UpdateOutcome::Updated
            }
            Ok(page) => {
                error!("Failed to fetch data from {} (HTTP {})", self.url, page.status);
                UpdateOutcome::Unavailable
            }
            Err(e) => {
                error!("Failed to fetch data from {}: {}", self.url, e);
                UpdateOutcome::Unavailable
            }
        };

        self.throttle.mark(Instant::now());
        Ok(outcome)
    }

    /// Extract this sensor's reading from a page body
    fn read_page(&self, body: &str) -> Result<Reading, UpdateError> {
        let document = extract::parse_document(body);
        let index = self.kind.node_index();
        let raw = extract::extract_node_text(&document, index).ok_or_else(|| {
            UpdateError::NodeMissing {
                url: self.url.clone(),
                index,
            }
        })?;
        self.kind.parse(&raw)
    }
}

impl Entity for WindSensor {
    fn entity_id(&self) -> String {
        format!("sensor.{}", self.unique_id)
    }

    fn platform(&self) -> &'static str {
        "sensor"
    }

    fn snapshot(&self) -> SensorState {
        SensorState {
            name: self.name.clone(),
            unique_id: self.unique_id.clone(),
            friendly_name: self.friendly_name(),
            value: self.current_reading(),
            native_value: self.native_value(),
            unit_of_measurement: self.unit().to_string(),
            icon: self.display_icon().to_string(),
            device_info: DeviceInfo::new(DOMAIN, self.unique_id.clone(), self.name.clone()),
        }
    }
}

/// The four sensors of one station
pub fn sensors_for(config: &WindgrafConfig) -> Vec<WindSensor> {
    SensorKind::iter()
        .map(|kind| WindSensor::new(&config.name, &config.url, kind))
        .collect()
}
