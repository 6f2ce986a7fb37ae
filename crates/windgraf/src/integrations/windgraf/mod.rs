//! Windgraf weather station integration.
//!
//! Reads wind speeds and direction from the SVG diagram a windgraf station
//! serves as a web page.

mod extract;
mod fetch;
mod sensor;
mod throttle;
#[allow(clippy::module_inception)]
mod windgraf;

use anyhow::Context;
use linkme::distributed_slice;

pub use extract::extract_node_text;
pub use extract::parse_document;
pub use fetch::FetchError;
pub use fetch::HttpFetcher;
pub use fetch::Page;
pub use fetch::PageFetcher;
pub use sensor::sensors_for;
pub use sensor::ICON_COMPASS;
pub use sensor::ICON_UNAVAILABLE;
pub use sensor::Reading;
pub use sensor::SensorKind;
pub use sensor::UpdateError;
pub use sensor::UpdateOutcome;
pub use sensor::WindSensor;
pub use throttle::MIN_TIME_BETWEEN_UPDATES;
pub use windgraf::WindgrafIntegration;

use crate::engine;

/// Integration domain, also the namespace of device identifiers
pub const DOMAIN: &str = "windgraf";

#[distributed_slice(engine::INTEGRATION_REGISTRY)]
fn init_windgraf(ctx: &engine::IntegrationContext) -> engine::IntegrationFactoryResult {
    let stations = &ctx.config.integrations.windgraf;
    if stations.is_empty() {
        return Ok(None);
    }

    let fetcher =
        HttpFetcher::new(ctx.config.http.timeout()).context("Failed to create HTTP client")?;
    Ok(Some(Box::new(WindgrafIntegration::new(fetcher, stations))))
}
