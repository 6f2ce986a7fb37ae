#[cfg(feature = "integration_windgraf")]
pub mod windgraf;
