use serde::Serialize;

/// Device grouping information attached to an entity.
///
/// Entities that share an identifier are shown as belonging to one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceInfo {
    /// `(domain, id)` pairs identifying the device
    pub identifiers: Vec<(String, String)>,
    pub name: String,
}

impl DeviceInfo {
    pub fn new(domain: &str, id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            identifiers: vec![(domain.to_string(), id.into())],
            name: name.into(),
        }
    }
}
