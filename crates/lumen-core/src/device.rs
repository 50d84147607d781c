//! Device identity types

use serde::{Deserialize, Serialize};

/// Unique identifier for a bulb, taken verbatim from the `id` header
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

/// Identity and network location extracted from a capability record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Unique device identifier
    pub id: DeviceId,
    /// Hostname parsed from the location URL
    pub host: String,
}
