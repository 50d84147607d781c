//! Capability records returned by bulbs in discovery responses
//!
//! A record is the header block of a discovery response, for example:
//!
//! ```text
//! Location: yeelight://192.168.1.239:55443
//! id: 0x000000000015243f
//! model: color
//! fw_ver: 18
//! support: get_prop set_default set_power toggle set_bright
//! ```
//!
//! Header names are matched case-insensitively but keep the spelling they
//! arrived with, so the record can be handed on unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use url::{Host, Url};

use crate::device::{DeviceId, Identity};

/// Header carrying the unique device identifier
pub const ID_FIELD: &str = "id";

/// Header carrying the device location URL
pub const LOCATION_FIELD: &str = "location";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RecordError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid location {location:?}: {reason}")]
    InvalidLocation { location: String, reason: String },
}

/// Case-insensitive attribute set describing a single device
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "BTreeMap<String, String>", into = "BTreeMap<String, String>")]
pub struct CapabilityRecord {
    /// Lowercased name -> (original name, value)
    entries: BTreeMap<String, (String, String)>,
}

impl CapabilityRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an attribute, replacing any value stored under the same
    /// name in any letter case. Returns the previous value.
    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<String>) -> Option<String> {
        let name = name.into();
        self.entries
            .insert(name.to_ascii_lowercase(), (name, value.into()))
            .map(|(_, old)| old)
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, value)| value.as_str())
    }

    pub fn contains_key(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate attributes with their original header spelling
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries
            .values()
            .map(|(name, value)| (name.as_str(), value.as_str()))
    }

    pub fn id(&self) -> Option<&str> {
        self.get(ID_FIELD)
    }

    pub fn location(&self) -> Option<&str> {
        self.get(LOCATION_FIELD)
    }

    pub fn model(&self) -> Option<&str> {
        self.get("model")
    }

    pub fn name(&self) -> Option<&str> {
        self.get("name").filter(|name| !name.is_empty())
    }

    pub fn fw_ver(&self) -> Option<&str> {
        self.get("fw_ver")
    }

    /// Whether the bulb lists `method` in its `support` header
    pub fn supports(&self, method: &str) -> bool {
        self.get("support")
            .map(|support| support.split_whitespace().any(|m| m == method))
            .unwrap_or(false)
    }

    /// Hostname of the location URL
    pub fn host(&self) -> Result<String, RecordError> {
        let location = self
            .location()
            .ok_or(RecordError::MissingField(LOCATION_FIELD))?;
        hostname_of(location)
    }

    /// Extract the unique id and location hostname
    pub fn identify(&self) -> Result<Identity, RecordError> {
        let id = self
            .id()
            .filter(|id| !id.is_empty())
            .ok_or(RecordError::MissingField(ID_FIELD))?;
        Ok(Identity {
            id: DeviceId::new(id),
            host: self.host()?,
        })
    }
}

/// Parse the hostname out of a location URL.
///
/// Domain names are lowercased and IPv6 literals are returned without
/// brackets.
pub fn hostname_of(location: &str) -> Result<String, RecordError> {
    let invalid = |reason: String| RecordError::InvalidLocation {
        location: location.to_string(),
        reason,
    };

    let url = Url::parse(location.trim()).map_err(|e| invalid(e.to_string()))?;
    let host = match url.host() {
        Some(Host::Domain(domain)) => domain.to_ascii_lowercase(),
        Some(Host::Ipv4(addr)) => addr.to_string(),
        Some(Host::Ipv6(addr)) => addr.to_string(),
        None => return Err(invalid("no host".to_string())),
    };

    if host.is_empty() {
        return Err(invalid("empty host".to_string()));
    }
    Ok(host)
}

impl From<BTreeMap<String, String>> for CapabilityRecord {
    fn from(map: BTreeMap<String, String>) -> Self {
        map.into_iter().collect()
    }
}

impl From<CapabilityRecord> for BTreeMap<String, String> {
    fn from(record: CapabilityRecord) -> Self {
        record.entries.into_values().collect()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for CapabilityRecord {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut record = Self::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}
