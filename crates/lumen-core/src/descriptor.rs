//! Discovery descriptors passed to onboarding consumers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::capability::CapabilityRecord;
use crate::device::DeviceId;

/// Synthesized description of a newly seen (or moved) device
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryDescriptor {
    /// Unique service name. Bulbs do not send one, so this stays empty.
    pub usn: String,
    /// Search target the device answered
    pub search_target: String,
    /// Raw capability record as received
    pub headers: CapabilityRecord,
    /// UPnP description attributes (never fetched for bulbs)
    pub upnp: BTreeMap<String, String>,
    /// When the response that produced this descriptor was processed
    pub discovered_at: DateTime<Utc>,
}

impl DiscoveryDescriptor {
    pub fn new(search_target: impl Into<String>, headers: CapabilityRecord) -> Self {
        Self {
            usn: String::new(),
            search_target: search_target.into(),
            headers,
            upnp: BTreeMap::new(),
            discovered_at: Utc::now(),
        }
    }

    pub fn device_id(&self) -> Option<DeviceId> {
        self.headers.id().map(DeviceId::new)
    }

    pub fn host(&self) -> Option<String> {
        self.headers.host().ok()
    }
}
