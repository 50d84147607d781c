//! Lumen Core - Shared types for smart-bulb discovery
//!
//! This crate provides the foundational types for the Lumen system:
//! - Capability records returned by bulbs in their discovery responses
//! - Device identity derived from the record's `id` field
//! - Discovery descriptors handed to onboarding consumers

pub mod capability;
pub mod descriptor;
pub mod device;

pub use capability::{CapabilityRecord, RecordError};
pub use descriptor::DiscoveryDescriptor;
pub use device::{DeviceId, Identity};
