//! Lumen SSDP - Search messages and UDP listeners for bulb discovery
//!
//! Bulbs speak a trimmed-down SSDP dialect: searches go to
//! `239.255.255.250:1982` with `ST: wifi_bulb`, and each bulb answers
//! with an `HTTP/1.1 200 OK` whose headers are its capability record.

pub mod listener;
pub mod message;

pub use listener::SsdpSearchListener;
pub use message::{
    build_search, parse_response, SsdpError, SSDP_MULTICAST_ADDR, SSDP_PORT, SSDP_ST,
    SSDP_TARGET,
};
