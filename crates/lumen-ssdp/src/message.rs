//! SSDP search request encoding and response decoding

use lumen_core::CapabilityRecord;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use thiserror::Error;
use tracing::trace;

/// Multicast group bulbs listen on
pub const SSDP_MULTICAST_ADDR: Ipv4Addr = Ipv4Addr::new(239, 255, 255, 250);

/// Bulb discovery port (not the standard 1900)
pub const SSDP_PORT: u16 = 1982;

/// Multicast search destination
pub const SSDP_TARGET: SocketAddrV4 = SocketAddrV4::new(SSDP_MULTICAST_ADDR, SSDP_PORT);

/// Search target answered by bulbs
pub const SSDP_ST: &str = "wifi_bulb";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SsdpError {
    #[error("Empty datagram")]
    Empty,
    #[error("Not a search response: {0:?}")]
    NotAResponse(String),
    #[error("Search response has status {0}")]
    BadStatus(u16),
    #[error("Response carries no headers")]
    NoHeaders,
}

/// Encode an `M-SEARCH` request addressed to `target`
pub fn build_search(target: SocketAddr, search_target: &str) -> Vec<u8> {
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         ST: {}\r\n\
         \r\n",
        target, search_target
    )
    .into_bytes()
}

/// Decode a search response into its capability record
pub fn parse_response(data: &[u8]) -> Result<CapabilityRecord, SsdpError> {
    let text = String::from_utf8_lossy(data);
    let mut lines = text.lines();

    let status_line = lines
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .ok_or(SsdpError::Empty)?;

    let status = parse_status_line(status_line)?;
    if status != 200 {
        return Err(SsdpError::BadStatus(status));
    }

    let mut record = CapabilityRecord::new();
    for line in lines {
        if line.trim().is_empty() {
            break;
        }
        match line.split_once(':') {
            Some((name, value)) => {
                record.insert(name.trim(), value.trim());
            }
            None => trace!(line = %line, "Skipping malformed header line"),
        }
    }

    if record.is_empty() {
        return Err(SsdpError::NoHeaders);
    }
    Ok(record)
}

/// Parse `HTTP/1.1 200 OK` into its status code
fn parse_status_line(line: &str) -> Result<u16, SsdpError> {
    let mut parts = line.split_whitespace();
    let version = parts.next().unwrap_or_default();
    if !version.to_ascii_uppercase().starts_with("HTTP/") {
        return Err(SsdpError::NotAResponse(line.to_string()));
    }
    parts
        .next()
        .and_then(|code| code.parse().ok())
        .ok_or_else(|| SsdpError::NotAResponse(line.to_string()))
}
