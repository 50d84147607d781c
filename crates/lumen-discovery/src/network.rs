//! Local network adapters and the source addresses listeners bind to

use anyhow::Result;
use lumen_ssdp::{SSDP_MULTICAST_ADDR, SSDP_PORT};
use network_interface::{Addr, NetworkInterface, NetworkInterfaceConfig};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use tracing::{debug, warn};

/// A local network adapter as seen by the scanner
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adapter {
    pub name: String,
    pub ipv4: Vec<Ipv4Addr>,
    /// Whether discovery should use this adapter
    pub enabled: bool,
    /// Whether this adapter carries the default route
    pub default: bool,
}

/// Source of facts about the host's network adapters
pub trait NetworkEnvironment: Send + Sync {
    fn adapters(&self) -> Result<Vec<Adapter>>;
}

/// True when no adapter other than the default one is enabled
pub fn only_default_interface_enabled(adapters: &[Adapter]) -> bool {
    !adapters
        .iter()
        .any(|adapter| adapter.enabled && !adapter.default)
}

/// Enabled, non-loopback IPv4 addresses, sorted and de-duplicated
pub fn enabled_source_ips(adapters: &[Adapter]) -> Vec<Ipv4Addr> {
    adapters
        .iter()
        .filter(|adapter| adapter.enabled)
        .flat_map(|adapter| adapter.ipv4.iter().copied())
        .filter(|ip| !ip.is_loopback())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Work out which local addresses to bind search listeners to.
///
/// With only the default interface enabled a single wildcard listener is
/// used; otherwise one listener per enabled IPv4 address.
pub fn build_source_set(env: &dyn NetworkEnvironment) -> Vec<Ipv4Addr> {
    let adapters = match env.adapters() {
        Ok(adapters) => adapters,
        Err(e) => {
            warn!(error = %e, "Failed to enumerate network adapters, using wildcard source");
            return vec![Ipv4Addr::UNSPECIFIED];
        }
    };

    if only_default_interface_enabled(&adapters) {
        debug!("Only the default interface is enabled, using wildcard source");
        return vec![Ipv4Addr::UNSPECIFIED];
    }

    let sources = enabled_source_ips(&adapters);
    if sources.is_empty() {
        warn!("No enabled IPv4 source addresses, discovery will find nothing");
    }
    sources
}

/// Adapters read from the operating system
#[derive(Debug, Clone, Default)]
pub struct SystemNetwork {
    /// Adapter names enabled for discovery. Empty means default only.
    interfaces: Vec<String>,
}

impl SystemNetwork {
    pub fn new(interfaces: Vec<String>) -> Self {
        Self { interfaces }
    }
}

impl NetworkEnvironment for SystemNetwork {
    fn adapters(&self) -> Result<Vec<Adapter>> {
        let default_ip = default_route_ip();

        // Some platforms report one entry per address, so merge by name
        let mut by_name: BTreeMap<String, Vec<Ipv4Addr>> = BTreeMap::new();
        for iface in NetworkInterface::show()? {
            let ips = by_name.entry(iface.name.clone()).or_default();
            for addr in &iface.addr {
                if let Addr::V4(v4) = addr {
                    if !ips.contains(&v4.ip) {
                        ips.push(v4.ip);
                    }
                }
            }
        }

        let adapters = by_name
            .into_iter()
            .map(|(name, ipv4)| {
                let default = default_ip.is_some_and(|ip| ipv4.contains(&ip));
                let enabled = if self.interfaces.is_empty() {
                    default
                } else {
                    self.interfaces.iter().any(|wanted| wanted == &name)
                };
                Adapter {
                    name,
                    ipv4,
                    enabled,
                    default,
                }
            })
            .collect::<Vec<_>>();

        debug!(
            count = adapters.len(),
            default = ?default_ip,
            "Enumerated network adapters"
        );
        Ok(adapters)
    }
}

/// Local address the OS would use to reach the discovery multicast group
fn default_route_ip() -> Option<Ipv4Addr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).ok()?;
    socket.connect((SSDP_MULTICAST_ADDR, SSDP_PORT)).ok()?;
    match socket.local_addr().ok()?.ip() {
        IpAddr::V4(ip) if !ip.is_unspecified() => Some(ip),
        _ => None,
    }
}
