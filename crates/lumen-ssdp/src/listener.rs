//! UDP search listener bound to a single local source address

use anyhow::Result;
use lumen_core::CapabilityRecord;
use socket2::{Domain, Protocol, Socket, Type};
use std::io::ErrorKind;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::{Arc, OnceLock};
use tokio::net::UdpSocket;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::message::{build_search, parse_response, SSDP_ST, SSDP_TARGET};

/// Multicast TTL for searches; keeps traffic on the local segment
const MULTICAST_TTL: u32 = 2;

/// Largest datagram we expect from a bulb
const RECV_BUFFER_SIZE: usize = 2048;

/// Sends searches from one source address and hands every decoded
/// response to a callback.
pub struct SsdpSearchListener {
    source: SocketAddrV4,
    target: SocketAddrV4,
    search_target: String,
    socket: OnceLock<Arc<UdpSocket>>,
    recv_task: OnceLock<JoinHandle<()>>,
}

impl SsdpSearchListener {
    /// Create a listener for `source_ip`. Nothing is bound until `start`.
    pub fn new(source_ip: Ipv4Addr) -> Self {
        Self {
            source: SocketAddrV4::new(source_ip, 0),
            target: SSDP_TARGET,
            search_target: SSDP_ST.to_string(),
            socket: OnceLock::new(),
            recv_task: OnceLock::new(),
        }
    }

    pub fn source(&self) -> SocketAddrV4 {
        self.source
    }

    pub fn is_started(&self) -> bool {
        self.socket.get().is_some()
    }

    /// Bind the socket and spawn the receive loop.
    ///
    /// Returns once the socket is bound; responses are delivered to
    /// `on_response` from the receive task.
    pub async fn start<F>(&self, on_response: F) -> Result<()>
    where
        F: Fn(CapabilityRecord, SocketAddr) + Send + Sync + 'static,
    {
        if self.is_started() {
            anyhow::bail!("Listener for {} already started", self.source);
        }

        let socket = Arc::new(UdpSocket::from_std(bind_search_socket(self.source)?)?);
        let local = socket.local_addr()?;
        debug!(source = %self.source, local = %local, "Search listener bound");

        let recv_socket = socket.clone();
        let task = tokio::spawn(async move {
            receive_loop(recv_socket, on_response).await;
        });

        if self.socket.set(socket).is_err() || self.recv_task.set(task).is_err() {
            anyhow::bail!("Listener for {} started concurrently", self.source);
        }
        Ok(())
    }

    /// Fire a search without waiting. `None` searches the multicast group,
    /// `Some(addr)` sends a unicast search to that host.
    pub fn search(&self, target: Option<SocketAddr>) {
        let Some(socket) = self.socket.get() else {
            debug!(source = %self.source, "Search skipped, listener not started");
            return;
        };

        let destination = target.unwrap_or(SocketAddr::V4(self.target));
        let packet = build_search(destination, &self.search_target);

        trace!(source = %self.source, target = %destination, "Sending M-SEARCH");
        if let Err(e) = socket.try_send_to(&packet, destination) {
            warn!(
                source = %self.source,
                target = %destination,
                error = %e,
                "Failed to send search"
            );
        }
    }
}

impl Drop for SsdpSearchListener {
    fn drop(&mut self) {
        if let Some(task) = self.recv_task.get() {
            task.abort();
        }
    }
}

/// Create a non-blocking UDP socket for multicast searches from `source`
fn bind_search_socket(source: SocketAddrV4) -> Result<std::net::UdpSocket> {
    let socket = Socket::new(Domain::IPV4, Type::DGRAM, Some(Protocol::UDP))?;
    socket.set_reuse_address(true)?;
    socket.set_multicast_ttl_v4(MULTICAST_TTL)?;
    if !source.ip().is_unspecified() {
        socket.set_multicast_if_v4(source.ip())?;
    }
    socket.bind(&SocketAddr::V4(source).into())?;
    socket.set_nonblocking(true)?;
    Ok(socket.into())
}

async fn receive_loop<F>(socket: Arc<UdpSocket>, on_response: F)
where
    F: Fn(CapabilityRecord, SocketAddr),
{
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        match socket.recv_from(&mut buf).await {
            Ok((len, addr)) => match parse_response(&buf[..len]) {
                Ok(record) => on_response(record, addr),
                Err(e) => trace!(from = %addr, error = %e, "Ignoring datagram"),
            },
            // Windows reports ICMP port-unreachable from unicast searches here
            Err(e) if e.kind() == ErrorKind::ConnectionReset => {
                trace!(error = %e, "Ignoring connection reset");
            }
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => {
                warn!(error = %e, "Search listener receive failed, stopping");
                break;
            }
        }
    }
}
