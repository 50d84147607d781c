//! Lumen Discovery - Locating smart bulbs on the local network
//!
//! The scanner owns one search listener per enabled IPv4 source address,
//! keeps the latest capability record per host and per device id, and
//! tells a sink (after a short delay) whenever a device appears or moves
//! to a new address.

pub mod network;
pub mod notify;
pub mod scanner;
pub mod transport;

pub use network::{Adapter, NetworkEnvironment, SystemNetwork};
pub use notify::{ChannelSink, DebouncedNotifier, DiscoverySink, PendingNotification};
pub use scanner::{DiscoveryScanner, ScannerConfig};
pub use transport::{
    ListenerContext, ResponseHandler, SearchListener, SearchTransport, StartupSignal,
    UdpTransport,
};
