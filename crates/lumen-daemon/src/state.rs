//! Application state management

use anyhow::Result;
use lumen_core::DiscoveryDescriptor;
use lumen_discovery::{ChannelSink, DiscoveryScanner, ScannerConfig, SystemNetwork, UdpTransport};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

use crate::config::Config;

/// Shared application state
pub struct AppState {
    /// The process-wide discovery scanner
    pub scanner: Arc<DiscoveryScanner>,
    /// Network adapters discovery binds to
    pub network: Arc<SystemNetwork>,
    /// Discovery notifications fan-out
    pub sink: Arc<ChannelSink>,
    /// Configuration
    pub config: Config,
}

impl AppState {
    /// Create new application state
    pub async fn new(config: Config) -> Result<Arc<Self>> {
        let network = Arc::new(SystemNetwork::new(config.discovery.interfaces.clone()));
        let sink = Arc::new(ChannelSink::new(config.daemon.event_capacity));
        let scanner = DiscoveryScanner::new(
            ScannerConfig::default(),
            UdpTransport,
            network.clone(),
            sink.clone(),
        );

        let state = Arc::new(Self {
            scanner,
            network,
            sink,
            config,
        });

        // Onboarding hand-off: log every new or moved bulb
        let mut rx = state.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(descriptor) => log_onboarding(&descriptor),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        debug!(skipped = n, "Onboarding log lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });

        Ok(state)
    }

    /// Subscribe to new-or-moved device notifications
    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryDescriptor> {
        self.sink.subscribe()
    }
}

fn log_onboarding(descriptor: &DiscoveryDescriptor) {
    info!(
        id = descriptor.headers.id().unwrap_or_default(),
        host = descriptor.host().as_deref().unwrap_or_default(),
        model = descriptor.headers.model().unwrap_or("unknown"),
        "Starting onboarding for bulb"
    );
}
