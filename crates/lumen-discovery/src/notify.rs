//! Delayed "device discovered" notifications

use lumen_core::DiscoveryDescriptor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::debug;

/// Receives new-or-moved device notifications
pub trait DiscoverySink: Send + Sync + 'static {
    fn discovered(&self, descriptor: DiscoveryDescriptor);
}

/// Sink that fans descriptors out to broadcast subscribers
pub struct ChannelSink {
    tx: broadcast::Sender<DiscoveryDescriptor>,
}

impl ChannelSink {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DiscoveryDescriptor> {
        self.tx.subscribe()
    }
}

impl DiscoverySink for ChannelSink {
    fn discovered(&self, descriptor: DiscoveryDescriptor) {
        // No subscribers is fine
        let _ = self.tx.send(descriptor);
    }
}

/// A scheduled notification that has not necessarily fired yet
#[derive(Debug)]
pub struct PendingNotification {
    handle: JoinHandle<()>,
}

impl PendingNotification {
    /// Stop the notification from firing if it has not already
    pub fn cancel(&self) {
        self.handle.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

/// Delivers notifications to a sink after a fixed delay, so a burst of
/// responses from one search round is not handled inline
#[derive(Clone)]
pub struct DebouncedNotifier {
    sink: Arc<dyn DiscoverySink>,
    delay: Duration,
}

impl DebouncedNotifier {
    pub fn new(sink: Arc<dyn DiscoverySink>, delay: Duration) -> Self {
        Self { sink, delay }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule a single delivery. Must be called within a tokio runtime.
    pub fn schedule(&self, descriptor: DiscoveryDescriptor) -> PendingNotification {
        let sink = self.sink.clone();
        let delay = self.delay;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            debug!(
                id = ?descriptor.device_id(),
                host = ?descriptor.host(),
                "Notifying discovery sink"
            );
            sink.discovered(descriptor);
        });
        PendingNotification { handle }
    }
}
