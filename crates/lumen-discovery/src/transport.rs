//! Search transport seam between the scanner and the network

use anyhow::Result;
use lumen_core::CapabilityRecord;
use lumen_ssdp::SsdpSearchListener;
use std::future::Future;
use std::net::{Ipv4Addr, SocketAddr};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

/// Callback invoked for every decoded discovery response
pub type ResponseHandler = Arc<dyn Fn(CapabilityRecord) + Send + Sync>;

/// One-shot flag marking a listener as done starting (bound or failed)
#[derive(Clone)]
pub struct StartupSignal {
    tx: Arc<watch::Sender<bool>>,
}

impl StartupSignal {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(false);
        Self { tx: Arc::new(tx) }
    }

    pub fn set(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_set(&self) -> bool {
        *self.tx.borrow()
    }

    /// Wait until the signal is set
    pub async fn wait(&self) {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so this only returns once set
        let _ = rx.wait_for(|set| *set).await;
    }
}

impl Default for StartupSignal {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything a listener needs to know about its slot in the scanner
#[derive(Clone)]
pub struct ListenerContext {
    /// Position of this listener in the scanner's listener set
    pub index: usize,
    /// Local address searches are sent from
    pub source: Ipv4Addr,
    /// Where decoded responses go
    pub on_response: ResponseHandler,
    /// Set by the listener once its socket is bound
    pub connected: StartupSignal,
}

/// Creates search listeners for source addresses
pub trait SearchTransport: Send + Sync + 'static {
    type Listener: SearchListener;

    fn create_listener(&self, context: ListenerContext) -> Self::Listener;
}

/// A single bound search socket
pub trait SearchListener: Send + Sync + 'static {
    fn source(&self) -> Ipv4Addr;

    /// Bind the transport. Implementations set the context's `connected`
    /// signal once bound; on error the scanner sets it instead.
    fn start(&self) -> impl Future<Output = Result<()>> + Send;

    /// Fire a search without waiting: multicast when `target` is `None`,
    /// unicast to `target` otherwise.
    fn search(&self, target: Option<SocketAddr>);
}

/// UDP transport backed by `lumen-ssdp`
#[derive(Debug, Clone, Copy, Default)]
pub struct UdpTransport;

impl SearchTransport for UdpTransport {
    type Listener = UdpListener;

    fn create_listener(&self, context: ListenerContext) -> UdpListener {
        UdpListener {
            inner: SsdpSearchListener::new(context.source),
            context,
        }
    }
}

pub struct UdpListener {
    context: ListenerContext,
    inner: SsdpSearchListener,
}

impl SearchListener for UdpListener {
    fn source(&self) -> Ipv4Addr {
        self.context.source
    }

    async fn start(&self) -> Result<()> {
        let on_response = self.context.on_response.clone();
        self.inner
            .start(move |record, _from| on_response(record))
            .await?;
        debug!(
            index = self.context.index,
            source = %self.context.source,
            "UDP search listener connected"
        );
        self.context.connected.set();
        Ok(())
    }

    fn search(&self, target: Option<SocketAddr>) {
        self.inner.search(target);
    }
}
