//! Discovery scanner: listener lifecycle, capability caches, lookups

use futures_util::future::join_all;
use lumen_core::{CapabilityRecord, DeviceId, DiscoveryDescriptor};
use lumen_ssdp::{SSDP_PORT, SSDP_ST};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{Notify, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, sleep, timeout_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::network::{build_source_set, NetworkEnvironment};
use crate::notify::{DebouncedNotifier, DiscoverySink, PendingNotification};
use crate::transport::{
    ListenerContext, ResponseHandler, SearchListener, SearchTransport, StartupSignal,
    UdpTransport,
};

/// Searches sent by a bulk `discover`
pub const DISCOVERY_ATTEMPTS: usize = 3;

/// Pause between bulk `discover` searches
pub const DISCOVERY_SEARCH_INTERVAL: Duration = Duration::from_secs(2);

/// Background re-scan period
pub const DISCOVERY_INTERVAL: Duration = Duration::from_secs(60);

/// How long a targeted lookup waits for the host to answer
pub const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(8);

/// Delay before a new-or-moved device is reported to the sink
pub const NOTIFY_DELAY: Duration = Duration::from_secs(1);

/// Scanner timing and protocol parameters
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    pub attempts: usize,
    pub search_interval: Duration,
    pub rescan_interval: Duration,
    pub lookup_timeout: Duration,
    pub notify_delay: Duration,
    /// Search target reported in discovery descriptors
    pub search_target: String,
    /// Port targeted lookups are sent to
    pub search_port: u16,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            attempts: DISCOVERY_ATTEMPTS,
            search_interval: DISCOVERY_SEARCH_INTERVAL,
            rescan_interval: DISCOVERY_INTERVAL,
            lookup_timeout: DISCOVERY_TIMEOUT,
            notify_delay: NOTIFY_DELAY,
            search_target: SSDP_ST.to_string(),
            search_port: SSDP_PORT,
        }
    }
}

#[derive(Default)]
struct Caches {
    by_host: HashMap<String, CapabilityRecord>,
    by_id: HashMap<DeviceId, CapabilityRecord>,
}

type Waiters = HashMap<String, Vec<Arc<Notify>>>;

/// Discovery scanner service.
///
/// One instance is shared per process (`Arc<DiscoveryScanner>`). Listeners
/// are created lazily by the first `setup`, `discover` or
/// `get_capabilities` call.
pub struct DiscoveryScanner<T: SearchTransport = UdpTransport> {
    config: ScannerConfig,
    transport: T,
    network: Arc<dyn NetworkEnvironment>,
    notifier: DebouncedNotifier,
    caches: Mutex<Caches>,
    waiters: Mutex<Waiters>,
    listeners: RwLock<Vec<Arc<T::Listener>>>,
    connected: Mutex<Vec<StartupSignal>>,
    setup: OnceCell<()>,
    rescan_task: Mutex<Option<JoinHandle<()>>>,
    /// Scheduled notifications not yet known to have fired
    notifications: Mutex<Vec<PendingNotification>>,
}

impl<T: SearchTransport> DiscoveryScanner<T> {
    /// Create a scanner. Nothing touches the network until `setup`.
    pub fn new(
        config: ScannerConfig,
        transport: T,
        network: Arc<dyn NetworkEnvironment>,
        sink: Arc<dyn DiscoverySink>,
    ) -> Arc<Self> {
        let notifier = DebouncedNotifier::new(sink, config.notify_delay);
        Arc::new(Self {
            config,
            transport,
            network,
            notifier,
            caches: Mutex::new(Caches::default()),
            waiters: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            connected: Mutex::new(Vec::new()),
            setup: OnceCell::new(),
            rescan_task: Mutex::new(None),
            notifications: Mutex::new(Vec::new()),
        })
    }

    pub fn config(&self) -> &ScannerConfig {
        &self.config
    }

    /// Make sure listeners exist and have finished binding.
    ///
    /// Concurrent and repeated calls share the first call's work.
    pub async fn setup(self: &Arc<Self>) {
        self.setup.get_or_init(|| self.start_listeners()).await;
        self.wait_connected().await;
    }

    pub fn is_set_up(&self) -> bool {
        self.setup.initialized()
    }

    async fn start_listeners(self: &Arc<Self>) {
        let sources = build_source_set(self.network.as_ref());
        info!(sources = ?sources, "Setting up discovery listeners");

        let mut listeners = Vec::with_capacity(sources.len());
        let mut signals = Vec::with_capacity(sources.len());
        for (index, source) in sources.into_iter().enumerate() {
            let connected = StartupSignal::new();
            let context = ListenerContext {
                index,
                source,
                on_response: self.response_handler(),
                connected: connected.clone(),
            };
            listeners.push(Arc::new(self.transport.create_listener(context)));
            signals.push(connected);
        }
        *self.connected.lock() = signals.clone();

        let results = join_all(listeners.iter().map(|listener| listener.start())).await;

        let mut active = Vec::with_capacity(listeners.len());
        for ((listener, signal), result) in listeners.into_iter().zip(&signals).zip(results) {
            match result {
                Ok(()) => active.push(listener),
                Err(e) => {
                    warn!(
                        source = %listener.source(),
                        error = %e,
                        "Failed to set up discovery listener"
                    );
                    signal.set();
                }
            }
        }

        info!(
            active = active.len(),
            total = signals.len(),
            "Discovery listeners started"
        );
        *self.listeners.write() = active;

        join_all(signals.iter().map(|signal| signal.wait())).await;

        self.start_rescan_timer();
        self.scan();
    }

    async fn wait_connected(&self) {
        let signals = self.connected.lock().clone();
        join_all(signals.iter().map(|signal| signal.wait())).await;
    }

    /// Per-listener response callback. Holds only a weak reference so
    /// listeners never keep the scanner alive.
    fn response_handler(self: &Arc<Self>) -> ResponseHandler {
        let scanner: Weak<Self> = Arc::downgrade(self);
        Arc::new(move |record: CapabilityRecord| {
            if let Some(scanner) = scanner.upgrade() {
                scanner.process_response(record);
            }
        })
    }

    fn start_rescan_timer(self: &Arc<Self>) {
        let scanner = Arc::downgrade(self);
        let period = self.config.rescan_interval;

        let task = tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match scanner.upgrade() {
                    Some(scanner) => scanner.scan(),
                    None => break,
                }
            }
        });

        if let Some(previous) = self.rescan_task.lock().replace(task) {
            previous.abort();
        }
    }

    /// Send a multicast search on every active listener
    pub fn scan(&self) {
        let listeners = self.listeners.read();
        debug!(listeners = listeners.len(), "Scanning for bulbs");
        for listener in listeners.iter() {
            listener.search(None);
        }
    }

    /// Search repeatedly, then return every device seen so far.
    ///
    /// Best effort: whatever has answered by the last attempt is returned.
    pub async fn discover(self: &Arc<Self>) -> Vec<CapabilityRecord> {
        debug!(
            attempts = self.config.attempts,
            interval = ?self.config.search_interval,
            "Discovering bulbs"
        );
        self.setup().await;
        for _ in 0..self.config.attempts {
            self.scan();
            sleep(self.config.search_interval).await;
        }
        self.known_devices()
    }

    /// Capabilities for `host`, asking the network if not already cached.
    ///
    /// Returns `None` if the host does not answer within the lookup timeout.
    pub async fn get_capabilities(self: &Arc<Self>, host: &str) -> Option<CapabilityRecord> {
        let host = normalize_host(host);
        if let Some(record) = self.cached_capabilities(&host) {
            return Some(record);
        }

        let waiter = self.register_waiter(&host);
        self.setup().await;

        // Name resolution counts against the lookup timeout
        let deadline = Instant::now() + self.config.lookup_timeout;
        match timeout_at(deadline, self.lookup_target(&host)).await.ok().flatten() {
            Some(target) => {
                debug!(host = %host, target = %target, "Searching for host");
                for listener in self.listeners.read().iter() {
                    listener.search(Some(target));
                }
            }
            None => warn!(host = %host, "Cannot resolve host for targeted search"),
        }

        if timeout_at(deadline, waiter.wait()).await.is_err() {
            debug!(host = %host, "Timed out waiting for host to answer");
        }
        drop(waiter);

        self.cached_capabilities(&host)
    }

    async fn lookup_target(&self, host: &str) -> Option<SocketAddr> {
        let port = self.config.search_port;
        if let Ok(ip) = host.parse::<IpAddr>() {
            return Some(SocketAddr::new(ip, port));
        }
        match tokio::net::lookup_host((host, port)).await {
            Ok(mut addrs) => addrs.find(SocketAddr::is_ipv4),
            Err(e) => {
                debug!(host = %host, error = %e, "Host lookup failed");
                None
            }
        }
    }

    fn register_waiter(&self, host: &str) -> HostWaiter<'_> {
        let notify = Arc::new(Notify::new());
        self.waiters
            .lock()
            .entry(host.to_string())
            .or_default()
            .push(notify.clone());
        HostWaiter {
            waiters: &self.waiters,
            host: host.to_string(),
            notify,
        }
    }

    /// Handle one discovery response.
    ///
    /// Records are stored most-recent-wins under both host and id. A device
    /// is reported to the sink only when its id is new or its hostname
    /// differs from the one last recorded for that id.
    pub fn process_response(&self, record: CapabilityRecord) {
        let identity = match record.identify() {
            Ok(identity) => identity,
            Err(e) => {
                warn!(error = %e, "Discarding malformed discovery response");
                return;
            }
        };
        debug!(id = %identity.id, host = %identity.host, "Discovery response");

        let new_or_moved = {
            let mut caches = self.caches.lock();
            let new_or_moved = match caches.by_id.get(&identity.id) {
                None => true,
                Some(current) => current.host().ok().as_deref() != Some(identity.host.as_str()),
            };
            caches.by_host.insert(identity.host.clone(), record.clone());
            caches.by_id.insert(identity.id.clone(), record.clone());
            new_or_moved
        };

        if new_or_moved {
            info!(
                id = %identity.id,
                host = %identity.host,
                model = record.model().unwrap_or("unknown"),
                "Bulb discovered"
            );
            let pending = self.notifier.schedule(DiscoveryDescriptor::new(
                self.config.search_target.clone(),
                record,
            ));
            let mut notifications = self.notifications.lock();
            notifications.retain(|n| !n.is_finished());
            notifications.push(pending);
        }

        if let Some(waiters) = self.waiters.lock().get(&identity.host) {
            for waiter in waiters {
                waiter.notify_one();
            }
        }
    }

    /// Cached record for `host`, without touching the network
    pub fn cached_capabilities(&self, host: &str) -> Option<CapabilityRecord> {
        self.caches.lock().by_host.get(host).cloned()
    }

    /// Latest record for a device id
    pub fn device(&self, id: &DeviceId) -> Option<CapabilityRecord> {
        self.caches.lock().by_id.get(id).cloned()
    }

    /// Latest record of every known device, ordered by id
    pub fn known_devices(&self) -> Vec<CapabilityRecord> {
        let caches = self.caches.lock();
        let mut devices: Vec<(&DeviceId, &CapabilityRecord)> = caches.by_id.iter().collect();
        devices.sort_by(|a, b| a.0.cmp(b.0));
        devices.into_iter().map(|(_, record)| record.clone()).collect()
    }

    /// Number of lookups currently waiting on `host`
    pub fn pending_waiters(&self, host: &str) -> usize {
        self.waiters.lock().get(host).map_or(0, Vec::len)
    }

    /// Source addresses of listeners that started successfully
    pub fn active_sources(&self) -> Vec<Ipv4Addr> {
        self.listeners
            .read()
            .iter()
            .map(|listener| listener.source())
            .collect()
    }
}

impl<T: SearchTransport> Drop for DiscoveryScanner<T> {
    fn drop(&mut self) {
        if let Some(task) = self.rescan_task.lock().take() {
            task.abort();
        }
        for pending in self.notifications.lock().drain(..) {
            pending.cancel();
        }
    }
}

/// Lowercase a lookup host and strip IPv6 brackets so it matches the
/// hostnames parsed out of location URLs.
fn normalize_host(host: &str) -> String {
    let host = host.trim();
    let host = host
        .strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host);
    host.to_ascii_lowercase()
}

/// A registered wait on a host; removes itself from the scanner on drop,
/// whether it fired, timed out, or the lookup was abandoned.
struct HostWaiter<'a> {
    waiters: &'a Mutex<Waiters>,
    host: String,
    notify: Arc<Notify>,
}

impl HostWaiter<'_> {
    async fn wait(&self) {
        self.notify.notified().await;
    }
}

impl Drop for HostWaiter<'_> {
    fn drop(&mut self) {
        let mut waiters = self.waiters.lock();
        if let Some(list) = waiters.get_mut(&self.host) {
            list.retain(|notify| !Arc::ptr_eq(notify, &self.notify));
            if list.is_empty() {
                waiters.remove(&self.host);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Adapter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::timeout;

    #[derive(Default)]
    struct MockState {
        created: AtomicUsize,
        searches: Mutex<Vec<(Ipv4Addr, Option<SocketAddr>)>>,
        handlers: Mutex<Vec<ResponseHandler>>,
        /// Response a listener delivers as soon as it has started
        respond_on_start: Mutex<Option<CapabilityRecord>>,
    }

    impl MockState {
        fn multicast_searches(&self) -> usize {
            self.searches.lock().iter().filter(|(_, t)| t.is_none()).count()
        }

        fn unicast_searches(&self) -> Vec<SocketAddr> {
            self.searches.lock().iter().filter_map(|(_, t)| *t).collect()
        }

        /// Deliver a response through the first listener's callback
        fn deliver(&self, record: CapabilityRecord) {
            let handler = self.handlers.lock()[0].clone();
            handler(record);
        }
    }

    struct MockTransport {
        state: Arc<MockState>,
        failing: Vec<Ipv4Addr>,
    }

    struct MockListener {
        context: ListenerContext,
        state: Arc<MockState>,
        fail: bool,
    }

    impl SearchTransport for MockTransport {
        type Listener = MockListener;

        fn create_listener(&self, context: ListenerContext) -> MockListener {
            self.state.created.fetch_add(1, Ordering::SeqCst);
            MockListener {
                fail: self.failing.contains(&context.source),
                context,
                state: self.state.clone(),
            }
        }
    }

    impl SearchListener for MockListener {
        fn source(&self) -> Ipv4Addr {
            self.context.source
        }

        async fn start(&self) -> anyhow::Result<()> {
            tokio::time::sleep(Duration::from_millis(10)).await;
            if self.fail {
                anyhow::bail!("address in use");
            }
            self.state
                .handlers
                .lock()
                .push(self.context.on_response.clone());
            let early = self.state.respond_on_start.lock().take();
            if let Some(record) = early {
                (self.context.on_response)(record);
            }
            self.context.connected.set();
            Ok(())
        }

        fn search(&self, target: Option<SocketAddr>) {
            self.state.searches.lock().push((self.context.source, target));
        }
    }

    struct MockNetwork(Vec<Adapter>);

    impl NetworkEnvironment for MockNetwork {
        fn adapters(&self) -> anyhow::Result<Vec<Adapter>> {
            Ok(self.0.clone())
        }
    }

    #[derive(Default)]
    struct RecordingSink(Mutex<Vec<DiscoveryDescriptor>>);

    impl DiscoverySink for RecordingSink {
        fn discovered(&self, descriptor: DiscoveryDescriptor) {
            self.0.lock().push(descriptor);
        }
    }

    impl RecordingSink {
        fn count(&self) -> usize {
            self.0.lock().len()
        }
    }

    const ETH0: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
    const WLAN0: Ipv4Addr = Ipv4Addr::new(192, 168, 1, 20);

    fn two_adapters() -> MockNetwork {
        MockNetwork(vec![
            Adapter {
                name: "eth0".to_string(),
                ipv4: vec![ETH0],
                enabled: true,
                default: true,
            },
            Adapter {
                name: "wlan0".to_string(),
                ipv4: vec![WLAN0],
                enabled: true,
                default: false,
            },
        ])
    }

    fn scanner_with(
        failing: Vec<Ipv4Addr>,
    ) -> (
        Arc<DiscoveryScanner<MockTransport>>,
        Arc<MockState>,
        Arc<RecordingSink>,
    ) {
        let state = Arc::new(MockState::default());
        let sink = Arc::new(RecordingSink::default());
        let scanner = DiscoveryScanner::new(
            ScannerConfig::default(),
            MockTransport {
                state: state.clone(),
                failing,
            },
            Arc::new(two_adapters()),
            sink.clone(),
        );
        (scanner, state, sink)
    }

    fn bulb(id: &str, location: &str) -> CapabilityRecord {
        [("id", id), ("Location", location), ("power", "on")]
            .into_iter()
            .collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_starts_listener_per_source_and_scans() {
        let (scanner, state, _) = scanner_with(vec![]);
        scanner.setup().await;

        assert!(scanner.is_set_up());
        assert_eq!(scanner.active_sources(), vec![ETH0, WLAN0]);
        assert_eq!(state.multicast_searches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_setup_is_idempotent_under_concurrency() {
        let (scanner, state, _) = scanner_with(vec![]);

        let a = scanner.clone();
        let b = scanner.clone();
        tokio::join!(a.setup(), b.setup());
        scanner.setup().await;

        assert_eq!(state.created.load(Ordering::SeqCst), 2);
        assert_eq!(state.multicast_searches(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wildcard_when_only_default_interface() {
        let state = Arc::new(MockState::default());
        let network = MockNetwork(vec![Adapter {
            name: "eth0".to_string(),
            ipv4: vec![ETH0],
            enabled: true,
            default: true,
        }]);
        let scanner = DiscoveryScanner::new(
            ScannerConfig::default(),
            MockTransport {
                state: state.clone(),
                failing: vec![],
            },
            Arc::new(network),
            Arc::new(RecordingSink::default()),
        );

        scanner.setup().await;
        assert_eq!(scanner.active_sources(), vec![Ipv4Addr::UNSPECIFIED]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_listener_is_dropped() {
        let (scanner, state, _) = scanner_with(vec![WLAN0]);
        scanner.setup().await;

        assert_eq!(scanner.active_sources(), vec![ETH0]);
        assert_eq!(state.multicast_searches(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeat_response_notifies_once() {
        let (scanner, _, sink) = scanner_with(vec![]);

        scanner.process_response(bulb("A", "http://10.0.0.5:55443"));
        let mut second = bulb("A", "http://10.0.0.5:55443");
        second.insert("power", "off");
        scanner.process_response(second);

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(sink.count(), 1);

        let cached = scanner.cached_capabilities("10.0.0.5").unwrap();
        assert_eq!(cached.get("power"), Some("off"));
        assert_eq!(
            scanner.device(&DeviceId::new("A")).unwrap().get("power"),
            Some("off")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_moved_device_notifies_again() {
        let (scanner, _, sink) = scanner_with(vec![]);

        scanner.process_response(bulb("A", "http://10.0.0.5:55443"));
        scanner.process_response(bulb("A", "http://10.0.0.9:55443"));

        sleep(Duration::from_millis(1500)).await;
        assert_eq!(sink.count(), 2);

        let current = scanner.device(&DeviceId::new("A")).unwrap();
        assert_eq!(current.host().unwrap(), "10.0.0.9");
        assert!(scanner.cached_capabilities("10.0.0.9").is_some());

        let descriptors = sink.0.lock();
        assert!(descriptors.iter().all(|d| d.search_target == "wifi_bulb"));
        assert!(descriptors
            .iter()
            .any(|d| d.host().as_deref() == Some("10.0.0.9")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_notification_is_delayed() {
        let (scanner, _, sink) = scanner_with(vec![]);

        scanner.process_response(bulb("A", "http://10.0.0.5:55443"));
        assert_eq!(sink.count(), 0);

        sleep(Duration::from_millis(500)).await;
        assert_eq!(sink.count(), 0);

        sleep(Duration::from_millis(600)).await;
        assert_eq!(sink.count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_malformed_responses_are_discarded() {
        let (scanner, _, sink) = scanner_with(vec![]);

        let no_id: CapabilityRecord = [("Location", "http://10.0.0.5:55443")].into_iter().collect();
        scanner.process_response(no_id);
        scanner.process_response(bulb("B", "not a url"));
        scanner.process_response(bulb("C", "http://10.0.0.7:55443"));

        sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.count(), 1);
        assert_eq!(scanner.known_devices().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_with_no_responses() {
        let (scanner, state, _) = scanner_with(vec![]);

        let start = Instant::now();
        let devices = scanner.discover().await;

        assert!(devices.is_empty());
        assert_eq!(start.elapsed().as_secs(), 6);
        // One scan at setup plus one per attempt, on both listeners
        assert_eq!(state.multicast_searches(), 8);
    }

    #[tokio::test(start_paused = true)]
    async fn test_discover_returns_responses() {
        let (scanner, state, _) = scanner_with(vec![]);

        let responses = state.clone();
        tokio::spawn(async move {
            while responses.handlers.lock().is_empty() {
                sleep(Duration::from_millis(100)).await;
            }
            responses.deliver(bulb("B", "yeelight://10.0.0.6:55443"));
            responses.deliver(bulb("A", "yeelight://10.0.0.5:55443"));
        });

        let devices = scanner.discover().await;
        let ids: Vec<_> = devices.iter().filter_map(|d| d.id()).collect();
        assert_eq!(ids, vec!["A", "B"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cached_lookup_sends_nothing() {
        let (scanner, state, _) = scanner_with(vec![]);
        scanner.process_response(bulb("A", "http://10.0.0.5:55443"));

        let record = scanner.get_capabilities("10.0.0.5").await.unwrap();
        assert_eq!(record.id(), Some("A"));
        assert!(state.searches.lock().is_empty());
        assert!(!scanner.is_set_up());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unknown_host_times_out() {
        let (scanner, state, _) = scanner_with(vec![]);

        let start = Instant::now();
        let record = scanner.get_capabilities("10.0.0.5").await;
        let elapsed = start.elapsed();

        assert!(record.is_none());
        assert!(elapsed >= DISCOVERY_TIMEOUT);
        assert!(elapsed < DISCOVERY_TIMEOUT + Duration::from_secs(1));
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 0);

        let target: SocketAddr = "10.0.0.5:1982".parse().unwrap();
        assert_eq!(state.unicast_searches(), vec![target, target]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookup_wakes_on_response() {
        let (scanner, state, _) = scanner_with(vec![]);

        let lookup = scanner.clone();
        let task = tokio::spawn(async move { lookup.get_capabilities("10.0.0.5").await });

        sleep(Duration::from_secs(1)).await;
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 1);

        let start = Instant::now();
        state.deliver(bulb("A", "yeelight://10.0.0.5:55443"));
        let record = task.await.unwrap().unwrap();

        assert_eq!(record.id(), Some("A"));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_lookups_all_wake() {
        let (scanner, state, _) = scanner_with(vec![]);

        let first = scanner.clone();
        let second = scanner.clone();
        let a = tokio::spawn(async move { first.get_capabilities("10.0.0.5").await });
        let b = tokio::spawn(async move { second.get_capabilities("10.0.0.5").await });

        sleep(Duration::from_secs(1)).await;
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 2);

        let start = Instant::now();
        state.deliver(bulb("A", "yeelight://10.0.0.5:55443"));

        assert_eq!(a.await.unwrap().unwrap().id(), Some("A"));
        assert_eq!(b.await.unwrap().unwrap().id(), Some("A"));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_during_setup_wakes_lookup() {
        let (scanner, state, _) = scanner_with(vec![]);
        *state.respond_on_start.lock() = Some(bulb("A", "yeelight://10.0.0.5:55443"));

        let start = Instant::now();
        let record = scanner.get_capabilities("10.0.0.5").await.unwrap();

        assert_eq!(record.id(), Some("A"));
        assert!(start.elapsed() < Duration::from_secs(1));
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_bracketed_ipv6_lookup_hits_cache() {
        let (scanner, state, _) = scanner_with(vec![]);
        scanner.process_response(bulb("A", "yeelight://[fe80::1]:55443"));

        let record = scanner.get_capabilities(" [FE80::1] ").await.unwrap();
        assert_eq!(record.id(), Some("A"));
        assert!(state.searches.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_unresolvable_name_stays_within_timeout() {
        let (scanner, state, _) = scanner_with(vec![]);

        let start = Instant::now();
        let record = scanner.get_capabilities("bulb.invalid").await;

        assert!(record.is_none());
        assert!(start.elapsed() < DISCOVERY_TIMEOUT + Duration::from_secs(1));
        assert!(state.unicast_searches().is_empty());
        assert_eq!(scanner.pending_waiters("bulb.invalid"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_scanner_cancels_pending_notifications() {
        let (scanner, _, sink) = scanner_with(vec![]);

        scanner.process_response(bulb("A", "http://10.0.0.5:55443"));
        drop(scanner);

        sleep(Duration::from_secs(2)).await;
        assert_eq!(sink.count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_response_for_other_host_does_not_wake() {
        let (scanner, state, _) = scanner_with(vec![]);

        let lookup = scanner.clone();
        let task = tokio::spawn(async move { lookup.get_capabilities("10.0.0.5").await });

        sleep(Duration::from_secs(1)).await;
        state.deliver(bulb("B", "yeelight://10.0.0.6:55443"));

        assert!(task.await.unwrap().is_none());
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_lookup_removes_waiter() {
        let (scanner, _, _) = scanner_with(vec![]);

        let result = timeout(Duration::from_secs(1), scanner.get_capabilities("10.0.0.5")).await;
        assert!(result.is_err());
        assert_eq!(scanner.pending_waiters("10.0.0.5"), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_all_listeners_failing() {
        let (scanner, state, _) = scanner_with(vec![ETH0, WLAN0]);

        scanner.setup().await;
        assert!(scanner.is_set_up());
        assert!(scanner.active_sources().is_empty());

        assert!(scanner.get_capabilities("10.0.0.5").await.is_none());
        assert!(scanner.get_capabilities("10.0.0.6").await.is_none());
        assert!(state.searches.lock().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_periodic_rescan() {
        let (scanner, state, _) = scanner_with(vec![]);
        scanner.setup().await;
        assert_eq!(state.multicast_searches(), 2);

        sleep(DISCOVERY_INTERVAL + Duration::from_millis(100)).await;
        assert_eq!(state.multicast_searches(), 4);

        sleep(DISCOVERY_INTERVAL).await;
        assert_eq!(state.multicast_searches(), 6);
    }
}
