use crate::bridge_store::BridgeStore;
use crate::config::Config;
use crate::enabled::EnabledLightSet;
use crate::error::{HueError, PairingError, Result};
use crate::light_cache::LightCache;
use crate::lock;
use crate::protocol::{parse_discovery, parse_pairing_response, PairingReply, PairingRequest};
use crate::transport::Transport;
use crate::types::{DiscoveredBridge, Reachability};
use futures_util::future::BoxFuture;
use futures_util::stream::{FuturesUnordered, StreamExt};
use reqwest::Method;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Where the discovery and pairing flow currently stands
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DiscoveryState {
    #[default]
    Idle,
    CheckingNetwork,
    Querying,
    Reconciling,
    /// Pairing requests are in flight or a retry is pending
    Pairing,
    /// Every discovered bridge is paired, ignored, or gave up
    Settled,
    Error(PairingError),
}

/// Drives bridge discovery and pairing
///
/// The coordinator queries the discovery service, cross-references the result
/// with the paired bridges, and keeps asking unpaired bridges for a username
/// until their link button is pressed. Cloning yields another handle to the
/// same coordinator.
///
/// # Example
///
/// ```no_run
/// use huelink::{
///     BridgeStore, Config, DiscoveryCoordinator, EnabledLightSet, HttpTransport, LightCache,
///     MemoryStore, Reachability,
/// };
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let transport = Arc::new(HttpTransport::from_config(&config)?);
///     let store = Arc::new(MemoryStore::new());
///
///     let bridges = BridgeStore::new(store.clone())?;
///     let lights = LightCache::new(transport.clone(), &config);
///     let enabled = EnabledLightSet::new(store, lights.clone());
///     let discovery = DiscoveryCoordinator::new(config, transport, bridges, lights, enabled);
///
///     discovery.handle_reachability(Reachability::Wifi).await;
///     for bridge in discovery.discovered() {
///         println!("{}", bridge.display_name);
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct DiscoveryCoordinator {
    inner: Arc<Inner>,
}

struct Inner {
    config: Config,
    transport: Arc<dyn Transport>,
    bridges: BridgeStore,
    lights: LightCache,
    enabled: EnabledLightSet,
    discovered: Mutex<Vec<DiscoveredBridge>>,
    state_tx: watch::Sender<DiscoveryState>,
    retry: Mutex<RetrySlot>,
    /// Current session number, bumped by rescan, clear-all and network loss.
    /// Every mutation made on behalf of a session happens under this lock.
    session: Mutex<u64>,
}

/// The pending pairing pass
#[derive(Default)]
struct RetrySlot {
    token: u64,
    handle: Option<JoinHandle<()>>,
}

/// Result of one pairing request, before it is applied
enum PairingOutcome {
    Reply(PairingReply),
    Unreachable(HueError),
    Malformed(HueError),
}

/// What a pairing pass has seen so far
#[derive(Default)]
struct PassSummary {
    retry: bool,
    cancelled: bool,
    failed: bool,
}

impl DiscoveryCoordinator {
    pub fn new(
        config: Config,
        transport: Arc<dyn Transport>,
        bridges: BridgeStore,
        lights: LightCache,
        enabled: EnabledLightSet,
    ) -> Self {
        let (state_tx, _) = watch::channel(DiscoveryState::Idle);
        Self {
            inner: Arc::new(Inner {
                config,
                transport,
                bridges,
                lights,
                enabled,
                discovered: Mutex::new(Vec::new()),
                state_tx,
                retry: Mutex::new(RetrySlot::default()),
                session: Mutex::new(0),
            }),
        }
    }

    /// Current state
    pub fn state(&self) -> DiscoveryState {
        *self.inner.state_tx.borrow()
    }

    /// Watch state transitions
    pub fn subscribe_state(&self) -> watch::Receiver<DiscoveryState> {
        self.inner.state_tx.subscribe()
    }

    /// Bridges found by the latest query
    pub fn discovered(&self) -> Vec<DiscoveredBridge> {
        lock(&self.inner.discovered).clone()
    }

    /// Whether a pairing pass is scheduled
    pub fn has_pending_retry(&self) -> bool {
        lock(&self.inner.retry).handle.is_some()
    }

    /// React to a network interface change
    ///
    /// Off Wi-Fi and Ethernet the flow halts in `Error(NotOnNetwork)`;
    /// otherwise a fresh discovery session starts.
    pub async fn handle_reachability(&self, reachability: Reachability) {
        self.set_state(DiscoveryState::CheckingNetwork);

        if !reachability.is_local_network() {
            tracing::warn!("Not on a local network ({:?}), discovery halted", reachability);
            let _session = self.next_session();
            self.cancel_retry();
            self.set_state(DiscoveryState::Error(PairingError::NotOnNetwork));
            return;
        }

        self.rescan().await;
    }

    /// Run `handle_reachability` for the current value and every change
    pub fn watch_reachability(&self, mut rx: watch::Receiver<Reachability>) -> JoinHandle<()> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            loop {
                let reachability = *rx.borrow_and_update();
                coordinator.handle_reachability(reachability).await;
                if rx.changed().await.is_err() {
                    tracing::debug!("Reachability observer gone, watcher stopped");
                    break;
                }
            }
        })
    }

    /// Cancel any pending pairing pass and query the discovery service again
    pub async fn rescan(&self) {
        let generation = {
            let session = self.next_session();
            self.cancel_retry();
            self.set_state(DiscoveryState::Querying);
            *session
        };
        self.query(generation).await;
    }

    /// Forget every bridge, light and preference, then rediscover
    pub async fn clear_all(&self) -> Result<()> {
        let cleared = {
            let _session = self.next_session();
            self.cancel_retry();
            let cleared = self.inner.bridges.clear_all();
            self.inner.lights.clear();
            lock(&self.inner.discovered).clear();
            self.inner.enabled.clear();
            cleared
        };

        self.rescan().await;
        cleared
    }

    async fn query(&self, generation: u64) {
        tracing::info!("Querying discovery service: {}", self.inner.config.discovery_url);

        let result = self
            .inner
            .transport
            .request(Method::GET, &self.inner.config.discovery_url, None)
            .await
            .and_then(parse_discovery);

        let found = self.in_session(generation, || match result {
            Err(e) => {
                tracing::error!("Discovery failed: {}", e);
                self.set_state(DiscoveryState::Error(PairingError::NetworkError));
                false
            }
            Ok(ips) if ips.is_empty() => {
                tracing::warn!("Discovery returned no bridges");
                lock(&self.inner.discovered).clear();
                self.set_state(DiscoveryState::Error(PairingError::NoneFound));
                false
            }
            Ok(ips) => {
                tracing::info!("Found {} bridge(s)", ips.len());
                self.reconcile(ips);
                true
            }
        });

        match found {
            Some(true) => self.attempt_pairing(generation).await,
            Some(false) => {}
            None => tracing::debug!("Discarding discovery result from a superseded session"),
        }
    }

    /// Replace the discovered list, marking bridges we already hold a username for
    fn reconcile(&self, ips: Vec<String>) {
        self.set_state(DiscoveryState::Reconciling);

        let mut discovered: Vec<DiscoveredBridge> = Vec::with_capacity(ips.len());
        for ip in ips {
            if discovered.iter().any(|b| b.ip == ip) {
                tracing::debug!("Bridge {} listed twice by discovery", ip);
                continue;
            }
            let bridge = if self.inner.bridges.contains(&ip) {
                DiscoveredBridge::paired(ip)
            } else {
                DiscoveredBridge::unpaired(ip)
            };
            discovered.push(bridge);
        }

        *lock(&self.inner.discovered) = discovered;
    }

    /// One pairing pass over every unpaired, non-ignored bridge
    fn attempt_pairing(&self, generation: u64) -> BoxFuture<'static, ()> {
        let coordinator = self.clone();
        Box::pin(async move { coordinator.pairing_pass(generation).await })
    }

    async fn pairing_pass(&self, generation: u64) {
        let candidates = self.in_session(generation, || {
            let candidates: Vec<String> = lock(&self.inner.discovered)
                .iter()
                .filter(|b| !b.paired && !b.ignore)
                .map(|b| b.ip.clone())
                .collect();

            if candidates.is_empty() {
                self.set_state(DiscoveryState::Settled);
            } else {
                self.set_state(DiscoveryState::Pairing);
            }
            candidates
        });
        let candidates = match candidates {
            Some(candidates) if !candidates.is_empty() => candidates,
            _ => return,
        };

        let body = serde_json::to_value(PairingRequest {
            devicetype: self.inner.config.device_type(),
        })
        .ok();

        let mut pending: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|ip| {
                let transport = self.inner.transport.clone();
                let body = body.clone();
                async move {
                    let url = format!("http://{}/api", ip);
                    tracing::debug!("Requesting username from {}", url);
                    let outcome = match transport.request(Method::POST, &url, body).await {
                        Ok(value) => match parse_pairing_response(value) {
                            Ok(reply) => PairingOutcome::Reply(reply),
                            Err(e) => PairingOutcome::Malformed(e),
                        },
                        Err(e) if e.is_transport() => PairingOutcome::Unreachable(e),
                        Err(e) => PairingOutcome::Malformed(e),
                    };
                    (ip, outcome)
                }
            })
            .collect();

        // Each bridge is handled as soon as it answers
        let mut pass = PassSummary::default();
        while let Some((ip, outcome)) = pending.next().await {
            let applied = self.in_session(generation, || {
                self.apply_outcome(generation, &ip, outcome, &mut pass)
            });
            if applied.is_none() {
                tracing::debug!("Discarding pairing results from a superseded session");
                return;
            }
        }

        self.in_session(generation, || {
            if !pass.failed && !pass.retry {
                self.set_state(DiscoveryState::Settled);
            }
        });
    }

    /// Apply one bridge's answer; the caller holds the session lock
    fn apply_outcome(
        &self,
        generation: u64,
        ip: &str,
        outcome: PairingOutcome,
        pass: &mut PassSummary,
    ) {
        match outcome {
            PairingOutcome::Reply(PairingReply::LinkButtonNotPressed) => {
                tracing::info!("Waiting for link button on {}", ip);
                self.update_discovered(ip, DiscoveredBridge::mark_awaiting_button);
                pass.retry = true;
                if !pass.cancelled {
                    self.schedule_retry(generation);
                }
            }
            PairingOutcome::Reply(PairingReply::Rejected(description)) => {
                tracing::warn!("Bridge {} refused pairing: {}", ip, description);
            }
            PairingOutcome::Reply(PairingReply::Paired(username)) => {
                self.paired(ip, &username);
            }
            PairingOutcome::Reply(PairingReply::MalformedSuccess) => {
                tracing::error!("Bridge {} reported success without a username", ip);
                pass.cancelled = true;
                pass.failed = true;
                self.cancel_retry();
                self.set_state(DiscoveryState::Error(PairingError::BridgeError));
            }
            PairingOutcome::Malformed(e) => {
                tracing::error!("Unexpected pairing response from {}: {}", ip, e);
                pass.failed = true;
                self.set_state(DiscoveryState::Error(PairingError::BridgeError));
            }
            PairingOutcome::Unreachable(e) => {
                tracing::warn!("{} ({}): {}", PairingError::BridgeConnectionError, ip, e);
                lock(&self.inner.discovered).retain(|b| b.ip != ip);
            }
        }
    }

    fn paired(&self, ip: &str, username: &str) {
        tracing::info!("Paired with bridge {}", ip);
        if let Err(e) = self.inner.bridges.add(ip, username) {
            tracing::error!("Failed to store bridge {}: {}", ip, e);
        }
        self.update_discovered(ip, DiscoveredBridge::mark_paired);

        let Some(bridge) = self.inner.bridges.get(ip) else {
            return;
        };
        // Bound to the light cache's current generation before the task starts
        let refresh = self.inner.lights.refresh_from_bridge(&bridge);
        tokio::spawn(async move {
            let _ = refresh.await;
        });
    }

    fn update_discovered(&self, ip: &str, update: impl FnOnce(&mut DiscoveredBridge)) {
        if let Some(bridge) = lock(&self.inner.discovered).iter_mut().find(|b| b.ip == ip) {
            update(bridge);
        }
    }

    /// Replace any pending pairing pass with a new one
    fn schedule_retry(&self, generation: u64) {
        let delay = self.inner.config.pairing_retry_delay;
        let coordinator = self.clone();

        let mut slot = lock(&self.inner.retry);
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        slot.token += 1;
        let token = slot.token;

        tracing::debug!("Retrying pairing in {:?}", delay);
        slot.handle = Some(tokio::spawn(async move {
            sleep(delay).await;
            let due = coordinator.in_session(generation, || {
                let mut slot = lock(&coordinator.inner.retry);
                if slot.token != token {
                    return false;
                }
                slot.handle = None;
                true
            });
            if due == Some(true) {
                coordinator.attempt_pairing(generation).await;
            }
        }));
    }

    fn cancel_retry(&self) {
        if let Some(handle) = lock(&self.inner.retry).handle.take() {
            handle.abort();
        }
    }

    /// Start a new session and hold it while the caller resets state
    fn next_session(&self) -> MutexGuard<'_, u64> {
        let mut session = lock(&self.inner.session);
        *session += 1;
        session
    }

    /// Run `apply` under the session lock, unless `generation` was superseded
    fn in_session<R>(&self, generation: u64, apply: impl FnOnce() -> R) -> Option<R> {
        let session = lock(&self.inner.session);
        if *session != generation {
            return None;
        }
        Some(apply())
    }

    fn set_state(&self, state: DiscoveryState) {
        tracing::debug!("Discovery state: {:?}", state);
        self.inner.state_tx.send_replace(state);
    }
}
