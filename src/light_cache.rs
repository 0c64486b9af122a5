use crate::config::Config;
use crate::error::Result;
use crate::lock;
use crate::protocol::decode_lights;
use crate::subscription::{LightEvent, LightReceiver};
use crate::transport::Transport;
use crate::types::{Bridge, Light, LightState};
use futures_util::future::{join_all, BoxFuture};
use reqwest::Method;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;

const EVENT_CAPACITY: usize = 100;

/// In-memory registry of every light fetched from the paired bridges
///
/// Lights are keyed by their stable `uniqueid`; a refresh overwrites known
/// entries in place and appends new ones. Cloning yields another handle to the
/// same cache.
///
/// # Example
///
/// ```no_run
/// use huelink::{Bridge, Config, HttpTransport, LightCache};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let config = Config::default();
///     let transport = Arc::new(HttpTransport::from_config(&config)?);
///     let cache = LightCache::new(transport, &config);
///
///     cache.refresh_from_bridge(&Bridge::new("192.168.1.20", "my-token")).await?;
///     for light in cache.lights() {
///         println!("{} is {}", light.name, if light.state.on { "on" } else { "off" });
///     }
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct LightCache {
    inner: Arc<Inner>,
}

struct Inner {
    transport: Arc<dyn Transport>,
    retry_delay: Duration,
    lights: Mutex<Vec<Light>>,
    /// Bumped by `clear`; fetches started under an older value are discarded
    generation: AtomicU64,
    retry: Mutex<RetrySlot>,
    events: broadcast::Sender<LightEvent>,
}

/// The single pending light-fetch retry
#[derive(Default)]
struct RetrySlot {
    token: u64,
    handle: Option<JoinHandle<()>>,
    bridges: Vec<Bridge>,
}

impl LightCache {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                retry_delay: config.light_retry_delay,
                lights: Mutex::new(Vec::new()),
                generation: AtomicU64::new(0),
                retry: Mutex::new(RetrySlot::default()),
                events,
            }),
        }
    }

    /// Subscribe to "lights changed" notifications
    pub fn subscribe(&self) -> LightReceiver {
        LightReceiver::new(self.inner.events.subscribe())
    }

    /// Snapshot of all cached lights, in insertion order
    pub fn lights(&self) -> Vec<Light> {
        lock(&self.inner.lights).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.inner.lights).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.inner.lights).is_empty()
    }

    /// Position of the first light with bridge-local `id`
    ///
    /// `None` is an ordinary outcome: the light may not have been fetched yet.
    pub fn get(&self, id: &str) -> Option<usize> {
        lock(&self.inner.lights).iter().position(|l| l.id == id)
    }

    /// Cached light with the given unique id
    pub fn find(&self, unique_id: &str) -> Option<Light> {
        lock(&self.inner.lights)
            .iter()
            .find(|l| l.unique_id == unique_id)
            .cloned()
    }

    /// Whether a failed fetch is waiting to be retried
    pub fn has_pending_retry(&self) -> bool {
        lock(&self.inner.retry).handle.is_some()
    }

    /// Fetch the lights of one bridge and merge them into the cache
    ///
    /// Returns the number of lights decoded. On failure a single retry is
    /// scheduled after the configured delay and the error is returned.
    ///
    /// The fetch belongs to the cache contents at the time of this call: if
    /// `clear` runs before it completes, the result is dropped and `Ok(0)`
    /// is returned.
    pub fn refresh_from_bridge(&self, bridge: &Bridge) -> BoxFuture<'static, Result<usize>> {
        self.fetch(bridge.clone(), self.generation(), true)
    }

    /// Refresh every bridge concurrently; returns how many succeeded
    pub async fn refresh_all(&self, bridges: &[Bridge]) -> usize {
        let generation = self.generation();
        let results =
            join_all(bridges.iter().map(|b| self.fetch(b.clone(), generation, true))).await;
        results.iter().filter(|r| r.is_ok()).count()
    }

    /// Merge freshly decoded lights from `bridge_ip`
    ///
    /// Known unique ids are overwritten in place, unknown ones appended. Emits
    /// exactly one notification.
    pub fn merge(&self, bridge_ip: &str, fresh: Vec<Light>) {
        self.merge_at(None, bridge_ip, fresh);
    }

    /// Merge unless the cache was cleared after `generation`
    fn merge_at(&self, generation: Option<u64>, bridge_ip: &str, fresh: Vec<Light>) -> bool {
        let count = fresh.len();
        let total = {
            let mut lights = lock(&self.inner.lights);
            if generation.is_some_and(|g| g != self.generation()) {
                return false;
            }
            for light in fresh {
                match lights.iter_mut().find(|l| l.unique_id == light.unique_id) {
                    Some(existing) => *existing = light,
                    None => lights.push(light),
                }
            }
            lights.len()
        };

        tracing::info!("Refreshed light cache from {}, {} in memory", bridge_ip, total);
        let _ = self.inner.events.send(LightEvent::Refreshed {
            bridge_ip: bridge_ip.to_string(),
            count,
        });
        true
    }

    /// Replace the cached state of one light after a successful command
    pub(crate) fn apply_state(&self, unique_id: &str, state: LightState) -> bool {
        let applied = {
            let mut lights = lock(&self.inner.lights);
            match lights.iter_mut().find(|l| l.unique_id == unique_id) {
                Some(light) => {
                    light.state = state;
                    true
                }
                None => false,
            }
        };

        let _ = self
            .inner
            .events
            .send(LightEvent::CommandApplied(unique_id.to_string()));
        applied
    }

    /// Drop every cached light and cancel the pending retry
    ///
    /// Fetches still in flight are discarded when they complete.
    pub fn clear(&self) {
        {
            let mut lights = lock(&self.inner.lights);
            self.inner.generation.fetch_add(1, Ordering::SeqCst);
            lights.clear();
        }
        {
            let mut slot = lock(&self.inner.retry);
            if let Some(handle) = slot.handle.take() {
                handle.abort();
            }
            slot.bridges.clear();
        }

        tracing::info!("Light cache cleared");
        let _ = self.inner.events.send(LightEvent::Cleared);
    }

    fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::SeqCst)
    }

    fn fetch(
        &self,
        bridge: Bridge,
        generation: u64,
        allow_retry: bool,
    ) -> BoxFuture<'static, Result<usize>> {
        let cache = self.clone();
        Box::pin(async move {
            let result = cache
                .inner
                .transport
                .request(Method::GET, &bridge.lights_url(), None)
                .await
                .and_then(|value| decode_lights(value, &bridge));

            match result {
                Ok(lights) => {
                    let count = lights.len();
                    if !cache.merge_at(Some(generation), &bridge.ip, lights) {
                        tracing::debug!("Discarding light list from {} fetched before clear", bridge.ip);
                        return Ok(0);
                    }
                    Ok(count)
                }
                Err(_) if cache.generation() != generation => {
                    tracing::debug!("Ignoring failed fetch from {} started before clear", bridge.ip);
                    Ok(0)
                }
                Err(e) => {
                    tracing::warn!("Failed to fetch lights from {}: {}", bridge.ip, e);
                    if allow_retry {
                        cache.schedule_retry(bridge, generation);
                    }
                    Err(e)
                }
            }
        })
    }

    /// Replace the pending retry with one that also covers `bridge`
    fn schedule_retry(&self, bridge: Bridge, generation: u64) {
        let mut slot = lock(&self.inner.retry);
        // `clear` bumps the generation before it empties this slot
        if self.generation() != generation {
            return;
        }
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
        if !slot.bridges.contains(&bridge) {
            slot.bridges.push(bridge);
        }
        slot.token += 1;

        let token = slot.token;
        let delay = self.inner.retry_delay;
        let cache = self.clone();

        tracing::info!(
            "Retrying light fetch for {} bridge(s) in {:?}",
            slot.bridges.len(),
            delay
        );

        slot.handle = Some(tokio::spawn(async move {
            sleep(delay).await;

            let bridges = {
                let mut slot = lock(&cache.inner.retry);
                if slot.token != token {
                    return;
                }
                slot.handle = None;
                std::mem::take(&mut slot.bridges)
            };

            join_all(bridges.into_iter().map(|b| cache.fetch(b, generation, false))).await;
        }));
    }
}
