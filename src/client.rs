use crate::bridge_store::BridgeStore;
use crate::command::CommandDispatcher;
use crate::config::Config;
use crate::discovery::DiscoveryCoordinator;
use crate::enabled::EnabledLightSet;
use crate::error::Result;
use crate::light_cache::LightCache;
use crate::lock;
use crate::store::KeyValueStore;
use crate::transport::{HttpTransport, Transport};
use crate::types::Reachability;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Entry point wiring every service together
///
/// Construct one controller at startup and hand its services to the
/// presentation layer. All services share state with the controller.
///
/// # Example
///
/// ```no_run
/// use huelink::{Config, HueController, JsonFileStore, Reachability};
/// use std::sync::Arc;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = Arc::new(JsonFileStore::new("huelink.json"));
///     let controller = HueController::connect(Config::default(), store)?;
///     controller.start().await?;
///
///     let (_reachability_tx, reachability_rx) = tokio::sync::watch::channel(Reachability::Wifi);
///     let _watcher = controller.watch_reachability(reachability_rx);
///
///     tokio::time::sleep(std::time::Duration::from_secs(5)).await;
///     for light in controller.lights().lights() {
///         controller.commands().toggle(&light).await?;
///     }
///     Ok(())
/// }
/// ```
pub struct HueController {
    bridges: BridgeStore,
    lights: LightCache,
    commands: CommandDispatcher,
    enabled: EnabledLightSet,
    discovery: DiscoveryCoordinator,
    auto_refresh: Mutex<Option<JoinHandle<()>>>,
}

impl HueController {
    /// Build a controller that talks HTTP through `reqwest`
    pub fn connect(config: Config, store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::from_config(&config)?);
        Self::with_transport(config, transport, store)
    }

    /// Build a controller over any transport
    pub fn with_transport(
        config: Config,
        transport: Arc<dyn Transport>,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self> {
        let bridges = BridgeStore::new(store.clone())?;
        let lights = LightCache::new(transport.clone(), &config);
        let commands = CommandDispatcher::new(transport.clone(), lights.clone());
        let enabled = EnabledLightSet::new(store, lights.clone());
        let discovery = DiscoveryCoordinator::new(
            config,
            transport,
            bridges.clone(),
            lights.clone(),
            enabled.clone(),
        );

        Ok(Self {
            bridges,
            lights,
            commands,
            enabled,
            discovery,
            auto_refresh: Mutex::new(None),
        })
    }

    /// Reload paired bridges, fetch their lights and keep the enabled view current
    ///
    /// Calling `start` again restarts the enabled view refresh task.
    pub async fn start(&self) -> Result<()> {
        self.bridges.reload()?;

        let handle = self.enabled.spawn_auto_refresh();
        if let Some(previous) = lock(&self.auto_refresh).replace(handle) {
            previous.abort();
        }

        let bridges = self.bridges.bridges();
        let refreshed = self.lights.refresh_all(&bridges).await;
        tracing::info!("Fetched lights from {}/{} paired bridge(s)", refreshed, bridges.len());

        self.enabled.recompute()
    }

    /// Drive discovery from a reachability observer
    pub fn watch_reachability(&self, rx: watch::Receiver<Reachability>) -> JoinHandle<()> {
        self.discovery.watch_reachability(rx)
    }

    pub fn bridges(&self) -> &BridgeStore {
        &self.bridges
    }

    pub fn lights(&self) -> &LightCache {
        &self.lights
    }

    pub fn commands(&self) -> &CommandDispatcher {
        &self.commands
    }

    pub fn enabled(&self) -> &EnabledLightSet {
        &self.enabled
    }

    pub fn discovery(&self) -> &DiscoveryCoordinator {
        &self.discovery
    }
}

impl Drop for HueController {
    fn drop(&mut self) {
        if let Some(handle) = lock(&self.auto_refresh).take() {
            handle.abort();
        }
    }
}
