use crate::error::Result;
use crate::lock;
use crate::store::{KeyValueStore, ENABLED_LIGHTS_KEY, PAIRED_BRIDGES_KEY};
use crate::types::Bridge;
use std::sync::{Arc, Mutex};

/// Durable list of paired bridges, unique by ip
///
/// Cloning yields another handle to the same list.
#[derive(Clone)]
pub struct BridgeStore {
    store: Arc<dyn KeyValueStore>,
    bridges: Arc<Mutex<Vec<Bridge>>>,
}

impl BridgeStore {
    /// Create a store and load whatever is persisted
    pub fn new(store: Arc<dyn KeyValueStore>) -> Result<Self> {
        let bridge_store = Self {
            store,
            bridges: Arc::new(Mutex::new(Vec::new())),
        };
        bridge_store.reload()?;
        Ok(bridge_store)
    }

    /// Snapshot of the paired bridges
    pub fn bridges(&self) -> Vec<Bridge> {
        lock(&self.bridges).clone()
    }

    pub fn get(&self, ip: &str) -> Option<Bridge> {
        lock(&self.bridges).iter().find(|b| b.ip == ip).cloned()
    }

    pub fn contains(&self, ip: &str) -> bool {
        lock(&self.bridges).iter().any(|b| b.ip == ip)
    }

    pub fn len(&self) -> usize {
        lock(&self.bridges).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.bridges).is_empty()
    }

    /// Persist a newly paired bridge
    ///
    /// Returns `Ok(false)` without touching storage when `ip` is already paired.
    pub fn add(&self, ip: &str, username: &str) -> Result<bool> {
        let mut persisted = self.load_persisted()?;
        if persisted.iter().any(|b| b.ip == ip) {
            tracing::debug!("Bridge {} already paired, ignoring", ip);
            return Ok(false);
        }

        persisted.push(Bridge::new(ip, username));
        self.store
            .save(PAIRED_BRIDGES_KEY, serde_json::to_value(&persisted)?)?;
        tracing::info!("Paired bridge {} stored", ip);

        self.reload()?;
        Ok(true)
    }

    /// Replace the in-memory list with the persisted one
    pub fn reload(&self) -> Result<()> {
        let persisted = self.load_persisted()?;

        let mut fresh: Vec<Bridge> = Vec::with_capacity(persisted.len());
        for bridge in persisted {
            if fresh.iter().any(|b| b.ip == bridge.ip) {
                tracing::warn!("Dropping duplicate stored bridge {}", bridge.ip);
                continue;
            }
            fresh.push(bridge);
        }

        tracing::debug!("Loaded {} paired bridge(s)", fresh.len());
        *lock(&self.bridges) = fresh;
        Ok(())
    }

    /// Erase persisted bridges and enabled lights, and empty the list
    ///
    /// The in-memory list is emptied even when storage fails; the first
    /// storage error is returned.
    pub fn clear_all(&self) -> Result<()> {
        lock(&self.bridges).clear();
        let bridges = self.store.remove(PAIRED_BRIDGES_KEY);
        let enabled = self.store.remove(ENABLED_LIGHTS_KEY);
        tracing::info!("Cleared paired bridges");
        bridges.and(enabled)
    }

    fn load_persisted(&self) -> Result<Vec<Bridge>> {
        match self.store.load(PAIRED_BRIDGES_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }
}
