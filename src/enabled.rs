use crate::error::Result;
use crate::light_cache::LightCache;
use crate::lock;
use crate::store::{KeyValueStore, ENABLED_LIGHTS_KEY};
use crate::types::{EnabledLightView, UniqueId};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;

/// The lights the user chose to show, joined against the light cache
#[derive(Clone)]
pub struct EnabledLightSet {
    store: Arc<dyn KeyValueStore>,
    cache: LightCache,
    view: Arc<Mutex<Vec<EnabledLightView>>>,
}

impl EnabledLightSet {
    pub fn new(store: Arc<dyn KeyValueStore>, cache: LightCache) -> Self {
        Self {
            store,
            cache,
            view: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Persisted unique ids of the enabled lights
    pub fn enabled_ids(&self) -> Result<Vec<UniqueId>> {
        match self.store.load(ENABLED_LIGHTS_KEY)? {
            Some(value) => Ok(serde_json::from_value(value)?),
            None => Ok(Vec::new()),
        }
    }

    /// Last computed view, in light cache order
    pub fn view(&self) -> Vec<EnabledLightView> {
        lock(&self.view).clone()
    }

    /// Rebuild the view from the current cache contents
    pub fn recompute(&self) -> Result<()> {
        let enabled = self.enabled_ids()?;
        let view: Vec<EnabledLightView> = self
            .cache
            .lights()
            .into_iter()
            .map(|light| EnabledLightView {
                enabled: enabled.contains(&light.unique_id),
                light,
            })
            .collect();

        tracing::debug!("Enabled light view rebuilt with {} light(s)", view.len());
        *lock(&self.view) = view;
        Ok(())
    }

    /// Show or hide a light
    pub fn set_enabled(&self, unique_id: &str, enabled: bool) -> Result<()> {
        let mut ids = self.enabled_ids()?;
        ids.retain(|id| id != unique_id);
        if enabled {
            ids.push(unique_id.to_string());
        }
        self.store
            .save(ENABLED_LIGHTS_KEY, serde_json::to_value(&ids)?)?;

        for entry in lock(&self.view).iter_mut() {
            if entry.light.unique_id == unique_id {
                entry.enabled = enabled;
            }
        }
        Ok(())
    }

    /// Flip a light's visibility; returns the new flag
    pub fn toggle(&self, unique_id: &str) -> Result<bool> {
        let enabled = !self.enabled_ids()?.iter().any(|id| id == unique_id);
        self.set_enabled(unique_id, enabled)?;
        Ok(enabled)
    }

    /// Empty the view (persisted ids are owned by `BridgeStore::clear_all`)
    pub fn clear(&self) {
        lock(&self.view).clear();
    }

    /// Recompute the view on every light cache notification
    pub fn spawn_auto_refresh(&self) -> JoinHandle<()> {
        let set = self.clone();
        let mut rx = self.cache.subscribe();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    // One rebuild covers everything queued behind this event
                    Ok(_) => rx.drain(),
                    Err(crate::error::HueError::ChannelError(e)) => {
                        tracing::debug!("Enabled light view {}, recomputing", e);
                    }
                    Err(_) => break,
                }
                if let Err(e) = set.recompute() {
                    tracing::warn!("Failed to rebuild enabled light view: {}", e);
                }
            }
            tracing::debug!("Light cache closed, enabled light refresh stopped");
        })
    }
}
