//! Rust library for discovering, pairing with and controlling Philips Hue bridges
//!
//! This library provides an async API on top of the Hue bridge REST API. It
//! supports:
//!
//! - Bridge discovery via the public Hue discovery service
//! - Pairing through the bridge link button, with automatic re-polling
//! - A persisted list of paired bridges
//! - An in-memory light cache merged by stable light identity
//! - On/off, brightness, color, color-loop and restore commands
//! - Change notifications for presentation layers
//!
//! # Quick Start
//!
//! ```no_run
//! use huelink::{Config, HueController, MemoryStore, Reachability};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let controller = HueController::connect(Config::default(), Arc::new(MemoryStore::new()))?;
//!     controller.start().await?;
//!
//!     // Query the discovery service and start pairing
//!     controller.discovery().handle_reachability(Reachability::Wifi).await;
//!     for bridge in controller.discovery().discovered() {
//!         println!("{}", bridge.display_name);
//!     }
//!
//!     // React to light changes
//!     let mut updates = controller.lights().subscribe();
//!     if let Ok(event) = updates.recv().await {
//!         println!("Lights changed: {:?}", event);
//!     }
//!
//!     for light in controller.lights().lights() {
//!         controller.commands().set_brightness(&light, 128).await?;
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - **Discovery**: discovery query, reconciliation and the pairing state machine
//! - **BridgeStore**: durable list of paired bridges
//! - **LightCache**: light registry and per-bridge refresh with a single retry
//! - **CommandDispatcher**: light state changes with response validation and feedback
//! - **EnabledLightSet**: user-selected visible lights joined against the cache
//! - **Transport / KeyValueStore**: HTTP and persistence seams
//! - **Protocol**: JSON wire structures

mod bridge_store;
mod client;
mod color;
mod command;
mod config;
mod discovery;
mod enabled;
mod error;
mod light_cache;
mod protocol;
mod store;
mod subscription;
mod transport;
mod types;

// Public exports
pub use bridge_store::BridgeStore;
pub use client::HueController;
pub use color::{HueColor, Hsv, Rgb};
pub use command::{CommandDispatcher, CommandKind, Feedback, FeedbackReceiver, MAX_BRIGHTNESS};
pub use config::{Config, DISCOVERY_URL};
pub use discovery::{DiscoveryCoordinator, DiscoveryState};
pub use enabled::EnabledLightSet;
pub use error::{HueError, PairingError, Result};
pub use light_cache::LightCache;
pub use protocol::{EffectCommand, LightCommand, PairingReply};
pub use reqwest::Method;
pub use store::{JsonFileStore, KeyValueStore, MemoryStore, ENABLED_LIGHTS_KEY, PAIRED_BRIDGES_KEY};
pub use subscription::{EventReceiver, LightEvent, LightReceiver};
pub use transport::{HttpTransport, Transport};
pub use types::{
    Bridge, DiscoveredBridge, Effect, EnabledLightView, Light, LightId, LightState, Reachability,
    UniqueId,
};

/// Lock a mutex, recovering the data if a holder panicked
pub(crate) fn lock<T>(mutex: &std::sync::Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
}
