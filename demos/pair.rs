//! Discover bridges on the local network, pair with them and list their lights
//!
//! Run with `cargo run --example pair`, then press the link button on the
//! bridge within a few seconds. Paired bridges are kept in `huelink.json`.

use huelink::{Config, DiscoveryState, HueController, JsonFileStore, LightEvent, Reachability};
use std::sync::Arc;
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "huelink=info".into()),
        )
        .init();

    let store = Arc::new(JsonFileStore::new("huelink.json"));
    let controller = HueController::connect(Config::default(), store)?;
    controller.start().await?;
    println!("{} bridge(s) already paired", controller.bridges().len());

    let mut state = controller.discovery().subscribe_state();
    let mut lights = controller.lights().subscribe();
    controller
        .discovery()
        .handle_reachability(Reachability::Wifi)
        .await;

    let deadline = tokio::time::sleep(Duration::from_secs(30));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            changed = state.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *state.borrow_and_update();
                println!("Discovery: {:?}", current);
                for bridge in controller.discovery().discovered() {
                    println!("  {}", bridge.display_name);
                }
                if let DiscoveryState::Error(e) = current {
                    println!("Stopped: {}", e);
                    break;
                }
            }
            event = lights.recv() => {
                if let Ok(LightEvent::Refreshed { bridge_ip, count }) = event {
                    println!("{} light(s) on {}", count, bridge_ip);
                }
            }
        }
    }

    for entry in controller.enabled().view() {
        println!(
            "{} [{}] on={} enabled={}",
            entry.light.name, entry.light.unique_id, entry.light.state.on, entry.enabled
        );
    }

    Ok(())
}
