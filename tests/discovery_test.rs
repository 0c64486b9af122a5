mod common;

use common::{init_tracing, lights_payload, lights_url, pairing_url, MockTransport, DISCOVERY};
use huelink::{
    Bridge, Config, DiscoveryState, HueController, KeyValueStore, MemoryStore, Method,
    PairingError, Reachability, Result, ENABLED_LIGHTS_KEY, PAIRED_BRIDGES_KEY,
};
use serde_json::{json, Value};
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::sleep;

const IP: &str = "10.0.0.5";

fn link_button_error() -> serde_json::Value {
    json!([{"error": {"type": 101, "address": "", "description": "link button not pressed"}}])
}

fn setup() -> (Arc<MockTransport>, Arc<MemoryStore>, HueController) {
    init_tracing();
    let transport = MockTransport::new();
    let store = Arc::new(MemoryStore::new());
    let config = Config::default()
        .with_discovery_url(DISCOVERY)
        .with_device_name("test-rig");
    let controller =
        HueController::with_transport(config, transport.clone(), store.clone()).unwrap();
    (transport, store, controller)
}

#[tokio::test(start_paused = true)]
async fn pairs_after_link_button_press() {
    let (transport, _store, controller) = setup();
    let discovery = controller.discovery();

    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(Method::POST, &pairing_url(IP), link_button_error());
    transport.reply(
        Method::POST,
        &pairing_url(IP),
        json!([{"success": {"username": "newuser"}}]),
    );
    transport.reply(
        Method::GET,
        &lights_url(IP, "newuser"),
        lights_payload(&[("1", "aa", true)]),
    );

    discovery.handle_reachability(Reachability::Wifi).await;

    assert_eq!(discovery.state(), DiscoveryState::Pairing);
    assert!(discovery.has_pending_retry());
    let discovered = discovery.discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].display_name, "Press Button : 10.0.0.5");
    assert!(!discovered[0].paired);
    assert!(controller.bridges().is_empty());

    sleep(Duration::from_secs(2)).await;

    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 2);
    assert_eq!(
        transport.last_body(Method::POST, &pairing_url(IP)),
        Some(json!({"devicetype": "huelink#test-rig"}))
    );
    assert_eq!(controller.bridges().bridges(), vec![Bridge::new(IP, "newuser")]);
    assert_eq!(discovery.state(), DiscoveryState::Settled);
    assert!(!discovery.has_pending_retry());

    let discovered = discovery.discovered();
    assert!(discovered[0].paired);
    assert_eq!(discovered[0].display_name, "Paired : 10.0.0.5");

    assert_eq!(transport.count(Method::GET, &lights_url(IP, "newuser")), 1);
    assert_eq!(controller.lights().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn link_button_keeps_one_pending_retry() {
    let (transport, _store, controller) = setup();
    let discovery = controller.discovery();

    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(Method::POST, &pairing_url(IP), link_button_error());

    discovery.handle_reachability(Reachability::Ethernet).await;
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 1);
    assert!(discovery.has_pending_retry());

    sleep(Duration::from_millis(500)).await;
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 1);

    sleep(Duration::from_millis(1000)).await;
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 2);
    assert!(!discovery.discovered()[0].paired);
    assert!(controller.bridges().is_empty());
}

#[tokio::test(start_paused = true)]
async fn success_adds_exactly_one_bridge() {
    let (transport, _store, controller) = setup();
    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(
        Method::POST,
        &pairing_url(IP),
        json!([{"success": {"username": "abc"}}]),
    );

    controller.discovery().handle_reachability(Reachability::Wifi).await;

    assert_eq!(controller.bridges().bridges(), vec![Bridge::new(IP, "abc")]);
    assert!(controller.discovery().discovered()[0].paired);
    assert_eq!(controller.discovery().state(), DiscoveryState::Settled);

    // A rescan sees the bridge as paired and does not ask again
    controller.discovery().rescan().await;
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 1);
    assert_eq!(controller.bridges().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn halts_off_network() {
    let (transport, _store, controller) = setup();

    controller.discovery().handle_reachability(Reachability::Other).await;
    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::NotOnNetwork)
    );

    controller.discovery().handle_reachability(Reachability::None).await;
    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::NotOnNetwork)
    );
    assert!(transport.requests().is_empty());
}

#[tokio::test(start_paused = true)]
async fn discovery_failures_are_labeled() {
    let (transport, _store, controller) = setup();
    let discovery = controller.discovery();

    transport.fail(Method::GET, DISCOVERY);
    discovery.handle_reachability(Reachability::Wifi).await;
    assert_eq!(discovery.state(), DiscoveryState::Error(PairingError::NetworkError));

    let (transport, _store, controller) = setup();
    transport.reply(Method::GET, DISCOVERY, json!([]));
    controller.discovery().handle_reachability(Reachability::Wifi).await;
    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::NoneFound)
    );
    assert!(controller.discovery().discovered().is_empty());

    let (transport, _store, controller) = setup();
    transport.reply(Method::GET, DISCOVERY, json!({"unexpected": true}));
    controller.discovery().handle_reachability(Reachability::Wifi).await;
    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::NetworkError)
    );
}

#[tokio::test(start_paused = true)]
async fn known_bridges_are_marked_paired() {
    let (transport, _store, controller) = setup();
    controller.bridges().add(IP, "abc").unwrap();

    transport.reply(
        Method::GET,
        DISCOVERY,
        json!([{"internalipaddress": IP}, {"internalipaddress": IP}]),
    );
    controller.discovery().handle_reachability(Reachability::Wifi).await;

    let discovered = controller.discovery().discovered();
    assert_eq!(discovered.len(), 1);
    assert!(discovered[0].paired);
    assert_eq!(discovered[0].display_name, "Paired : 10.0.0.5");
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 0);
    assert_eq!(controller.discovery().state(), DiscoveryState::Settled);
}

#[tokio::test(start_paused = true)]
async fn rescan_replaces_the_discovered_list() {
    let (transport, _store, controller) = setup();
    let other = "10.0.0.6";

    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": other}]));
    transport.reply(Method::POST, &pairing_url(IP), link_button_error());
    transport.reply(Method::POST, &pairing_url(other), link_button_error());

    controller.discovery().handle_reachability(Reachability::Wifi).await;
    assert!(controller.discovery().has_pending_retry());

    controller.discovery().rescan().await;
    let discovered = controller.discovery().discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].ip, other);

    sleep(Duration::from_millis(1500)).await;
    // The retry scheduled for the first session was cancelled
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 1);
    assert_eq!(transport.count(Method::POST, &pairing_url(other)), 2);
}

#[tokio::test(start_paused = true)]
async fn other_bridge_errors_are_left_alone() {
    let (transport, _store, controller) = setup();
    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(
        Method::POST,
        &pairing_url(IP),
        json!([{"error": {"type": 7, "address": "/devicetype", "description": "invalid value"}}]),
    );

    controller.discovery().handle_reachability(Reachability::Wifi).await;
    assert!(!controller.discovery().has_pending_retry());
    assert_eq!(controller.discovery().state(), DiscoveryState::Settled);

    let discovered = controller.discovery().discovered();
    assert_eq!(discovered[0].display_name, IP);
    assert!(!discovered[0].paired);

    sleep(Duration::from_secs(3)).await;
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 1);
}

#[tokio::test(start_paused = true)]
async fn success_without_username_is_a_bridge_error() {
    let (transport, _store, controller) = setup();
    let other = "10.0.0.6";

    transport.reply(
        Method::GET,
        DISCOVERY,
        json!([{"internalipaddress": IP}, {"internalipaddress": other}]),
    );
    transport.reply(Method::POST, &pairing_url(IP), link_button_error());
    transport.reply(Method::POST, &pairing_url(other), json!([{"success": {}}]));

    controller.discovery().handle_reachability(Reachability::Wifi).await;

    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::BridgeError)
    );
    assert!(!controller.discovery().has_pending_retry());
    assert!(controller.bridges().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unexpected_pairing_shapes_are_bridge_errors() {
    let (transport, _store, controller) = setup();
    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(
        Method::POST,
        &pairing_url(IP),
        json!([{"success": {"username": "a"}}, {"success": {"username": "b"}}]),
    );

    controller.discovery().handle_reachability(Reachability::Wifi).await;
    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::BridgeError)
    );
    assert!(controller.bridges().is_empty());
}

#[tokio::test(start_paused = true)]
async fn unreachable_bridges_are_dropped() {
    let (transport, _store, controller) = setup();
    let other = "10.0.0.6";

    transport.reply(
        Method::GET,
        DISCOVERY,
        json!([{"internalipaddress": IP}, {"internalipaddress": other}]),
    );
    transport.fail(Method::POST, &pairing_url(IP));
    transport.reply(Method::POST, &pairing_url(other), link_button_error());

    controller.discovery().handle_reachability(Reachability::Wifi).await;

    let discovered = controller.discovery().discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].ip, other);

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(transport.count(Method::POST, &pairing_url(IP)), 1);
}

#[tokio::test(start_paused = true)]
async fn clear_all_resets_and_rediscovers() {
    let (transport, store, controller) = setup();

    controller.bridges().add(IP, "abc").unwrap();
    transport.reply(
        Method::GET,
        &lights_url(IP, "abc"),
        lights_payload(&[("1", "aa", true), ("2", "bb", false)]),
    );
    controller.start().await.unwrap();
    controller.enabled().set_enabled("aa", true).unwrap();
    controller.enabled().recompute().unwrap();
    assert_eq!(controller.enabled().view().len(), 2);

    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(Method::POST, &pairing_url(IP), link_button_error());
    controller.discovery().handle_reachability(Reachability::Wifi).await;
    assert!(controller.discovery().discovered()[0].paired);

    controller.discovery().clear_all().await.unwrap();

    assert!(controller.bridges().is_empty());
    assert!(controller.lights().is_empty());
    assert!(controller.enabled().view().is_empty());
    assert_eq!(store.load(PAIRED_BRIDGES_KEY).unwrap(), None);
    assert_eq!(store.load(ENABLED_LIGHTS_KEY).unwrap(), None);

    // Discovery ran again and now sees the bridge as unpaired
    assert_eq!(transport.count(Method::GET, DISCOVERY), 2);
    let discovered = controller.discovery().discovered();
    assert_eq!(discovered.len(), 1);
    assert!(!discovered[0].paired);
    assert_eq!(controller.discovery().state(), DiscoveryState::Pairing);
}

#[tokio::test(start_paused = true)]
async fn reachability_changes_drive_the_flow() {
    let (transport, _store, controller) = setup();
    transport.reply(Method::GET, DISCOVERY, json!([]));

    let (tx, rx) = tokio::sync::watch::channel(Reachability::None);
    let mut states = controller.discovery().subscribe_state();
    let watcher = controller.watch_reachability(rx);

    sleep(Duration::from_millis(10)).await;
    assert_eq!(
        *states.borrow_and_update(),
        DiscoveryState::Error(PairingError::NotOnNetwork)
    );

    tx.send(Reachability::Wifi).unwrap();
    sleep(Duration::from_millis(10)).await;
    assert_eq!(
        *states.borrow_and_update(),
        DiscoveryState::Error(PairingError::NoneFound)
    );
    assert_eq!(transport.count(Method::GET, DISCOVERY), 1);

    drop(tx);
    sleep(Duration::from_millis(10)).await;
    assert!(watcher.is_finished());
}

#[tokio::test(start_paused = true)]
async fn non_json_pairing_reply_is_a_bridge_error() {
    let (transport, _store, controller) = setup();
    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.not_json(Method::POST, &pairing_url(IP));

    controller.discovery().handle_reachability(Reachability::Wifi).await;

    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::BridgeError)
    );
    // Answered, so not dropped as unreachable
    let discovered = controller.discovery().discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].ip, IP);
}

#[tokio::test(start_paused = true)]
async fn slow_bridge_does_not_hold_back_others() {
    let (transport, _store, controller) = setup();
    let other = "10.0.0.6";

    transport.reply(
        Method::GET,
        DISCOVERY,
        json!([{"internalipaddress": IP}, {"internalipaddress": other}]),
    );
    transport.reply_after(
        Duration::from_secs(10),
        Method::POST,
        &pairing_url(IP),
        link_button_error(),
    );
    transport.reply(Method::POST, &pairing_url(other), link_button_error());

    let pass = {
        let discovery = controller.discovery().clone();
        tokio::spawn(async move { discovery.handle_reachability(Reachability::Wifi).await })
    };

    sleep(Duration::from_millis(10)).await;
    let discovered = controller.discovery().discovered();
    assert_eq!(discovered[1].display_name, "Press Button : 10.0.0.6");
    assert_eq!(discovered[0].display_name, IP);
    assert!(controller.discovery().has_pending_retry());

    sleep(Duration::from_millis(1100)).await;
    assert_eq!(transport.count(Method::POST, &pairing_url(other)), 2);
    assert!(!pass.is_finished());
}

#[tokio::test(start_paused = true)]
async fn pairing_reply_after_clear_all_is_dropped() {
    let (transport, store, controller) = setup();
    let discovery = controller.discovery().clone();

    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(Method::GET, DISCOVERY, json!([]));
    transport.reply_after(
        Duration::from_secs(5),
        Method::POST,
        &pairing_url(IP),
        json!([{"success": {"username": "late"}}]),
    );
    transport.reply(
        Method::GET,
        &lights_url(IP, "late"),
        lights_payload(&[("1", "aa", true)]),
    );

    let pass = {
        let discovery = discovery.clone();
        tokio::spawn(async move { discovery.handle_reachability(Reachability::Wifi).await })
    };

    sleep(Duration::from_secs(1)).await;
    assert_eq!(discovery.state(), DiscoveryState::Pairing);

    discovery.clear_all().await.unwrap();
    assert_eq!(discovery.state(), DiscoveryState::Error(PairingError::NoneFound));

    pass.await.unwrap();
    sleep(Duration::from_secs(2)).await;

    assert!(controller.bridges().is_empty());
    assert_eq!(store.load(PAIRED_BRIDGES_KEY).unwrap(), None);
    assert_eq!(transport.count(Method::GET, &lights_url(IP, "late")), 0);
    assert!(controller.lights().is_empty());
    assert!(discovery.discovered().is_empty());
    assert_eq!(discovery.state(), DiscoveryState::Error(PairingError::NoneFound));
}

#[tokio::test(start_paused = true)]
async fn pairing_reply_after_rescan_is_dropped() {
    let (transport, _store, controller) = setup();
    let discovery = controller.discovery().clone();
    let other = "10.0.0.6";

    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": IP}]));
    transport.reply(Method::GET, DISCOVERY, json!([{"internalipaddress": other}]));
    transport.reply_after(
        Duration::from_secs(5),
        Method::POST,
        &pairing_url(IP),
        json!([{"success": {"username": "late"}}]),
    );
    transport.reply(Method::POST, &pairing_url(other), link_button_error());

    let pass = {
        let discovery = discovery.clone();
        tokio::spawn(async move { discovery.handle_reachability(Reachability::Wifi).await })
    };
    sleep(Duration::from_secs(1)).await;

    discovery.rescan().await;
    pass.await.unwrap();

    assert!(controller.bridges().is_empty());
    let discovered = discovery.discovered();
    assert_eq!(discovered.len(), 1);
    assert_eq!(discovered[0].ip, other);
    assert_eq!(discovery.state(), DiscoveryState::Pairing);
}

/// Memory store whose first bridge save waits until the test lets it through
struct GatedStore {
    inner: MemoryStore,
    entered: Mutex<Option<mpsc::Sender<()>>>,
    release: Mutex<Option<mpsc::Receiver<()>>>,
}

impl KeyValueStore for GatedStore {
    fn load(&self, key: &str) -> Result<Option<Value>> {
        self.inner.load(key)
    }

    fn save(&self, key: &str, value: Value) -> Result<()> {
        if key == PAIRED_BRIDGES_KEY {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                entered.send(()).unwrap();
                if let Some(release) = self.release.lock().unwrap().take() {
                    release.recv().unwrap();
                }
            }
        }
        self.inner.save(key, value)
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.inner.remove(key)
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn clear_all_wins_over_a_pass_stuck_in_storage() {
    init_tracing();
    let other = "10.0.0.6";
    let (entered_tx, entered_rx) = mpsc::channel();
    let (release_tx, release_rx) = mpsc::channel();
    let store = Arc::new(GatedStore {
        inner: MemoryStore::new(),
        entered: Mutex::new(Some(entered_tx)),
        release: Mutex::new(Some(release_rx)),
    });

    let transport = MockTransport::new();
    transport.reply(
        Method::GET,
        DISCOVERY,
        json!([{"internalipaddress": IP}, {"internalipaddress": other}]),
    );
    transport.fail(Method::GET, DISCOVERY);
    transport.reply(
        Method::POST,
        &pairing_url(IP),
        json!([{"success": {"username": "ua"}}]),
    );
    transport.reply(
        Method::POST,
        &pairing_url(other),
        json!([{"success": {"username": "ub"}}]),
    );

    let config = Config::default().with_discovery_url(DISCOVERY);
    let controller =
        HueController::with_transport(config, transport.clone(), store.clone()).unwrap();

    let pass = {
        let discovery = controller.discovery().clone();
        tokio::spawn(async move { discovery.handle_reachability(Reachability::Wifi).await })
    };

    // The test thread is not a runtime worker, so blocking here is fine
    entered_rx.recv().unwrap();
    let clear = {
        let discovery = controller.discovery().clone();
        tokio::spawn(async move { discovery.clear_all().await })
    };
    std::thread::sleep(Duration::from_millis(50));
    release_tx.send(()).unwrap();

    clear.await.unwrap().unwrap();
    pass.await.unwrap();

    assert!(controller.bridges().is_empty());
    assert_eq!(store.load(PAIRED_BRIDGES_KEY).unwrap(), None);
    assert!(controller.lights().is_empty());
    assert_eq!(
        controller.discovery().state(),
        DiscoveryState::Error(PairingError::NetworkError)
    );
}
