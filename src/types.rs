use serde::{Deserialize, Serialize};

/// Bridge-local light identifier (may change across bridge resets)
pub type LightId = String;

/// Globally stable light identifier
pub type UniqueId = String;

/// A paired bridge and the username token it issued to us
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bridge {
    pub ip: String,
    pub username: String,
}

impl Bridge {
    pub fn new(ip: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            username: username.into(),
        }
    }

    /// `http://<ip>/api/<username>`
    pub fn api_url(&self) -> String {
        format!("http://{}/api/{}", self.ip, self.username)
    }

    /// Endpoint listing every light on this bridge
    pub fn lights_url(&self) -> String {
        format!("{}/lights", self.api_url())
    }
}

/// Bridge-side animation mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Effect {
    ColorLoop,
    #[default]
    Other,
}

impl Effect {
    /// Map the bridge's `effect` string; only `"colorloop"` is significant
    pub fn from_bridge(value: &str) -> Self {
        if value == "colorloop" {
            Effect::ColorLoop
        } else {
            Effect::Other
        }
    }
}

/// Snapshot of a light's state as last reported by its bridge
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LightState {
    pub on: bool,
    /// 0..=254
    pub brightness: Option<u8>,
    /// 0..=65535
    pub hue: Option<u16>,
    /// 0..=254
    pub saturation: Option<u8>,
    pub xy: Option<(f32, f32)>,
    /// Color temperature in mireds
    pub color_temp: Option<u16>,
    pub reachable: bool,
    pub effect: Effect,
}

/// A light known to the cache, tagged with the bridge it was fetched from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Light {
    pub id: LightId,
    pub unique_id: UniqueId,
    pub name: String,
    pub light_type: String,
    pub state: LightState,
    pub ip: String,
    pub username: String,
}

impl Light {
    /// `PUT` target for state changes
    pub fn state_url(&self) -> String {
        format!("http://{}/api/{}/lights/{}/state", self.ip, self.username, self.id)
    }
}

/// A bridge seen during the current discovery session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveredBridge {
    pub display_name: String,
    pub ip: String,
    pub paired: bool,
    pub ignore: bool,
}

impl DiscoveredBridge {
    pub(crate) fn unpaired(ip: impl Into<String>) -> Self {
        let ip = ip.into();
        Self {
            display_name: ip.clone(),
            ip,
            paired: false,
            ignore: false,
        }
    }

    pub(crate) fn paired(ip: impl Into<String>) -> Self {
        let ip = ip.into();
        Self {
            display_name: paired_label(&ip),
            ip,
            paired: true,
            ignore: false,
        }
    }

    pub(crate) fn mark_paired(&mut self) {
        self.paired = true;
        self.display_name = paired_label(&self.ip);
    }

    pub(crate) fn mark_awaiting_button(&mut self) {
        self.display_name = format!("Press Button : {}", self.ip);
    }
}

fn paired_label(ip: &str) -> String {
    format!("Paired : {}", ip)
}

/// A known light and whether the user chose to show it
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EnabledLightView {
    pub light: Light,
    pub enabled: bool,
}

/// Current network interface as reported by the host
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Reachability {
    Wifi,
    Ethernet,
    #[default]
    None,
    Other,
}

impl Reachability {
    /// Bridges are only reachable over Wi-Fi or wired Ethernet
    pub fn is_local_network(self) -> bool {
        matches!(self, Reachability::Wifi | Reachability::Ethernet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effect_decoding() {
        assert_eq!(Effect::from_bridge("colorloop"), Effect::ColorLoop);
        assert_eq!(Effect::from_bridge("none"), Effect::Other);
        assert_eq!(Effect::from_bridge("ColorLoop"), Effect::Other);
        assert_eq!(Effect::from_bridge(""), Effect::Other);
    }

    #[test]
    fn urls() {
        let bridge = Bridge::new("10.0.0.5", "abc");
        assert_eq!(bridge.lights_url(), "http://10.0.0.5/api/abc/lights");

        let light = Light {
            id: "3".into(),
            unique_id: "00:17:88:01:00:bd:c7:b9-0b".into(),
            name: "Desk".into(),
            light_type: "Extended color light".into(),
            state: LightState::default(),
            ip: bridge.ip.clone(),
            username: bridge.username.clone(),
        };
        assert_eq!(light.state_url(), "http://10.0.0.5/api/abc/lights/3/state");
    }

    #[test]
    fn discovered_bridge_labels() {
        let mut bridge = DiscoveredBridge::unpaired("10.0.0.5");
        assert_eq!(bridge.display_name, "10.0.0.5");

        bridge.mark_awaiting_button();
        assert_eq!(bridge.display_name, "Press Button : 10.0.0.5");
        assert!(!bridge.paired);

        bridge.mark_paired();
        assert!(bridge.paired);
        assert_eq!(bridge.display_name, "Paired : 10.0.0.5");
        assert_eq!(bridge, DiscoveredBridge::paired("10.0.0.5"));
    }

    #[test]
    fn only_wifi_and_ethernet_reach_bridges() {
        assert!(Reachability::Wifi.is_local_network());
        assert!(Reachability::Ethernet.is_local_network());
        assert!(!Reachability::None.is_local_network());
        assert!(!Reachability::Other.is_local_network());
    }
}
