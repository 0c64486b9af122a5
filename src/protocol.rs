//! Wire formats of the discovery service and the bridge REST API.

use crate::error::{HueError, Result};
use crate::types::{Bridge, Effect, Light, LightState};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// Description the bridge uses while waiting for the physical button press
pub const LINK_BUTTON_NOT_PRESSED: &str = "link button not pressed";

/// One entry of the discovery service response
#[derive(Debug, Clone, Deserialize)]
pub struct DiscoveryEntry {
    pub internalipaddress: String,
    #[serde(default)]
    pub id: Option<String>,
}

/// Decode the discovery response into bridge addresses, in response order
pub fn parse_discovery(value: Value) -> Result<Vec<String>> {
    let entries: Vec<DiscoveryEntry> = serde_json::from_value(value)?;
    Ok(entries.into_iter().map(|e| e.internalipaddress).collect())
}

/// Body of `POST /api`
#[derive(Debug, Clone, Serialize)]
pub struct PairingRequest {
    pub devicetype: String,
}

/// Error object inside a bridge result element
#[derive(Debug, Clone, Deserialize)]
pub struct ApiError {
    #[serde(rename = "type", default)]
    pub error_type: Option<u32>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub description: String,
}

/// One element of a bridge result array: `{"success": ...}` or `{"error": ...}`
#[derive(Debug, Clone, Deserialize)]
struct ApiResult {
    #[serde(default)]
    success: Option<Value>,
    #[serde(default)]
    error: Option<ApiError>,
}

/// Interpreted answer to a pairing request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingReply {
    /// The user still has to press the link button
    LinkButtonNotPressed,
    /// Any other bridge-side error
    Rejected(String),
    /// Pairing succeeded and the bridge issued a username
    Paired(String),
    /// `success` without a usable username
    MalformedSuccess,
}

/// Interpret a pairing response; anything but a single result element is invalid
pub fn parse_pairing_response(value: Value) -> Result<PairingReply> {
    let results: Vec<ApiResult> = serde_json::from_value(value)
        .map_err(|e| HueError::InvalidResponse(format!("pairing response: {}", e)))?;

    let [result] = <[ApiResult; 1]>::try_from(results).map_err(|results| {
        HueError::InvalidResponse(format!(
            "expected one pairing result, got {}",
            results.len()
        ))
    })?;

    if let Some(error) = result.error {
        if error.description == LINK_BUTTON_NOT_PRESSED {
            return Ok(PairingReply::LinkButtonNotPressed);
        }
        return Ok(PairingReply::Rejected(error.description));
    }

    match result.success {
        Some(success) => Ok(success
            .get("username")
            .and_then(Value::as_str)
            .map(|u| PairingReply::Paired(u.to_string()))
            .unwrap_or(PairingReply::MalformedSuccess)),
        None => Err(HueError::InvalidResponse(
            "pairing result has neither success nor error".to_string(),
        )),
    }
}

/// Check a light state response: non-empty and every element a success
pub fn validate_command_response(value: &Value) -> Result<()> {
    let results = value
        .as_array()
        .ok_or_else(|| HueError::InvalidResponse("command response is not an array".to_string()))?;

    if results.is_empty() {
        return Err(HueError::Command("empty response".to_string()));
    }

    for result in results {
        if result.get("success").is_some() {
            continue;
        }
        let description = result
            .get("error")
            .and_then(|e| e.get("description"))
            .and_then(Value::as_str)
            .unwrap_or("missing success");
        return Err(HueError::Command(description.to_string()));
    }

    Ok(())
}

#[derive(Debug, Clone, Deserialize)]
struct ApiLight {
    #[serde(rename = "type")]
    light_type: String,
    name: String,
    uniqueid: String,
    state: ApiLightState,
}

#[derive(Debug, Clone, Deserialize)]
struct ApiLightState {
    on: bool,
    #[serde(default)]
    bri: Option<u8>,
    #[serde(default)]
    hue: Option<u16>,
    #[serde(default)]
    sat: Option<u8>,
    #[serde(default)]
    xy: Option<[f32; 2]>,
    #[serde(default)]
    ct: Option<u16>,
    #[serde(default)]
    reachable: bool,
    #[serde(default)]
    effect: Option<String>,
}

impl From<ApiLightState> for LightState {
    fn from(state: ApiLightState) -> Self {
        Self {
            on: state.on,
            brightness: state.bri,
            hue: state.hue,
            saturation: state.sat,
            xy: state.xy.map(|[x, y]| (x, y)),
            color_temp: state.ct,
            reachable: state.reachable,
            effect: state
                .effect
                .as_deref()
                .map(Effect::from_bridge)
                .unwrap_or_default(),
        }
    }
}

/// Decode `GET /api/<username>/lights` into lights tagged with `bridge`
///
/// The payload must be an object keyed by light id. Entries that fail to
/// decode are skipped with a warning.
pub fn decode_lights(value: Value, bridge: &Bridge) -> Result<Vec<Light>> {
    let entries: BTreeMap<String, Value> = serde_json::from_value(value)
        .map_err(|e| HueError::InvalidResponse(format!("lights response: {}", e)))?;

    let mut lights = Vec::with_capacity(entries.len());
    for (id, entry) in entries {
        match serde_json::from_value::<ApiLight>(entry) {
            Ok(api) => lights.push(Light {
                id,
                unique_id: api.uniqueid,
                name: api.name,
                light_type: api.light_type,
                state: api.state.into(),
                ip: bridge.ip.clone(),
                username: bridge.username.clone(),
            }),
            Err(e) => {
                tracing::warn!("Skipping light {} from {}: {}", id, bridge.ip, e);
            }
        }
    }

    Ok(lights)
}

/// Effect value accepted by the state endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectCommand {
    None,
    Colorloop,
}

/// Body of `PUT /api/<username>/lights/<id>/state`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LightCommand {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub effect: Option<EffectCommand>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub on: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sat: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hue: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bri: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub xy: Option<[f32; 2]>,
}

impl LightCommand {
    /// State the light should be in once the bridge accepted this command
    pub fn apply_to(&self, state: &LightState) -> LightState {
        let mut next = state.clone();
        if let Some(on) = self.on {
            next.on = on;
        }
        if let Some(bri) = self.bri {
            next.brightness = Some(bri);
        }
        if let Some(hue) = self.hue {
            next.hue = Some(hue);
        }
        if let Some(sat) = self.sat {
            next.saturation = Some(sat);
        }
        if let Some([x, y]) = self.xy {
            next.xy = Some((x, y));
        }
        if let Some(effect) = self.effect {
            next.effect = match effect {
                EffectCommand::Colorloop => Effect::ColorLoop,
                EffectCommand::None => Effect::Other,
            };
        }
        next
    }
}
