//! Conversion between device colors and the bridge's hue/saturation encoding.

use crate::types::LightState;

const HUE_MAX: f32 = 65535.0;
const SAT_MAX: f32 = 254.0;

/// Color in HSV space, every component in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Hsv {
    pub hue: f32,
    pub saturation: f32,
    pub value: f32,
}

/// 8-bit RGB color
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

/// Hue and saturation as the bridge expects them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HueColor {
    /// 0..=65535
    pub hue: u16,
    /// 0..=254
    pub saturation: u8,
}

impl Rgb {
    pub fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    pub fn to_hsv(self) -> Hsv {
        let r = f32::from(self.r) / 255.0;
        let g = f32::from(self.g) / 255.0;
        let b = f32::from(self.b) / 255.0;

        let max = r.max(g).max(b);
        let min = r.min(g).min(b);
        let delta = max - min;

        let hue = if delta == 0.0 {
            0.0
        } else if max == r {
            ((g - b) / delta).rem_euclid(6.0) / 6.0
        } else if max == g {
            ((b - r) / delta + 2.0) / 6.0
        } else {
            ((r - g) / delta + 4.0) / 6.0
        };
        let saturation = if max == 0.0 { 0.0 } else { delta / max };

        Hsv {
            hue,
            saturation,
            value: max,
        }
    }
}

impl From<Hsv> for HueColor {
    fn from(hsv: Hsv) -> Self {
        Self {
            hue: (hsv.hue.clamp(0.0, 1.0) * HUE_MAX) as u16,
            saturation: (hsv.saturation.clamp(0.0, 1.0) * SAT_MAX) as u8,
        }
    }
}

impl From<Rgb> for HueColor {
    fn from(rgb: Rgb) -> Self {
        rgb.to_hsv().into()
    }
}

impl HueColor {
    /// Back to HSV at full brightness
    pub fn to_hsv(self) -> Hsv {
        Hsv {
            hue: f32::from(self.hue) / HUE_MAX,
            saturation: f32::from(self.saturation) / SAT_MAX,
            value: 1.0,
        }
    }

    /// Color currently shown by a light, if it reports hue and saturation
    pub fn from_state(state: &LightState) -> Option<Self> {
        Some(Self {
            hue: state.hue?,
            saturation: state.saturation?,
        })
    }
}
