use crate::color::HueColor;
use crate::error::Result;
use crate::light_cache::LightCache;
use crate::protocol::{validate_command_response, EffectCommand, LightCommand};
use crate::subscription::EventReceiver;
use crate::transport::Transport;
use crate::types::{Effect, Light};
use reqwest::Method;
use std::sync::Arc;
use tokio::sync::broadcast;

const FEEDBACK_CAPACITY: usize = 32;

/// Highest brightness the bridge accepts
pub const MAX_BRIGHTNESS: u8 = 254;

/// Which user intent produced a command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    Toggle,
    Color,
    Brightness,
    ColorLoop,
    Restore,
}

impl CommandKind {
    /// Brightness drags and state restores succeed silently
    pub fn signals_success(self) -> bool {
        !matches!(self, CommandKind::Brightness | CommandKind::Restore)
    }
}

/// Advisory result signal for the presentation layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Feedback {
    Success(CommandKind),
    Failure(CommandKind),
}

/// Receiver for command feedback
pub type FeedbackReceiver = EventReceiver<Feedback>;

/// Sends light state changes and reports how they went
///
/// Commands are never retried: a duplicated change on a physical light is
/// worse than a dropped one.
#[derive(Clone)]
pub struct CommandDispatcher {
    transport: Arc<dyn Transport>,
    cache: LightCache,
    feedback: broadcast::Sender<Feedback>,
}

impl CommandDispatcher {
    pub fn new(transport: Arc<dyn Transport>, cache: LightCache) -> Self {
        let (feedback, _) = broadcast::channel(FEEDBACK_CAPACITY);
        Self {
            transport,
            cache,
            feedback,
        }
    }

    /// Subscribe to success/failure signals
    pub fn subscribe_feedback(&self) -> FeedbackReceiver {
        FeedbackReceiver::new(self.feedback.subscribe())
    }

    /// Flip the light on or off
    pub async fn toggle(&self, light: &Light) -> Result<()> {
        let command = LightCommand {
            on: Some(!light.state.on),
            ..Default::default()
        };
        self.send(light, command, CommandKind::Toggle).await
    }

    /// Switch to a solid color at the given brightness (capped at `MAX_BRIGHTNESS`)
    pub async fn set_color(&self, light: &Light, color: impl Into<HueColor>, brightness: u8) -> Result<()> {
        let color = color.into();
        let command = LightCommand {
            effect: Some(EffectCommand::None),
            on: Some(true),
            sat: Some(color.saturation),
            hue: Some(color.hue),
            bri: Some(brightness.min(MAX_BRIGHTNESS)),
            ..Default::default()
        };
        self.send(light, command, CommandKind::Color).await
    }

    /// Set brightness; level 0 also switches the light off
    ///
    /// Levels above `MAX_BRIGHTNESS` are capped.
    pub async fn set_brightness(&self, light: &Light, level: u8) -> Result<()> {
        let level = level.min(MAX_BRIGHTNESS);
        let command = LightCommand {
            on: Some(level != 0),
            bri: Some(level),
            ..Default::default()
        };
        self.send(light, command, CommandKind::Brightness).await
    }

    /// Start the color loop, or stop it if it is running
    pub async fn set_loop(&self, light: &Light) -> Result<()> {
        let effect = match light.state.effect {
            Effect::ColorLoop => EffectCommand::None,
            Effect::Other => EffectCommand::Colorloop,
        };
        let command = LightCommand {
            on: Some(true),
            effect: Some(effect),
            ..Default::default()
        };
        self.send(light, command, CommandKind::ColorLoop).await
    }

    /// Re-apply the state the cache holds for `light`
    pub async fn restore_state(&self, light: &Light) -> Result<()> {
        let state = &light.state;
        let command = LightCommand {
            effect: Some(match state.effect {
                Effect::ColorLoop => EffectCommand::Colorloop,
                Effect::Other => EffectCommand::None,
            }),
            on: Some(state.on),
            sat: state.saturation,
            hue: state.hue,
            bri: state.brightness,
            ..Default::default()
        };
        self.send(light, command, CommandKind::Restore).await
    }

    async fn send(&self, light: &Light, command: LightCommand, kind: CommandKind) -> Result<()> {
        let result = self.put(light, &command).await;

        match &result {
            Ok(()) => {
                tracing::debug!("{:?} accepted by {} for light {}", kind, light.ip, light.id);
                if kind.signals_success() {
                    let _ = self.feedback.send(Feedback::Success(kind));
                }
                self.cache
                    .apply_state(&light.unique_id, command.apply_to(&light.state));
            }
            Err(e) => {
                tracing::warn!("{:?} failed for light {} on {}: {}", kind, light.id, light.ip, e);
                let _ = self.feedback.send(Feedback::Failure(kind));
            }
        }

        result
    }

    async fn put(&self, light: &Light, command: &LightCommand) -> Result<()> {
        let body = serde_json::to_value(command)?;
        let response = self
            .transport
            .request(Method::PUT, &light.state_url(), Some(body))
            .await?;
        validate_command_response(&response)
    }
}
