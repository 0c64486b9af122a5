use crate::error::{HueError, Result};
use crate::types::UniqueId;
use tokio::sync::broadcast;

/// "Lights changed" notification published by the light cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LightEvent {
    /// A bridge refresh was merged into the cache
    Refreshed {
        bridge_ip: String,
        /// Number of lights decoded from that bridge
        count: usize,
    },

    /// A command succeeded and the cached state was updated optimistically
    CommandApplied(UniqueId),

    /// The cache was emptied
    Cleared,
}

/// Receiver for broadcast notifications
pub struct EventReceiver<T> {
    rx: broadcast::Receiver<T>,
}

/// Receiver for light cache notifications
pub type LightReceiver = EventReceiver<LightEvent>;

impl<T: Clone> EventReceiver<T> {
    pub(crate) fn new(rx: broadcast::Receiver<T>) -> Self {
        Self { rx }
    }

    /// Receive the next notification
    ///
    /// Fails with `ChannelError` if this receiver fell behind and with
    /// `Connection` once the publishing service is gone.
    pub async fn recv(&mut self) -> Result<T> {
        self.rx.recv().await.map_err(|e| match e {
            broadcast::error::RecvError::Closed => {
                HueError::Connection("notification channel closed".to_string())
            }
            broadcast::error::RecvError::Lagged(n) => {
                HueError::ChannelError(format!("Lagged by {} messages", n))
            }
        })
    }

    /// Try to receive a notification without waiting
    ///
    /// Returns `None` if no message is available.
    pub fn try_recv(&mut self) -> Result<Option<T>> {
        match self.rx.try_recv() {
            Ok(event) => Ok(Some(event)),
            Err(broadcast::error::TryRecvError::Empty) => Ok(None),
            Err(broadcast::error::TryRecvError::Closed) => Err(HueError::Connection(
                "notification channel closed".to_string(),
            )),
            Err(broadcast::error::TryRecvError::Lagged(n)) => {
                Err(HueError::ChannelError(format!("Lagged by {} messages", n)))
            }
        }
    }

    /// Discard everything queued so far
    pub fn drain(&mut self) {
        while !matches!(
            self.rx.try_recv(),
            Err(broadcast::error::TryRecvError::Empty | broadcast::error::TryRecvError::Closed)
        ) {}
    }
}
