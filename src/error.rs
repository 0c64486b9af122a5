use thiserror::Error;

/// Result type for Hue operations
pub type Result<T> = std::result::Result<T, HueError>;

/// Errors that can occur when talking to Hue bridges
#[derive(Error, Debug)]
pub enum HueError {
    /// HTTP transport error (connection refused, DNS failure, timeout, etc.)
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Server answered with a non-success status code
    #[error("HTTP status {status} from {url}")]
    Status {
        /// Status code returned by the server
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Connection could not be established or was dropped
    #[error("Connection error: {0}")]
    Connection(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid or unexpected response from a bridge or the discovery service
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Bridge rejected a light state change
    #[error("Command rejected: {0}")]
    Command(String),

    /// Discovery or pairing failed
    #[error("Pairing error: {0}")]
    Pairing(#[from] PairingError),

    /// Channel receive error
    #[error("Channel error: {0}")]
    ChannelError(String),
}

impl HueError {
    /// Whether the error happened before any payload was received
    pub fn is_transport(&self) -> bool {
        matches!(
            self,
            HueError::Http(_) | HueError::Status { .. } | HueError::Connection(_)
        )
    }
}

/// Failure reasons surfaced by discovery and pairing
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingError {
    /// Neither Wi-Fi nor wired Ethernet is active
    #[error("Not on WiFi")]
    NotOnNetwork,

    /// Discovery endpoint could not be reached or answered garbage
    #[error("Network Error")]
    NetworkError,

    /// Discovery returned an empty list
    #[error("No Bridges Found")]
    NoneFound,

    /// A specific bridge could not be reached
    #[error("Bridge Connectivity Error")]
    BridgeConnectionError,

    /// A bridge answered with an unexpected payload
    #[error("Unknown Error with Bridge")]
    BridgeError,
}
