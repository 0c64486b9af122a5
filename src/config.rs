use std::time::Duration;

/// Public Hue discovery service
pub const DISCOVERY_URL: &str = "https://discovery.meethue.com";
const APP_NAME: &str = "huelink";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const RETRY_DELAY: Duration = Duration::from_secs(1);

/// Runtime settings shared by the transport and the services
///
/// # Example
///
/// ```
/// use huelink::Config;
/// use std::time::Duration;
///
/// let config = Config::default()
///     .with_device_name("kitchen-tablet")
///     .with_pairing_retry_delay(Duration::from_millis(500));
///
/// assert_eq!(config.device_type(), "huelink#kitchen-tablet");
/// ```
#[derive(Debug, Clone)]
pub struct Config {
    pub discovery_url: String,
    pub app_name: String,
    pub device_name: String,
    pub request_timeout: Duration,
    /// Delay before re-running the pairing pass while the link button is not pressed
    pub pairing_retry_delay: Duration,
    /// Delay before the single retry of a failed light fetch
    pub light_retry_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            discovery_url: DISCOVERY_URL.to_string(),
            app_name: APP_NAME.to_string(),
            device_name: std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            request_timeout: REQUEST_TIMEOUT,
            pairing_retry_delay: RETRY_DELAY,
            light_retry_delay: RETRY_DELAY,
        }
    }
}

impl Config {
    pub fn with_discovery_url(mut self, url: impl Into<String>) -> Self {
        self.discovery_url = url.into();
        self
    }

    pub fn with_app_name(mut self, name: impl Into<String>) -> Self {
        self.app_name = name.into();
        self
    }

    pub fn with_device_name(mut self, name: impl Into<String>) -> Self {
        self.device_name = name.into();
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_pairing_retry_delay(mut self, delay: Duration) -> Self {
        self.pairing_retry_delay = delay;
        self
    }

    pub fn with_light_retry_delay(mut self, delay: Duration) -> Self {
        self.light_retry_delay = delay;
        self
    }

    /// Device type string sent in the pairing request
    pub fn device_type(&self) -> String {
        format!("{}#{}", self.app_name, self.device_name)
    }
}
