use crate::config::Config;
use crate::error::{HueError, Result};
use async_trait::async_trait;
use reqwest::Method;
use serde_json::Value;

/// Generic JSON-over-HTTP client used for every bridge and discovery call
///
/// Implementations send `body` (if any) as JSON and decode the response body
/// as JSON. A non-success status or any transport failure is an error.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value>;
}

/// `reqwest`-backed transport
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a transport with the timeout from `config`
    pub fn from_config(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .user_agent(concat!("huelink/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self::from_reqwest(client))
    }

    /// Wrap an existing `reqwest::Client`
    pub fn from_reqwest(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn request(&self, method: Method, url: &str, body: Option<Value>) -> Result<Value> {
        tracing::debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        if let Some(body) = &body {
            tracing::debug!("Sending: {}", body);
            request = request.json(body);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(HueError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }

        let text = response.text().await?;
        tracing::debug!("Received: {}", text);
        Ok(serde_json::from_str(&text)?)
    }
}
