use async_trait::async_trait;
use bytes::Bytes;
use reqwest::Client;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::domain::ports::{TransportError, WebhookTransport};

/// HTTP client wrapper for webhook delivery
///
/// The default client imposes no total request timeout; each delivery attempt
/// is bounded by its own `timeout_ms` instead.
#[derive(Debug, Clone)]
pub struct WebhookHttpClient {
    client: Client,
    timeout: Option<Duration>,
}

impl WebhookHttpClient {
    /// Create a new HTTP client without a total request timeout
    pub fn new() -> Result<Self, TransportError> {
        Self::build(None)
    }

    /// Create a new HTTP client that caps every request at `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let mut builder =
            Client::builder().user_agent(format!("signed-webhook/{}", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }

        let client = builder
            .build()
            .map_err(|e| TransportError::RequestFailed(e.to_string()))?;

        Ok(Self { client, timeout })
    }

    /// Get configured timeout, if any
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn classify(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::Timeout(self.timeout.unwrap_or_default())
        } else if err.is_connect() {
            TransportError::Network(err.to_string())
        } else {
            TransportError::RequestFailed(err.to_string())
        }
    }
}

#[async_trait]
impl WebhookTransport for WebhookHttpClient {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Bytes,
    ) -> Result<u16, TransportError> {
        debug!(url = %url, "Sending webhook");

        let start = Instant::now();

        let mut request = self.client.post(url);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let response = request.body(body).send().await.map_err(|e| {
            warn!(url = %url, error = %e, "Webhook request failed");
            self.classify(e)
        })?;

        let status_code = response.status().as_u16();
        let response_time_ms = start.elapsed().as_millis() as u64;

        debug!(
            url = %url,
            status = %status_code,
            response_time_ms = %response_time_ms,
            "Webhook response received"
        );

        Ok(status_code)
    }
}
