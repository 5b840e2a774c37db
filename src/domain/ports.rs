/*
   This module specifies the seams between the signed webhook protocol and its
   collaborators: wall-clock time, suspension between retries, the network,
   the replay store and the business handler that receives verified payloads.
*/

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Source of the current time as Unix epoch milliseconds.
pub trait Clock: Send + Sync {
    fn now_millis(&self) -> i64;
}

/// [`Clock`] backed by the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| i64::try_from(d.as_millis()).unwrap_or(i64::MAX))
            .unwrap_or_default()
    }
}

/// Suspends the current delivery between attempts.
#[async_trait]
pub trait Sleeper: Send + Sync {
    async fn sleep(&self, duration: Duration);
}

/// [`Sleeper`] backed by the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

#[async_trait]
impl Sleeper for TokioSleeper {
    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

/// Error type for a single outbound HTTP exchange
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("HTTP request failed: {0}")]
    RequestFailed(String),
}

/// Issues one HTTP POST and reports the response status code.
///
/// Implementations must send `body` unchanged: the signature headers were
/// computed over exactly these bytes.
#[async_trait]
pub trait WebhookTransport: Send + Sync {
    async fn post(
        &self,
        url: &str,
        headers: &[(String, String)],
        body: Bytes,
    ) -> Result<u16, TransportError>;
}

/// Error type for replay store operations
#[derive(Debug, thiserror::Error)]
pub enum ReplayStoreError {
    #[error("Replay store unavailable: {0}")]
    Unavailable(String),
}

/// Set of recently accepted request fingerprints.
#[async_trait]
pub trait ReplayStore: Send + Sync {
    /// Records `fingerprint` with the given time-to-live unless an unexpired
    /// entry already exists.
    ///
    /// Returns `true` when the fingerprint was newly recorded and `false` when
    /// it was already present. The lookup and the insert are one atomic step.
    async fn check_and_insert(
        &self,
        fingerprint: &str,
        ttl: Duration,
    ) -> Result<bool, ReplayStoreError>;
}

/// Error type for business handlers
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    #[error("Failed to handle payload: {0}")]
    Failed(String),
}

/// Business logic that consumes authenticated, fresh, non-replayed payloads.
#[async_trait]
pub trait PayloadHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<(), HandlerError>;

    fn name(&self) -> &'static str {
        "UnnamedHandler"
    }
}
