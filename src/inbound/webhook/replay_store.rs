use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::domain::ports::{ReplayStore, ReplayStoreError};

/// What identifies a request for replay detection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FingerprintMode {
    /// The signature alone, which already binds the timestamp and body
    #[default]
    Signature,

    SignatureAndTimestamp,
}

/// Identity of an accepted signed request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplayFingerprint {
    pub signature: String,

    pub timestamp: i64,
}

impl ReplayFingerprint {
    pub fn new(signature: impl Into<String>, timestamp: i64) -> Self {
        Self {
            signature: signature.into(),
            timestamp,
        }
    }

    /// Store key under the given mode
    pub fn key(&self, mode: FingerprintMode) -> String {
        // Hex digests are case-insensitive; fold so a re-cased resend collides.
        let signature = self.signature.trim().to_ascii_lowercase();
        match mode {
            FingerprintMode::Signature => signature,
            FingerprintMode::SignatureAndTimestamp => format!("{}:{}", self.timestamp, signature),
        }
    }
}

/// In-memory replay store with per-entry expiry.
///
/// Expired entries are treated as absent on lookup and removed either then or
/// by [`InMemoryReplayStore::spawn_sweeper`]. All access goes through one
/// mutex, so a lookup and the insert that follows it cannot interleave with
/// another request's.
#[derive(Debug, Default)]
pub struct InMemoryReplayStore {
    entries: Mutex<HashMap<String, Instant>>,
}

impl InMemoryReplayStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, including expired ones not yet evicted
    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Remove all expired entries, returning how many were removed
    pub async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;
        let before = entries.len();

        entries.retain(|_, expires_at| *expires_at > now);

        before - entries.len()
    }

    /// Start a background task that purges expired entries every `interval`.
    ///
    /// The task holds only a weak reference and ends once the store is dropped.
    pub fn spawn_sweeper(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let store: Weak<Self> = Arc::downgrade(self);

        info!(interval_ms = interval.as_millis() as u64, "Replay store sweeper starting");

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            // The first tick completes immediately.
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let Some(store) = store.upgrade() else {
                    debug!("Replay store dropped – sweeper exiting");
                    return;
                };

                let removed = store.purge_expired().await;
                if removed > 0 {
                    debug!(removed_count = removed, "Purged expired replay fingerprints");
                }
            }
        })
    }
}

#[async_trait]
impl ReplayStore for InMemoryReplayStore {
    async fn check_and_insert(
        &self,
        fingerprint: &str,
        ttl: Duration,
    ) -> Result<bool, ReplayStoreError> {
        let now = Instant::now();
        let mut entries = self.entries.lock().await;

        if let Some(expires_at) = entries.get(fingerprint)
            && *expires_at > now
        {
            return Ok(false);
        }

        entries.insert(fingerprint.to_string(), now + ttl);
        Ok(true)
    }
}
