//! Receiver-side validation of inbound webhook deliveries.
//!
//! Every request runs the same fixed sequence of stages, and the first stage
//! that fails decides the response:
//!
//! 1. size guard (413)
//! 2. bearer token (401)
//! 3. signature, when a secret is configured (401)
//! 4. timestamp freshness (401)
//! 5. replay detection (401)
//! 6. JSON parsing (400) and dispatch to the business handler (200)
//!
//! A rejected request is answered and forgotten; nothing is retried here.

use axum::body::Body;
use axum::http::header::{AUTHORIZATION, CONTENT_LENGTH};
use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use http_body_util::LengthLimitError;
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::replay_store::{FingerprintMode, ReplayFingerprint};
use crate::domain::ports::{
    Clock, HandlerError, PayloadHandler, ReplayStore, ReplayStoreError, SystemClock,
};
use crate::outbound::webhook::hmac_signer::HmacSigner;
use crate::outbound::webhook::schemas::{
    DEFAULT_TIMESTAMP_HEADER, DEFAULT_TTL_SECONDS, SIGNATURE_HEADER,
};

/// Default size guard: 5 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 5 * 1024 * 1024;

/// Why a delivery was turned away
#[derive(Debug, Error)]
pub enum Rejection {
    #[error("payload too large: limit is {limit} bytes")]
    PayloadTooLarge { limit: usize },

    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid bearer token")]
    InvalidToken,

    #[error("missing required header: {0}")]
    MissingSignature(String),

    #[error("invalid timestamp header")]
    InvalidTimestamp,

    #[error("invalid signature")]
    InvalidSignature,

    #[error("timestamp outside the freshness window")]
    StaleTimestamp { skew_ms: i64 },

    #[error("request already processed")]
    Replay,

    #[error("failed to read request body: {0}")]
    BodyRead(String),

    #[error("invalid JSON body: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    #[error(transparent)]
    HandlerFailed(#[from] HandlerError),

    #[error(transparent)]
    ReplayStoreUnavailable(#[from] ReplayStoreError),
}

impl Rejection {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Rejection::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Rejection::MissingToken
            | Rejection::InvalidToken
            | Rejection::MissingSignature(_)
            | Rejection::InvalidTimestamp
            | Rejection::InvalidSignature
            | Rejection::StaleTimestamp { .. }
            | Rejection::Replay => StatusCode::UNAUTHORIZED,
            Rejection::BodyRead(_) | Rejection::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Rejection::HandlerFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Rejection::ReplayStoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// Receiver parameters
#[derive(Clone, PartialEq, Eq)]
pub struct ReceiverSettings {
    /// Expected bearer token. An empty token rejects every request.
    pub token: String,

    /// Enables signature, freshness and replay checks when set.
    pub hmac_secret: Option<String>,

    /// Freshness window in both directions, and replay-store lifetime.
    pub ttl: Duration,

    pub max_body_bytes: usize,

    pub timestamp_header: String,

    pub fingerprint: FingerprintMode,
}

impl Default for ReceiverSettings {
    fn default() -> Self {
        Self {
            token: String::new(),
            hmac_secret: None,
            ttl: Duration::from_secs(DEFAULT_TTL_SECONDS),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
            timestamp_header: DEFAULT_TIMESTAMP_HEADER.to_string(),
            fingerprint: FingerprintMode::default(),
        }
    }
}

impl fmt::Debug for ReceiverSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverSettings")
            .field("token", &"<redacted>")
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("ttl", &self.ttl)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("timestamp_header", &self.timestamp_header)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

/// Validation chain shared by all inbound requests
pub struct ReceiverPipeline {
    settings: ReceiverSettings,

    signer: Option<HmacSigner>,

    /// Shared with every concurrent request.
    replay_store: Arc<dyn ReplayStore>,

    handler: Arc<dyn PayloadHandler>,

    clock: Arc<dyn Clock>,
}

impl ReceiverPipeline {
    pub fn new(
        settings: ReceiverSettings,
        replay_store: Arc<dyn ReplayStore>,
        handler: Arc<dyn PayloadHandler>,
    ) -> Self {
        let signer = settings
            .hmac_secret
            .as_ref()
            .map(|secret| HmacSigner::new(secret.as_bytes()));

        Self {
            settings,
            signer,
            replay_store,
            handler,
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the time source used for freshness checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn settings(&self) -> &ReceiverSettings {
        &self.settings
    }

    /// Run every stage over one request.
    pub async fn process(&self, headers: &HeaderMap, body: Body) -> Result<(), Rejection> {
        let result = self.run_stages(headers, body).await;

        match &result {
            Ok(()) => debug!(handler = self.handler.name(), "Webhook accepted"),
            Err(Rejection::HandlerFailed(e)) => {
                error!(handler = self.handler.name(), error = %e, "Webhook handler failed")
            }
            Err(rejection) => warn!(
                status = rejection.status_code().as_u16(),
                reason = %rejection,
                "Rejected webhook delivery"
            ),
        }

        result
    }

    async fn run_stages(&self, headers: &HeaderMap, body: Body) -> Result<(), Rejection> {
        let raw_body = self.read_body(headers, body).await?;
        self.authenticate(headers)?;

        if let Some(fingerprint) = self.verify_signature(headers, &raw_body)? {
            self.check_freshness(fingerprint.timestamp)?;
            self.check_replay(&fingerprint).await?;
        }

        self.dispatch(&raw_body).await
    }

    /// Stage 1: reject on declared or streamed length before buffering past the limit.
    pub async fn read_body(&self, headers: &HeaderMap, body: Body) -> Result<Bytes, Rejection> {
        let limit = self.settings.max_body_bytes;

        if let Some(declared) = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            && declared > limit as u64
        {
            return Err(Rejection::PayloadTooLarge { limit });
        }

        axum::body::to_bytes(body, limit).await.map_err(|e| {
            let inner = e.into_inner();
            if inner.is::<LengthLimitError>() {
                Rejection::PayloadTooLarge { limit }
            } else {
                Rejection::BodyRead(inner.to_string())
            }
        })
    }

    /// Stage 2: `Authorization: Bearer <token>` must match exactly.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<(), Rejection> {
        let value = headers
            .get(AUTHORIZATION)
            .ok_or(Rejection::MissingToken)?
            .to_str()
            .map_err(|_| Rejection::InvalidToken)?;

        let supplied = value
            .strip_prefix("Bearer ")
            .ok_or(Rejection::InvalidToken)?;

        let expected = self.settings.token.as_bytes();
        if expected.is_empty() || !bool::from(supplied.as_bytes().ct_eq(expected)) {
            return Err(Rejection::InvalidToken);
        }

        Ok(())
    }

    /// Stage 3: recompute the MAC over the raw body.
    ///
    /// Returns `None` when no secret is configured, otherwise the fingerprint
    /// of the verified request.
    pub fn verify_signature(
        &self,
        headers: &HeaderMap,
        raw_body: &[u8],
    ) -> Result<Option<ReplayFingerprint>, Rejection> {
        let Some(signer) = &self.signer else {
            return Ok(None);
        };

        let signature = header_str(headers, SIGNATURE_HEADER)?;
        let raw_timestamp = header_str(headers, &self.settings.timestamp_header)?.trim();
        let timestamp = raw_timestamp
            .parse::<i64>()
            .map_err(|_| Rejection::InvalidTimestamp)?;

        // The MAC covers the decimal form of the timestamp, so any other
        // spelling of the same number ("+17..", "017..") cannot match.
        if timestamp.to_string() != raw_timestamp {
            return Err(Rejection::InvalidTimestamp);
        }

        if !signer.verify(timestamp, raw_body, signature) {
            return Err(Rejection::InvalidSignature);
        }

        Ok(Some(ReplayFingerprint::new(signature, timestamp)))
    }

    /// Stage 4: the timestamp must lie within the window on either side of now.
    pub fn check_freshness(&self, timestamp: i64) -> Result<(), Rejection> {
        let skew_ms = self.clock.now_millis().saturating_sub(timestamp);

        if u128::from(skew_ms.unsigned_abs()) > self.settings.ttl.as_millis() {
            return Err(Rejection::StaleTimestamp { skew_ms });
        }

        Ok(())
    }

    /// Stage 5: record the fingerprint, or reject if it is already recorded.
    pub async fn check_replay(&self, fingerprint: &ReplayFingerprint) -> Result<(), Rejection> {
        let key = fingerprint.key(self.settings.fingerprint);

        // A timestamp ahead of our clock stays fresh for longer than `ttl`
        // from now; keep the fingerprint until the timestamp itself goes stale.
        let ahead_ms = fingerprint
            .timestamp
            .saturating_sub(self.clock.now_millis())
            .max(0) as u64;
        let ttl = self.settings.ttl + Duration::from_millis(ahead_ms);

        if self.replay_store.check_and_insert(&key, ttl).await? {
            Ok(())
        } else {
            Err(Rejection::Replay)
        }
    }

    /// Stage 6: parse the verified bytes and hand them to the business handler.
    pub async fn dispatch(&self, raw_body: &[u8]) -> Result<(), Rejection> {
        let payload: Value = serde_json::from_slice(raw_body)?;
        self.handler.handle(payload).await?;
        Ok(())
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Result<&'a str, Rejection> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| Rejection::MissingSignature(name.to_string()))
}
