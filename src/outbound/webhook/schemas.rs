use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use time::OffsetDateTime;

use super::hmac_signer::HmacSigner;

/// Default number of attempts per delivery
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default per-attempt timeout
pub const DEFAULT_TIMEOUT_MS: u64 = 8_000;

/// Default freshness window agreed with the receiver
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Default name of the header carrying the signing timestamp
pub const DEFAULT_TIMESTAMP_HEADER: &str = "X-Timestamp";

/// Header carrying `sha256=<hex>`
pub const SIGNATURE_HEADER: &str = "X-Signature";

/// Per-call delivery options
#[derive(Clone, PartialEq, Eq)]
pub struct DeliveryOptions {
    /// When absent, no signature headers are sent.
    pub hmac_secret: Option<String>,

    pub timeout_ms: u64,

    pub max_attempts: u32,

    /// Retries stop once the signed envelope is older than this; zero disables the check.
    pub ttl_seconds: u64,

    pub timestamp_header: String,
}

impl DeliveryOptions {
    pub fn with_hmac_secret(mut self, secret: impl Into<String>) -> Self {
        self.hmac_secret = Some(secret.into());
        self
    }

    pub fn with_timeout_ms(mut self, timeout_ms: u64) -> Self {
        self.timeout_ms = timeout_ms;
        self
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub fn with_ttl_seconds(mut self, ttl_seconds: u64) -> Self {
        self.ttl_seconds = ttl_seconds;
        self
    }

    pub fn with_timestamp_header(mut self, name: impl Into<String>) -> Self {
        self.timestamp_header = name.into();
        self
    }
}

impl Default for DeliveryOptions {
    fn default() -> Self {
        Self {
            hmac_secret: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            ttl_seconds: DEFAULT_TTL_SECONDS,
            timestamp_header: DEFAULT_TIMESTAMP_HEADER.to_string(),
        }
    }
}

impl fmt::Debug for DeliveryOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryOptions")
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("max_attempts", &self.max_attempts)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("timestamp_header", &self.timestamp_header)
            .finish()
    }
}

/// One event to deliver.
///
/// The payload is serialized exactly once, at construction. Every attempt and
/// the signature use these bytes.
#[derive(Clone)]
pub struct DeliveryRequest {
    url: String,
    token: Option<String>,
    body: Bytes,
    options: DeliveryOptions,
}

impl DeliveryRequest {
    /// Serialize `payload` to JSON and freeze it into a request
    pub fn new<T: Serialize + ?Sized>(
        url: impl Into<String>,
        token: Option<String>,
        payload: &T,
        options: DeliveryOptions,
    ) -> Result<Self, serde_json::Error> {
        let body = Bytes::from(serde_json::to_vec(payload)?);
        Ok(Self::from_raw(url, token, body, options))
    }

    /// Wrap an already-encoded JSON body
    pub fn from_raw(
        url: impl Into<String>,
        token: Option<String>,
        body: Bytes,
        options: DeliveryOptions,
    ) -> Self {
        Self {
            url: url.into(),
            token: token.filter(|t| !t.is_empty()),
            body,
            options,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn options(&self) -> &DeliveryOptions {
        &self.options
    }

    /// Build the envelope sent verbatim on every attempt
    pub fn seal(&self, timestamp: i64) -> SignedEnvelope {
        let mut headers = vec![("Content-Type".to_string(), "application/json".to_string())];

        if let Some(token) = &self.token {
            headers.push(("Authorization".to_string(), format!("Bearer {token}")));
        }

        if let Some(secret) = &self.options.hmac_secret {
            let signature = HmacSigner::new(secret.as_bytes()).sign(timestamp, &self.body);
            headers.push((SIGNATURE_HEADER.to_string(), signature));
            headers.push((self.options.timestamp_header.clone(), timestamp.to_string()));
        }

        SignedEnvelope {
            url: self.url.clone(),
            timestamp,
            headers,
            body: self.body.clone(),
        }
    }
}

impl fmt::Debug for DeliveryRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeliveryRequest")
            .field("url", &self.url)
            .field("token", &self.token.as_ref().map(|_| "<redacted>"))
            .field("body_len", &self.body.len())
            .field("options", &self.options)
            .finish()
    }
}

/// Headers and body of a delivery, fixed for all of its attempts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedEnvelope {
    pub url: String,

    pub timestamp: i64,

    pub headers: Vec<(String, String)>,

    pub body: Bytes,
}

impl SignedEnvelope {
    /// Look up a header value by case-insensitive name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// How a single attempt ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// 2xx response
    Success(u16),

    /// Response with any other status
    Rejected(u16),

    NetworkError,

    Timeout,
}

impl AttemptOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, AttemptOutcome::Success(_))
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            AttemptOutcome::Success(code) | AttemptOutcome::Rejected(code) => Some(*code),
            AttemptOutcome::NetworkError | AttemptOutcome::Timeout => None,
        }
    }
}

/// Record of one attempt within a `deliver` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryAttempt {
    /// Starts at 1
    pub attempt_number: u32,

    pub outcome: AttemptOutcome,

    pub started_at: OffsetDateTime,

    pub ended_at: OffsetDateTime,
}

/// Result of a `deliver` call together with its attempt history
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: bool,

    pub attempts: Vec<DeliveryAttempt>,
}

impl DeliveryReport {
    /// Report for a delivery that never reached the network
    pub fn not_attempted() -> Self {
        Self {
            delivered: false,
            attempts: Vec::new(),
        }
    }

    pub fn attempt_count(&self) -> usize {
        self.attempts.len()
    }

    pub fn last_outcome(&self) -> Option<AttemptOutcome> {
        self.attempts.last().map(|a| a.outcome)
    }
}
