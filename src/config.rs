use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use config::{
    Config as ConfigLib, ConfigBuilder, ConfigError, Environment, builder::DefaultState,
};
use serde::{Deserialize, Serialize};

use crate::domain::ports::TransportError;
use crate::inbound::webhook::{FingerprintMode, ReceiverSettings};
use crate::outbound::webhook::{DeliveryOptions, WebhookSender};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub receiver: ReceiverConfig,
    pub sender: SenderConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Inbound endpoint parameters
#[derive(Clone, Deserialize)]
pub struct ReceiverConfig {
    pub path: String,
    pub token: String,
    pub hmac_secret: Option<String>,
    pub ttl_seconds: u64,
    pub max_body_bytes: usize,
    pub timestamp_header: String,
    pub fingerprint: FingerprintMode,
    pub sweep_interval_seconds: u64,
}

impl ReceiverConfig {
    pub fn settings(&self) -> ReceiverSettings {
        ReceiverSettings {
            token: self.token.clone(),
            hmac_secret: self.hmac_secret.clone().filter(|s| !s.is_empty()),
            ttl: Duration::from_secs(self.ttl_seconds),
            max_body_bytes: self.max_body_bytes,
            timestamp_header: self.timestamp_header.clone(),
            fingerprint: self.fingerprint,
        }
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_seconds.max(1))
    }

    /// Reject an ingestion path the router cannot mount as a literal route
    pub fn validate(&self) -> Result<(), ConfigError> {
        let path = self.path.as_str();

        if !path.starts_with('/') {
            return Err(ConfigError::Message(format!(
                "receiver.path must start with '/': {path:?}"
            )));
        }

        if path.contains(['{', '}', '*']) || path.split('/').any(|s| s.starts_with(':')) {
            return Err(ConfigError::Message(format!(
                "receiver.path must be a literal path without parameters or wildcards: {path:?}"
            )));
        }

        Ok(())
    }
}

impl fmt::Debug for ReceiverConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReceiverConfig")
            .field("path", &self.path)
            .field("token", &"<redacted>")
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("ttl_seconds", &self.ttl_seconds)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("timestamp_header", &self.timestamp_header)
            .field("fingerprint", &self.fingerprint)
            .field("sweep_interval_seconds", &self.sweep_interval_seconds)
            .finish()
    }
}

/// Outbound delivery parameters
#[derive(Clone, Deserialize)]
pub struct SenderConfig {
    pub hmac_secret: Option<String>,
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub backoff_base_ms: u64,
    pub ttl_seconds: u64,
    pub timestamp_header: String,
}

impl SenderConfig {
    pub fn delivery_options(&self) -> DeliveryOptions {
        DeliveryOptions {
            hmac_secret: self.hmac_secret.clone().filter(|s| !s.is_empty()),
            timeout_ms: self.timeout_ms,
            max_attempts: self.max_attempts,
            ttl_seconds: self.ttl_seconds,
            timestamp_header: self.timestamp_header.clone(),
        }
    }

    /// Build a sender with this configuration's backoff base
    pub fn build_sender(&self) -> Result<WebhookSender, TransportError> {
        let sender = WebhookSender::new()?;
        Ok(sender.with_backoff_base(Duration::from_millis(self.backoff_base_ms)))
    }
}

impl fmt::Debug for SenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderConfig")
            .field("hmac_secret", &self.hmac_secret.as_ref().map(|_| "<redacted>"))
            .field("max_attempts", &self.max_attempts)
            .field("timeout_ms", &self.timeout_ms)
            .field("backoff_base_ms", &self.backoff_base_ms)
            .field("ttl_seconds", &self.ttl_seconds)
            .field("timestamp_header", &self.timestamp_header)
            .finish()
    }
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_with_sources(None)
    }

    pub fn load_with_sources(
        env_vars: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = Self::set_defaults()?;
        // If env_vars is provided, we use it instead of system environment
        // This is to avoid systems variables pollution across tests
        if let Some(vars) = env_vars {
            for (key, value) in vars {
                builder = builder.set_override(&key, value)?;
            }
        } else {
            // Use system environment variables
            // Should be in the format APP_SERVER__PORT or APP_RECEIVER__HMAC_SECRET
            builder = builder.add_source(
                Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );
        }

        let config: Self = builder.build()?.try_deserialize()?;
        config.receiver.validate()?;

        Ok(config)
    }

    /// Set default values for the configuration.
    /// This is used when no environment variables are provided
    fn set_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        ConfigLib::builder()
            .set_default("server.host", "127.0.0.1")?
            .set_default("server.port", 3000)?
            .set_default("receiver.path", "/hooks/tickets")?
            .set_default("receiver.token", "")?
            .set_default("receiver.ttl_seconds", 300)?
            .set_default("receiver.max_body_bytes", 5 * 1024 * 1024)?
            .set_default("receiver.timestamp_header", "X-Timestamp")?
            .set_default("receiver.fingerprint", "signature")?
            .set_default("receiver.sweep_interval_seconds", 60)?
            .set_default("sender.max_attempts", 3)?
            .set_default("sender.timeout_ms", 8000)?
            .set_default("sender.backoff_base_ms", 500)?
            .set_default("sender.ttl_seconds", 300)?
            .set_default("sender.timestamp_header", "X-Timestamp")
    }
}
