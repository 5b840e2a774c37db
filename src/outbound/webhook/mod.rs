// Outbound webhook delivery
//
// Pure components:
//   hmac_signer, retry_strategy, schemas
//
// Network-facing components:
//   http_client      – reqwest-backed transport
//   delivery_service – signs once and sends with bounded, linear-backoff retries

pub mod delivery_service;
pub mod hmac_signer;
pub mod http_client;
pub mod retry_strategy;
pub mod schemas;

// Re-export commonly used types
pub use delivery_service::WebhookSender;
pub use hmac_signer::{HmacSigner, SignatureError, format_signature_header, parse_signature_header};
pub use http_client::WebhookHttpClient;
pub use retry_strategy::{DeliveryState, RetryStrategy};
pub use schemas::{
    AttemptOutcome, DeliveryAttempt, DeliveryOptions, DeliveryReport, DeliveryRequest,
    SIGNATURE_HEADER, SignedEnvelope,
};
