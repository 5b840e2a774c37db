// Inbound webhook ingestion
//
//   pipeline        – ordered, short-circuiting validation stages
//   replay_store    – TTL-bounded set of accepted fingerprints
//   handler         – axum entry point mapping rejections to status codes
//   logging_handler – default business handler

pub mod handler;
pub mod logging_handler;
pub mod pipeline;
pub mod replay_store;

// Re-export commonly used types
pub use handler::webhook_handler;
pub use logging_handler::LoggingHandler;
pub use pipeline::{DEFAULT_MAX_BODY_BYTES, ReceiverPipeline, ReceiverSettings, Rejection};
pub use replay_store::{FingerprintMode, InMemoryReplayStore, ReplayFingerprint};
