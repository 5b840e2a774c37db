use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use crate::domain::ports::{HandlerError, PayloadHandler};

/// Business handler that records each accepted delivery in the log.
///
/// Only the top-level `event` field is inspected; the rest of the payload is
/// opaque to the receiver.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingHandler;

impl LoggingHandler {
    pub(crate) fn event_name(payload: &Value) -> &str {
        payload
            .get("event")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
    }
}

#[async_trait]
impl PayloadHandler for LoggingHandler {
    async fn handle(&self, payload: Value) -> Result<(), HandlerError> {
        info!(
            event = %Self::event_name(&payload),
            "Webhook payload received"
        );
        Ok(())
    }

    fn name(&self) -> &'static str {
        "LoggingHandler"
    }
}
