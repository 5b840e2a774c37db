use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use time::OffsetDateTime;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::domain::ports::{
    Clock, Sleeper, SystemClock, TokioSleeper, TransportError, WebhookTransport,
};
use crate::outbound::webhook::http_client::WebhookHttpClient;
use crate::outbound::webhook::retry_strategy::{
    DEFAULT_BACKOFF_BASE, DeliveryState, RetryStrategy,
};
use crate::outbound::webhook::schemas::{
    AttemptOutcome, DeliveryAttempt, DeliveryOptions, DeliveryReport, DeliveryRequest,
    SignedEnvelope,
};

/// Sends signed webhook deliveries with bounded retries.
///
/// `WebhookSender` keeps no state between calls; concurrent `deliver` calls
/// share only the transport. Within one call:
/// 1. The payload is serialized and the timestamp taken exactly once.
/// 2. Attempts run strictly one after another, each under its own timeout.
/// 3. A failed attempt is followed by a linear backoff (`base * attempt`)
///    while attempts remain.
/// 4. The caller only ever sees `true` (delivered) or `false`.
pub struct WebhookSender {
    /// HTTP transport reused across all deliveries.
    transport: Arc<dyn WebhookTransport>,

    clock: Arc<dyn Clock>,

    sleeper: Arc<dyn Sleeper>,

    backoff_base: Duration,
}

impl WebhookSender {
    /// Create a sender backed by a `reqwest` client and the system clock.
    pub fn new() -> Result<Self, TransportError> {
        Ok(Self::with_transport(Arc::new(WebhookHttpClient::new()?)))
    }

    /// Create a sender over a custom transport.
    pub fn with_transport(transport: Arc<dyn WebhookTransport>) -> Self {
        Self {
            transport,
            clock: Arc::new(SystemClock),
            sleeper: Arc::new(TokioSleeper),
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }

    /// Override the time source used for signing timestamps.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Override how the sender waits between attempts.
    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    /// Override the linear backoff base.
    pub fn with_backoff_base(mut self, backoff_base: Duration) -> Self {
        self.backoff_base = backoff_base;
        self
    }

    /// Deliver `payload` to `url`, returning whether an attempt succeeded.
    ///
    /// Never fails: a missing URL, an unserializable payload and exhausted
    /// retries all come back as `false`.
    pub async fn deliver<T: Serialize + ?Sized>(
        &self,
        url: &str,
        token: Option<&str>,
        payload: &T,
        options: &DeliveryOptions,
    ) -> bool {
        if url.trim().is_empty() {
            warn!("Webhook URL is empty – skipping delivery");
            return false;
        }

        let request = match DeliveryRequest::new(
            url,
            token.map(str::to_string),
            payload,
            options.clone(),
        ) {
            Ok(request) => request,
            Err(e) => {
                error!(url = %url, error = %e, "Failed to serialize webhook payload");
                return false;
            }
        };

        self.deliver_request(&request).await
    }

    /// Deliver a prepared request, returning whether an attempt succeeded.
    pub async fn deliver_request(&self, request: &DeliveryRequest) -> bool {
        self.deliver_with_report(request).await.delivered
    }

    /// Deliver a prepared request and report every attempt made.
    pub async fn deliver_with_report(&self, request: &DeliveryRequest) -> DeliveryReport {
        if request.url().trim().is_empty() {
            warn!("Webhook URL is empty – skipping delivery");
            return DeliveryReport::not_attempted();
        }

        let delivery_id = Uuid::new_v4();
        let options = request.options();
        let strategy = RetryStrategy::new(options.max_attempts, self.backoff_base);
        let timeout = Duration::from_millis(options.timeout_ms);
        let envelope = request.seal(self.clock.now_millis());

        let mut attempts = Vec::new();
        let mut state = DeliveryState::Idle;

        loop {
            state = match state {
                DeliveryState::Idle => state.start(),
                DeliveryState::Attempting(attempt) => {
                    let started_at = OffsetDateTime::now_utc();
                    let outcome = self.attempt(&envelope, timeout).await;
                    let ended_at = OffsetDateTime::now_utc();

                    debug!(
                        delivery_id = %delivery_id,
                        attempt = attempt,
                        outcome = ?outcome,
                        "Webhook attempt finished"
                    );

                    attempts.push(DeliveryAttempt {
                        attempt_number: attempt,
                        outcome,
                        started_at,
                        ended_at,
                    });

                    state.on_attempt_finished(outcome.is_success(), &strategy)
                }
                DeliveryState::Backoff(attempt) => {
                    let delay = strategy.backoff_after(attempt).unwrap_or_default();
                    if self.envelope_stale_after(&envelope, options, delay) {
                        warn!(
                            delivery_id = %delivery_id,
                            attempt = attempt,
                            ttl_seconds = options.ttl_seconds,
                            delay_ms = delay.as_millis() as u64,
                            "Signed envelope would outlive its freshness window – giving up"
                        );
                        state.abandon()
                    } else {
                        warn!(
                            delivery_id = %delivery_id,
                            url = %envelope.url,
                            attempt = attempt,
                            max_attempts = strategy.max_attempts(),
                            delay_ms = delay.as_millis() as u64,
                            "Webhook delivery failed – will retry"
                        );
                        self.sleeper.sleep(delay).await;
                        state.on_backoff_elapsed()
                    }
                }
                DeliveryState::Done { delivered } => {
                    if delivered {
                        info!(
                            delivery_id = %delivery_id,
                            url = %envelope.url,
                            attempts = attempts.len(),
                            "Webhook delivered successfully"
                        );
                    } else {
                        error!(
                            delivery_id = %delivery_id,
                            url = %envelope.url,
                            attempts = attempts.len(),
                            "Webhook delivery permanently failed"
                        );
                    }
                    return DeliveryReport {
                        delivered,
                        attempts,
                    };
                }
            };
        }
    }

    /// Run one attempt under `timeout`. Expiry drops only the in-flight request.
    async fn attempt(&self, envelope: &SignedEnvelope, timeout: Duration) -> AttemptOutcome {
        let send = self
            .transport
            .post(&envelope.url, &envelope.headers, envelope.body.clone());

        match tokio::time::timeout(timeout, send).await {
            Ok(Ok(status)) if (200..300).contains(&status) => AttemptOutcome::Success(status),
            Ok(Ok(status)) => AttemptOutcome::Rejected(status),
            Ok(Err(TransportError::Timeout(_))) | Err(_) => AttemptOutcome::Timeout,
            Ok(Err(e)) => {
                debug!(url = %envelope.url, error = %e, "Webhook transport error");
                AttemptOutcome::NetworkError
            }
        }
    }

    /// Whether the envelope will be older than `ttl_seconds` once `delay` has passed.
    fn envelope_stale_after(
        &self,
        envelope: &SignedEnvelope,
        options: &DeliveryOptions,
        delay: Duration,
    ) -> bool {
        if options.ttl_seconds == 0 {
            return false;
        }
        let age_ms = self
            .clock
            .now_millis()
            .saturating_sub(envelope.timestamp)
            .saturating_add(i64::try_from(delay.as_millis()).unwrap_or(i64::MAX));
        age_ms > (options.ttl_seconds as i64).saturating_mul(1_000)
    }
}
