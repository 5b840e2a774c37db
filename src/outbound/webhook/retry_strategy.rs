use std::time::Duration;

/// Default backoff base: the wait after attempt `n` is `n * 500ms`
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Retry strategy for webhook delivery
/// Failed attempts are retried with a linearly increasing delay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryStrategy {
    max_attempts: u32,

    backoff_base: Duration,
}

impl RetryStrategy {
    /// Create a new retry strategy. At least one attempt is always made.
    pub fn new(max_attempts: u32, backoff_base: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Get maximum number of attempts
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn backoff_base(&self) -> Duration {
        self.backoff_base
    }

    /// Check whether another attempt follows attempt number `attempt`
    pub fn has_attempt_after(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }

    /// Delay between attempt `attempt` and the next one, if any
    pub fn backoff_after(&self, attempt: u32) -> Option<Duration> {
        if !self.has_attempt_after(attempt) {
            return None;
        }

        Some(self.backoff_base.saturating_mul(attempt))
    }
}

impl Default for RetryStrategy {
    fn default() -> Self {
        Self::new(super::schemas::DEFAULT_MAX_ATTEMPTS, DEFAULT_BACKOFF_BASE)
    }
}

/// Progress of one delivery.
///
/// `Idle -> Attempting(1) -> Backoff(1) -> Attempting(2) -> ... -> Done`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Idle,

    /// Attempt `n` is in flight
    Attempting(u32),

    /// Attempt `n` failed and the sender is waiting before attempt `n + 1`
    Backoff(u32),

    Done { delivered: bool },
}

impl DeliveryState {
    /// Leave `Idle` for the first attempt
    pub fn start(self) -> Self {
        match self {
            DeliveryState::Idle => DeliveryState::Attempting(1),
            other => other,
        }
    }

    /// Apply the outcome of the in-flight attempt
    pub fn on_attempt_finished(self, succeeded: bool, strategy: &RetryStrategy) -> Self {
        match self {
            DeliveryState::Attempting(_) if succeeded => DeliveryState::Done { delivered: true },
            DeliveryState::Attempting(n) if strategy.has_attempt_after(n) => {
                DeliveryState::Backoff(n)
            }
            DeliveryState::Attempting(_) => DeliveryState::Done { delivered: false },
            other => other,
        }
    }

    /// The backoff delay has elapsed
    pub fn on_backoff_elapsed(self) -> Self {
        match self {
            DeliveryState::Backoff(n) => DeliveryState::Attempting(n + 1),
            other => other,
        }
    }

    /// Give up without further attempts
    pub fn abandon(self) -> Self {
        match self {
            DeliveryState::Done { .. } => self,
            _ => DeliveryState::Done { delivered: false },
        }
    }
}
