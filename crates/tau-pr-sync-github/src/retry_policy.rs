//! Backoff schedule for GitHub requests that failed with a transient
//! [`PlatformError`](tau_pr_sync::PlatformError).

use std::time::Duration;

use reqwest::header::{HeaderMap, RETRY_AFTER};

const MAX_BACKOFF: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total sends per request, first one included. Never below 1.
    pub max_attempts: usize,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: usize, base_delay_ms: u64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(base_delay_ms.max(1)),
        }
    }

    /// Whether a request whose `attempt`-th send (1-based) failed may be sent again.
    pub fn allows_retry(&self, attempt: usize) -> bool {
        attempt < self.max_attempts
    }

    /// Sleep after the `attempt`-th failed send. Doubles per attempt up to
    /// [`MAX_BACKOFF`]; a server hint is honored but never undercuts the base delay.
    pub fn backoff(&self, attempt: usize, server_hint: Option<Duration>) -> Duration {
        if let Some(hint) = server_hint {
            return hint.max(self.base_delay);
        }
        let doublings = attempt.saturating_sub(1).min(10) as u32;
        self.base_delay
            .saturating_mul(1_u32 << doublings)
            .min(MAX_BACKOFF)
    }
}

/// `Retry-After` in its delta-seconds form; HTTP dates are ignored.
pub fn retry_after_hint(headers: &HeaderMap) -> Option<Duration> {
    let seconds = headers.get(RETRY_AFTER)?.to_str().ok()?.trim();
    seconds.parse::<u64>().ok().map(Duration::from_secs)
}

/// First `max_chars` characters of a response body, for error messages.
pub fn body_excerpt(body: &str, max_chars: usize) -> String {
    match body.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}...", &body[..cut]),
        None => body.to_string(),
    }
}
