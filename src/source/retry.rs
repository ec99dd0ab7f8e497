use std::future::Future;
use std::sync::Mutex;
use std::time::Instant;

use anyhow::{anyhow, Result};
use rand::Rng;
use tokio::time::{sleep, Duration};

use crate::logging::log_fetch_attempt_failed;

/// Retry policy shared by every outbound call.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
    pub max_delay_ms: u64,
    pub jitter_factor: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            base_delay_ms: 500,
            multiplier: 2.0,
            max_delay_ms: 10_000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryPolicy {
    /// Delay after the failed `attempt` (0-based): exponential backoff with
    /// jitter, clamped to `max_delay_ms`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let base = self.base_delay_ms as f64 * self.multiplier.max(1.0).powi(attempt as i32);
        let clamped = base.min(self.max_delay_ms as f64);

        let jitter_range = clamped * self.jitter_factor.clamp(0.0, 1.0);
        let jitter: f64 = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };

        Duration::from_millis((clamped + jitter).max(0.0) as u64)
    }
}

/// Errors from a single attempt, split by whether another attempt can help.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for anyhow::Error {
    fn is_retryable(&self) -> bool {
        match self.downcast_ref::<super::http::FetchError>() {
            Some(err) => err.is_retryable(),
            None => true,
        }
    }
}

/// Runs `operation` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is reached.
pub async fn retry_async<F, Fut, T>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.max_attempts.max(1);
    let mut last_error: Option<anyhow::Error> = None;

    for attempt in 0..attempts {
        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) => {
                let retryable = e.is_retryable();
                if retryable && attempt + 1 < attempts {
                    let delay = policy.delay_for_attempt(attempt);
                    log_fetch_attempt_failed(
                        operation_name,
                        attempt + 1,
                        attempts,
                        &e.to_string(),
                        delay.as_millis() as u64,
                    );
                    sleep(delay).await;
                    last_error = Some(e);
                } else {
                    return Err(e);
                }
            }
        }
    }

    Err(last_error.unwrap_or_else(|| anyhow!("{} exhausted without error", operation_name)))
}

/// Fixed minimum spacing between outbound calls.
#[derive(Debug)]
pub struct Pacer {
    min_gap: Duration,
    last_call: Mutex<Option<Instant>>,
}

impl Pacer {
    pub fn new(min_gap_ms: u64) -> Self {
        Self {
            min_gap: Duration::from_millis(min_gap_ms),
            last_call: Mutex::new(None),
        }
    }

    fn wait_needed(&self) -> Duration {
        let last = self.last_call.lock().ok().and_then(|g| *g);
        match last {
            Some(at) => self.min_gap.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    pub async fn pace(&self) {
        let wait = self.wait_needed();
        if !wait.is_zero() {
            sleep(wait).await;
        }
        if let Ok(mut last) = self.last_call.lock() {
            *last = Some(Instant::now());
        }
    }
}
