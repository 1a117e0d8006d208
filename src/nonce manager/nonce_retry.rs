use super::nonce_errors::{NonceError, NonceResult};
use crate::metrics::metrics;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

/// Retry configuration with jitter
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts (including initial attempt)
    pub max_attempts: u32,
    /// Base backoff delay in milliseconds
    pub base_backoff_ms: u64,
    /// Maximum backoff delay in milliseconds
    pub max_backoff_ms: u64,
    /// Jitter factor (0.0 to 1.0) - adds randomness to backoff
    pub jitter_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff_ms: 100,
            max_backoff_ms: 5000,
            jitter_factor: 0.2,
        }
    }
}

impl RetryConfig {
    /// Single attempt, used where a resend could double-spend
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Calculate backoff delay for a given attempt (0-indexed)
    pub(crate) fn calculate_backoff(&self, attempt: u32) -> Duration {
        let exp_backoff = (self.base_backoff_ms as f64) * 2_f64.powi(attempt as i32);
        let capped_backoff = exp_backoff.min(self.max_backoff_ms as f64);

        let jitter_range = capped_backoff * self.jitter_factor;
        let jitter = if jitter_range > 0.0 {
            rand::thread_rng().gen_range(-jitter_range..=jitter_range)
        } else {
            0.0
        };
        let final_backoff = (capped_backoff + jitter).max(0.0);

        Duration::from_millis(final_backoff as u64)
    }
}

/// Retry an async operation, backing off between transient failures.
///
/// Permanent errors (see [`NonceError::is_transient`]) are returned immediately.
pub async fn retry_with_backoff<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    mut operation: F,
) -> NonceResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = NonceResult<T>>,
{
    let start_time = Instant::now();
    let mut last_error = None;

    for attempt in 0..config.max_attempts {
        if attempt > 0 {
            metrics().rpc_retries.inc();
            debug!(
                operation = operation_name,
                attempt = attempt + 1,
                max_attempts = config.max_attempts,
                "Retrying operation"
            );
        }

        match operation().await {
            Ok(result) => {
                if attempt > 0 {
                    debug!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        duration_ms = start_time.elapsed().as_millis() as u64,
                        "Operation succeeded after retry"
                    );
                }
                return Ok(result);
            }
            Err(err) => {
                if !err.is_transient() {
                    warn!(
                        operation = operation_name,
                        error = %err,
                        "Permanent error, not retrying"
                    );
                    return Err(err);
                }

                if attempt + 1 < config.max_attempts {
                    let backoff = config.calculate_backoff(attempt);
                    debug!(
                        operation = operation_name,
                        attempt = attempt + 1,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %err,
                        "Transient error, backing off before retry"
                    );
                    last_error = Some(err);
                    sleep(backoff).await;
                } else {
                    warn!(
                        operation = operation_name,
                        attempts = attempt + 1,
                        error = %err,
                        "All retry attempts exhausted"
                    );
                    last_error = Some(err);
                }
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| NonceError::Internal("Retry exhausted without error".to_string())))
}

/// Fixed-delay polling budget for reads that are eventually consistent
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Delay before the first read
    pub initial_delay: Duration,
    /// Delay between reads
    pub interval: Duration,
    /// Maximum number of reads
    pub max_attempts: u32,
    /// Overall deadline, measured from the call
    pub timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            interval: Duration::from_millis(500),
            max_attempts: 120,
            timeout: Duration::from_secs(90),
        }
    }
}

/// Outcome of a successful poll
#[derive(Debug, Clone)]
pub struct PollOutcome<T> {
    pub value: T,
    pub attempts: u32,
}

/// Poll `read` until it yields `Some`, sleeping `interval` between reads.
///
/// Transient read errors count as a miss. Returns `NonceError::NotMaterialized`
/// once `max_attempts` reads came back empty, or `NonceError::Timeout` when the
/// deadline passes first.
pub async fn poll_until_some<F, Fut, T>(
    account: solana_sdk::pubkey::Pubkey,
    config: &PollConfig,
    mut read: F,
) -> NonceResult<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = NonceResult<Option<T>>>,
{
    if config.max_attempts == 0 {
        return Err(NonceError::Configuration(
            "poll max_attempts must be at least 1".to_string(),
        ));
    }

    let started = Instant::now();
    let timer = metrics().nonce_poll_latency.start_timer();
    sleep(config.initial_delay).await;

    let mut attempts = 0;
    loop {
        attempts += 1;
        metrics().nonce_poll_attempts.inc();

        match read().await {
            Ok(Some(value)) => {
                timer.observe_duration();
                debug!(account = %account, attempts, "Account observed");
                return Ok(PollOutcome { value, attempts });
            }
            Ok(None) => {
                warn!(account = %account, attempt = attempts, "Nonce: not visible yet, retrying");
            }
            Err(err) if err.is_transient() => {
                warn!(account = %account, attempt = attempts, error = %err, "Nonce: read failed, retrying");
            }
            Err(err) => {
                timer.stop_and_discard();
                return Err(err);
            }
        }

        if attempts >= config.max_attempts {
            timer.stop_and_discard();
            return Err(NonceError::NotMaterialized { account, attempts });
        }

        let elapsed = started.elapsed();
        if elapsed + config.interval > config.timeout {
            timer.stop_and_discard();
            return Err(NonceError::Timeout(config.timeout.as_millis() as u64));
        }

        sleep(config.interval).await;
    }
}
