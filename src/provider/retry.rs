//! Bounded retry for single provider requests

use std::future::Future;
use std::time::Duration;

use backoff::{future::retry, ExponentialBackoff};
use tracing::{debug, warn};

use crate::config::RetryConfig;
use crate::error::ProviderError;

/// Retries transient provider failures a fixed number of times
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
            max_delay: max_delay.max(base_delay),
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.max_attempts,
            Duration::from_millis(config.base_delay_ms),
            Duration::from_millis(config.max_delay_ms),
        )
    }

    /// Single attempt, no sleeping
    pub fn none() -> Self {
        Self::new(1, Duration::ZERO, Duration::ZERO)
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            current_interval: self.base_delay,
            initial_interval: self.base_delay,
            randomization_factor: 0.0,
            multiplier: 2.0,
            max_interval: self.max_delay,
            // Attempts are bounded by count, not elapsed time
            max_elapsed_time: None,
            ..Default::default()
        }
    }

    /// Run `op` until it succeeds, fails permanently, or runs out of attempts
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, ProviderError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, ProviderError>>,
    {
        let max_attempts = self.max_attempts;
        let max_delay = self.max_delay;
        let mut attempt = 0u32;

        retry(self.backoff(), || {
            attempt += 1;
            let current = attempt;
            let fut = op();
            async move {
                match fut.await {
                    Ok(value) => {
                        if current > 1 {
                            debug!("{} succeeded on attempt {}", label, current);
                        }
                        Ok(value)
                    }
                    Err(e) if e.is_retryable() && current < max_attempts => {
                        warn!("{} attempt {}/{} failed: {}", label, current, max_attempts, e);
                        match e.retry_after() {
                            Some(wait) => Err(backoff::Error::retry_after(e, wait.min(max_delay))),
                            None => Err(backoff::Error::transient(e)),
                        }
                    }
                    Err(e) => Err(backoff::Error::permanent(e)),
                }
            }
        })
        .await
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}
