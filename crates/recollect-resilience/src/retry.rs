// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Bounded exponential backoff with a per-attempt timeout.

use std::future::Future;
use std::time::Duration;

use recollect_config::model::RetryConfig;
use recollect_core::{ProviderError, ProviderErrorKind, RecollectError};
use tracing::warn;

/// How many times to call a provider and how long to wait in between.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts including the first call. Always at least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Deadline for a single attempt. Expiry counts as a retryable timeout.
    pub attempt_timeout: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(250),
            max_backoff: Duration::from_secs(4),
            multiplier: 2.0,
            attempt_timeout: None,
        }
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig, attempt_timeout: Option<Duration>) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            multiplier: config.multiplier,
            attempt_timeout,
        }
    }

    /// A single attempt, no waiting.
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Delay after the given (1-based) failed attempt:
    /// `initial * multiplier^(attempt - 1)`, capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(i32::MAX as u32) as i32;
        let secs = self.initial_backoff.as_secs_f64() * self.multiplier.powi(exponent);
        let capped = secs.min(self.max_backoff.as_secs_f64());
        if capped.is_finite() && capped >= 0.0 {
            Duration::from_secs_f64(capped)
        } else {
            self.max_backoff
        }
    }
}

/// Runs `op` until it succeeds, fails with a non-retryable error, or the
/// attempt budget is spent.
///
/// `op` receives the 1-based attempt number. Exhaustion is reported as
/// [`RecollectError::ProviderUnavailable`] carrying the last provider error.
pub async fn retry<T, F, Fut>(
    policy: &RetryPolicy,
    provider: &str,
    operation: &str,
    mut op: F,
) -> Result<T, RecollectError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, RecollectError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let outcome = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, op(attempt)).await {
                Ok(result) => result,
                Err(_) => Err(ProviderError::new(
                    ProviderErrorKind::Timeout,
                    provider,
                    format!("{operation} exceeded {limit:?}"),
                )
                .into()),
            },
            None => op(attempt).await,
        };

        let err = match outcome {
            Ok(value) => return Ok(value),
            Err(RecollectError::Provider(err)) if err.is_retryable() => err,
            Err(other) => return Err(other),
        };

        if attempt >= max_attempts {
            warn!(
                provider = %err.provider,
                operation,
                attempts = attempt,
                kind = %err.kind,
                correlation_id = ?err.correlation_id,
                "retry budget exhausted"
            );
            return Err(RecollectError::ProviderUnavailable {
                provider: err.provider.clone(),
                attempts: attempt,
                last: Box::new(err),
            });
        }

        let delay = policy.backoff_for(attempt);
        warn!(
            provider = %err.provider,
            operation,
            attempt,
            kind = %err.kind,
            correlation_id = ?err.correlation_id,
            delay_ms = delay.as_millis() as u64,
            "transient provider error, will retry"
        );
        tokio::time::sleep(delay).await;
    }
}
