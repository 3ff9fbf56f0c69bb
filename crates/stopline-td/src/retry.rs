//! Bounded retry on exchange rate limits.
//!
//! Exchanges cap order placement per sliding window. The cap is routinely hit
//! when an entry fill is immediately followed by its protective stop, so stop
//! and OCO placement go through [`retry_on_rate_limit`]: on a rate-limit
//! failure sleep a fixed interval and try again, up to `max_attempts` calls in
//! total. Any other failure, or the last rate-limit failure, is returned as is.

use std::future::Future;
use std::time::Duration;

use stopline_core::config::RateLimitConfig;
use tracing::{debug, warn};

use crate::error::ExchangeError;

/// Fixed-interval retry policy for rate-limited calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    /// Pause between attempts. Must clear the exchange's rate window.
    pub retry_after: Duration,
    /// Total number of calls, including the first.
    pub max_attempts: u32,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self { retry_after: Duration::from_secs(config.retry_after_secs), max_attempts: config.max_attempts.max(1) }
    }
}

impl RateLimitPolicy {
    /// Seconds a caller should wait before resubmitting a rate-limited request.
    pub fn retry_after_seconds(&self) -> u64 {
        self.retry_after.as_secs()
    }
}

/// Run `operation`, retrying only on rate-limit failures.
///
/// `label` names the operation in log lines.
pub async fn retry_on_rate_limit<T, F, Fut>(
    policy: &RateLimitPolicy,
    label: &str,
    mut operation: F,
) -> Result<T, ExchangeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ExchangeError>>,
{
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("[retry] {label} succeeded on attempt {attempt}");
                }
                return Ok(value);
            }
            Err(e) if e.is_rate_limit() && attempt < policy.max_attempts => {
                warn!(
                    "[retry] {label} rate limited (attempt {attempt}/{}), sleeping {}s: {e}",
                    policy.max_attempts,
                    policy.retry_after.as_secs()
                );
                tokio::time::sleep(policy.retry_after).await;
                attempt += 1;
            }
            Err(e) => {
                if e.is_rate_limit() {
                    warn!("[retry] {label} still rate limited after {attempt} attempts");
                }
                return Err(e);
            }
        }
    }
}
