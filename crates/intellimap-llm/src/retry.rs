use std::future::Future;
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::LlmError;

/// Retry schedule for HTTP 429 responses. Other statuses are never retried.
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateLimitRetry {
    pub max_retries: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl RateLimitRetry {
    pub const DEFAULT: Self = Self {
        max_retries: 3,
        base: Duration::from_secs(1),
        cap: Duration::from_secs(30),
    };

    /// `Retry-After` seconds when the server sends them, else `base * 2^attempt`;
    /// never longer than `cap`.
    pub fn delay(&self, retry_after: Option<&str>, attempt: u32) -> Duration {
        let wanted = retry_after
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or_else(
                || self.base.saturating_mul(1 << attempt.min(16)),
                Duration::from_secs,
            );
        wanted.min(self.cap)
    }

    /// Run `send` until it returns something other than 429.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::RateLimited`] once retries are used up and
    /// [`LlmError::Http`] on transport failure.
    pub async fn send<F, Fut>(
        &self,
        provider: &str,
        mut send: F,
    ) -> Result<reqwest::Response, LlmError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<reqwest::Response, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            let response = send().await?;
            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            if attempt >= self.max_retries {
                return Err(LlmError::RateLimited);
            }
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok());
            let delay = self.delay(retry_after, attempt);
            attempt += 1;
            tracing::warn!(
                provider,
                attempt,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "rate limited"
            );
            tokio::time::sleep(delay).await;
        }
    }
}
