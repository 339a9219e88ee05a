//! Retry middleware around any [`Transport`].
//!
//! Dispatch never retries on its own. Callers who want retries wrap their
//! transport in `RetryTransport`, either by hand, through
//! [`RetryTransport::from_options`], or with
//! `OptionsBuilder::retry_idempotent`. The last two size the budget from
//! `Options::retries`.
//! Only idempotent verbs (GET, PUT) are repeated; POST and DELETE go out
//! exactly once.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::TransportError;
use crate::http::{HttpRequest, HttpResponse, Transport};
use crate::options::Options;

const BASE_DELAY: Duration = Duration::from_millis(100);
const MAX_DELAY: Duration = Duration::from_secs(5);

/// Backoff schedule: `base * 2^attempt`, capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            base_delay: BASE_DELAY,
            max_delay: MAX_DELAY,
        }
    }

    /// Default backoff with the budget configured in `options`.
    pub fn from_options(options: &Options) -> Self {
        Self::new(options.retries())
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..600).contains(&status)
}

fn is_retryable_error(err: &TransportError) -> bool {
    matches!(err, TransportError::Request(_) | TransportError::Body(_))
}

/// Transport that repeats failed idempotent requests with backoff.
pub struct RetryTransport {
    inner: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryTransport {
    pub fn new(inner: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Wrap the transport configured in `options` with its retry budget.
    pub fn from_options(options: &Options) -> Self {
        Self::new(Arc::clone(options.transport()), RetryPolicy::from_options(options))
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }
}

#[async_trait]
impl Transport for RetryTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        if !request.method.is_idempotent() {
            return self.inner.send(request).await;
        }

        let mut attempt = 0;
        loop {
            let result = self.inner.send(request.clone()).await;
            let retry = match &result {
                Ok(response) => is_retryable_status(response.status),
                Err(err) => is_retryable_error(err),
            };
            if !retry || attempt >= self.policy.max_retries {
                return result;
            }

            let delay = self.policy.delay(attempt);
            debug!(attempt, ?delay, method = %request.method, "retrying request");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
