//! Process-wide client configuration.
//!
//! `Options` is assembled once through `OptionsBuilder` and then shared
//! read-only (behind an `Arc`) by every service client. Fields the builder
//! leaves unset are filled from the environment and built-in defaults:
//!
//! - token: `UNIKRAFTCLOUD_TOKEN`, `KRAFTCLOUD_TOKEN`, `KC_TOKEN`, `UKC_TOKEN`
//! - metro: `fra0`
//! - timeout: 30 s
//! - retries: 5
//! - transport: [`ReqwestTransport::new`]
//!
//! `retry_idempotent(true)` wraps the resolved transport in a
//! [`RetryTransport`] sized from the retry budget.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::http::{ReqwestTransport, Transport};
use crate::retry::{RetryPolicy, RetryTransport};

/// Metro used when none is configured.
pub const DEFAULT_METRO: &str = "fra0";

/// Per-request timeout used when none is configured.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Retry budget handed to retry middleware when none is configured.
pub const DEFAULT_RETRIES: u32 = 5;

/// API URL template. `{metro}` is replaced by the effective metro code.
pub const DEFAULT_BASE_URL: &str = "https://api.{metro}.kraft.cloud/v1";

/// Token environment variables, highest precedence first.
pub const TOKEN_ENV_VARS: [&str; 4] = [
    "UNIKRAFTCLOUD_TOKEN",
    "KRAFTCLOUD_TOKEN",
    "KC_TOKEN",
    "UKC_TOKEN",
];

/// Frozen configuration shared by every client of one façade.
#[derive(Clone)]
pub struct Options {
    token: String,
    metro: String,
    timeout: Duration,
    retries: u32,
    base_url: String,
    transport: Arc<dyn Transport>,
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Options")
            .field("token", &if self.token.is_empty() { "" } else { "<redacted>" })
            .field("metro", &self.metro)
            .field("timeout", &self.timeout)
            .field("retries", &self.retries)
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Options {
    pub fn builder() -> OptionsBuilder {
        OptionsBuilder::default()
    }

    /// Options with every field taken from the environment or defaults.
    pub fn from_env() -> Result<Self> {
        OptionsBuilder::default().build()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn metro(&self) -> &str {
        &self.metro
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Retry budget for [`RetryTransport`]. Dispatch itself never retries.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }
}

/// Ordered setters applied to an empty configuration.
#[derive(Default)]
pub struct OptionsBuilder {
    token: Option<String>,
    metro: Option<String>,
    timeout: Option<Duration>,
    retries: Option<u32>,
    base_url: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    retry_idempotent: bool,
}

impl OptionsBuilder {
    pub fn token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    pub fn metro(mut self, metro: impl Into<String>) -> Self {
        self.metro = Some(metro.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = Some(retries);
        self
    }

    /// Override the API URL template. May contain `{metro}`.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into());
        self
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Retry GET and PUT up to `retries` times on the resolved transport.
    pub fn retry_idempotent(mut self, enabled: bool) -> Self {
        self.retry_idempotent = enabled;
        self
    }

    /// Fill unset fields from the process environment and defaults.
    pub fn build(self) -> Result<Options> {
        self.build_with_env(|key| std::env::var(key).ok())
    }

    /// Like [`OptionsBuilder::build`] with an explicit environment lookup.
    pub fn build_with_env<F>(self, env: F) -> Result<Options>
    where
        F: Fn(&str) -> Option<String>,
    {
        let token = match self.token {
            Some(token) => token,
            None => TOKEN_ENV_VARS
                .iter()
                .filter_map(|key| env(key))
                .find(|value| !value.is_empty())
                .unwrap_or_default(),
        };

        let metro = self
            .metro
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| DEFAULT_METRO.to_string());

        let retries = self.retries.unwrap_or(DEFAULT_RETRIES);
        let mut transport: Arc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Arc::new(ReqwestTransport::new()?),
        };
        if self.retry_idempotent {
            transport = Arc::new(RetryTransport::new(transport, RetryPolicy::new(retries)));
        }

        Ok(Options {
            token,
            metro,
            timeout: self.timeout.unwrap_or(DEFAULT_TIMEOUT),
            retries,
            base_url: self
                .base_url
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string()),
            transport,
        })
    }
}
