//! Per-call request construction and dispatch.
//!
//! # Design
//! `RequestBuilder` pairs the shared `Options` with three optional per-call
//! overrides (metro, transport, timeout). Overrides never mutate: each
//! `with_*` returns a fresh builder, so one builder can be shared by any
//! number of concurrent callers without locks.
//!
//! A call is split the same way as a hand-executed round trip would be:
//! [`RequestBuilder::build_request`] produces an `HttpRequest`,
//! the effective transport executes it, and [`parse_response`] turns the
//! `HttpResponse` into an `Envelope`. [`RequestBuilder::dispatch`] chains
//! the three under the caller's cancellation token and the effective
//! timeout.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::envelope::Envelope;
use crate::error::{Error, Result, TransportError};
use crate::http::{HttpMethod, HttpRequest, HttpResponse, Transport};
use crate::options::Options;

/// Immutable handle combining shared options with per-call overrides.
#[derive(Clone)]
pub struct RequestBuilder {
    options: Arc<Options>,
    metro: Option<String>,
    transport: Option<Arc<dyn Transport>>,
    timeout: Option<Duration>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("metro", &self.metro())
            .field("timeout", &self.timeout())
            .field("custom_transport", &self.transport.is_some())
            .finish()
    }
}

impl RequestBuilder {
    pub fn new(options: Arc<Options>) -> Self {
        Self {
            options,
            metro: None,
            transport: None,
            timeout: None,
        }
    }

    /// Copy routed to `metro`. An empty string falls back to the default.
    pub fn with_metro(&self, metro: impl Into<String>) -> Self {
        let metro = metro.into();
        Self {
            metro: (!metro.is_empty()).then_some(metro),
            ..self.clone()
        }
    }

    pub fn with_transport(&self, transport: Arc<dyn Transport>) -> Self {
        Self {
            transport: Some(transport),
            ..self.clone()
        }
    }

    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self.clone()
        }
    }

    pub fn options(&self) -> &Arc<Options> {
        &self.options
    }

    /// Effective metro code.
    pub fn metro(&self) -> &str {
        self.metro.as_deref().unwrap_or(self.options.metro())
    }

    /// Effective per-request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(self.options.timeout())
    }

    /// Effective transport.
    pub fn transport(&self) -> &Arc<dyn Transport> {
        self.transport.as_ref().unwrap_or(self.options.transport())
    }

    /// Absolute URL for `path` under the effective metro. `path` is a trusted
    /// constant and is appended without encoding.
    pub fn resolve_url(&self, path: &str) -> String {
        let base = self.options.base_url().replace("{metro}", self.metro());
        format!("{base}{path}")
    }

    /// Describe the request for `path` with the authentication headers set.
    pub fn build_request(&self, method: HttpMethod, path: &str, body: Option<String>) -> HttpRequest {
        HttpRequest {
            method,
            url: self.resolve_url(path),
            headers: vec![
                (
                    "Authorization".to_string(),
                    format!("Bearer {}", self.options.token()),
                ),
                ("Content-Type".to_string(), "application/json".to_string()),
            ],
            body,
        }
    }

    /// Send one request and decode the envelope.
    ///
    /// The call is abandoned as soon as `cancel` fires or the effective
    /// timeout elapses. Nothing is retried here.
    #[instrument(skip(self, cancel, body), fields(metro = %self.metro()))]
    pub async fn dispatch<T: DeserializeOwned>(
        &self,
        cancel: &CancellationToken,
        method: HttpMethod,
        path: &str,
        body: Option<String>,
    ) -> Result<Envelope<T>> {
        let request = self.build_request(method, path, body);
        let timeout = self.timeout();
        debug!(url = %request.url, "sending request");

        let send = self.transport().send(request);
        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(TransportError::Cancelled.into()),
            result = tokio::time::timeout(timeout, send) => match result {
                Ok(response) => response?,
                Err(_) => return Err(TransportError::TimedOut(timeout).into()),
            },
        };
        debug!(status = response.status, "received response");

        let envelope: Envelope<T> = parse_response(response)?;
        if envelope.is_failure() {
            warn!(
                status = ?envelope.status,
                message = envelope.message.as_deref().unwrap_or_default(),
                "API reported failure"
            );
        }
        Ok(envelope)
    }
}

/// Serialize a request payload.
pub fn json_body<B: Serialize + ?Sized>(body: &B) -> Result<String> {
    serde_json::to_string(body).map_err(|e| Error::Serialization(e.to_string()))
}

/// Map a non-200 status to [`Error::Http`], otherwise decode the envelope.
pub fn parse_response<T: DeserializeOwned>(response: HttpResponse) -> Result<Envelope<T>> {
    if response.status != 200 {
        return Err(Error::Http {
            status: response.status,
            body: response.body,
        });
    }
    Envelope::from_json(&response.body)
}
