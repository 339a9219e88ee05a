//! Points of presence.
//!
//! The metro set is built in; there is no API endpoint that lists it.
//! [`MetrosClient::status`] probes one metro by reading the caller's quotas
//! there.

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::users::Quotas;
use crate::client::ServiceClient;
use crate::error::{Error, Result, TransportError};
use crate::http::HttpMethod;
use crate::request::RequestBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Metro {
    pub code: &'static str,
    pub location: &'static str,
}

pub const METROS: [Metro; 4] = [
    Metro {
        code: "fra0",
        location: "Frankfurt, DE",
    },
    Metro {
        code: "dal0",
        location: "Dallas, TX",
    },
    Metro {
        code: "sin0",
        location: "Singapore",
    },
    Metro {
        code: "was1",
        location: "Washington, DC",
    },
];

/// Result of probing one metro.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetroStatus {
    pub code: String,
    pub online: bool,
}

#[derive(Debug, Clone)]
pub struct MetrosClient {
    request: RequestBuilder,
}

impl ServiceClient for MetrosClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

impl MetrosClient {
    /// Built-in metros. No I/O.
    pub fn list(&self) -> &'static [Metro] {
        &METROS
    }

    pub fn find(&self, code: &str) -> Option<&'static Metro> {
        METROS.iter().find(|m| m.code == code)
    }

    /// Whether `code` answers API requests. Transport failures count as
    /// offline; HTTP and envelope errors are returned as errors.
    pub async fn status(&self, cancel: &CancellationToken, code: &str) -> Result<MetroStatus> {
        if code.is_empty() {
            return Err(Error::Validation("metro code must not be empty".to_string()));
        }
        let probe = self
            .request
            .with_metro(code)
            .dispatch::<Quotas>(cancel, HttpMethod::Get, "/users/quotas", None)
            .await;
        let online = match probe {
            Ok(_) => true,
            Err(Error::Transport(err)) if !matches!(err, TransportError::Cancelled) => {
                debug!(metro = code, error = %err, "metro unreachable");
                false
            }
            Err(err) => return Err(err),
        };
        Ok(MetroStatus {
            code: code.to_string(),
            online,
        })
    }
}
