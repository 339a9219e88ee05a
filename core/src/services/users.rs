//! Per-user quotas.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::client::ServiceClient;
use crate::envelope::{ApiItem, ResponseCommon};
use crate::error::Result;
use crate::http::HttpMethod;
use crate::request::RequestBuilder;

/// Resource counters, used both for current usage and hard limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuotaUsage {
    pub instances: u64,
    pub live_instances: u64,
    pub live_memory_mb: u64,
    pub service_groups: u64,
    pub services: u64,
    pub volumes: u64,
    pub total_volume_mb: u64,
}

/// Per-object bounds the server enforces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct QuotaLimits {
    pub min_memory_mb: u64,
    pub max_memory_mb: u64,
    pub min_volume_mb: u64,
    pub max_volume_mb: u64,
    pub min_autoscale_size: u64,
    pub max_autoscale_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Quotas {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub used: QuotaUsage,
    #[serde(default)]
    pub hard: QuotaUsage,
    #[serde(default)]
    pub limits: QuotaLimits,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl Quotas {
    /// Instances that can still be created before hitting the hard limit.
    pub fn instances_left(&self) -> u64 {
        self.hard.instances.saturating_sub(self.used.instances)
    }
}

impl ApiItem for Quotas {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Debug, Clone)]
pub struct UsersClient {
    request: RequestBuilder,
}

impl ServiceClient for UsersClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

impl UsersClient {
    /// Quotas of the user the token belongs to.
    pub async fn quotas(&self, cancel: &CancellationToken) -> Result<Quotas> {
        self.request
            .dispatch::<Quotas>(cancel, HttpMethod::Get, "/users/quotas", None)
            .await?
            .into_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Envelope;

    #[test]
    fn quotas_decode_with_missing_counters() {
        let env: Envelope<Quotas> = Envelope::from_json(
            r#"{"status":"success","data":{"quotas":[{"uuid":"u",
                "used":{"instances":3,"live_memory_mb":384},
                "hard":{"instances":16,"live_memory_mb":4096},
                "limits":{"min_memory_mb":16,"max_memory_mb":2048}}]}}"#,
        )
        .unwrap();
        let quotas = env.into_first().unwrap();
        assert_eq!(quotas.used.instances, 3);
        assert_eq!(quotas.used.volumes, 0);
        assert_eq!(quotas.limits.max_memory_mb, 2048);
        assert_eq!(quotas.instances_left(), 13);
    }
}
