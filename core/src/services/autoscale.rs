//! Autoscale configurations and their policies.
//!
//! # Design
//! Policies are a tagged union keyed on `type`. Decoding reads the object
//! once as JSON, looks at the discriminator, and hands the object to the
//! matching variant. An unrecognized discriminator is an error naming the
//! value; there is no catch-all variant.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use super::{by_identifiers, require, with_body, ObjectRef};
use crate::client::ServiceClient;
use crate::envelope::{ApiItem, Envelope, ResponseCommon};
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::identifier::{classify, Identifier, IdentifierKind};
use crate::request::RequestBuilder;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    Cpu,
    Inflight,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdjustmentType {
    Change,
    Exact,
    Percent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
    pub adjustment: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lower_bound: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upper_bound: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepPolicy {
    pub name: String,
    pub metric: Metric,
    pub adjustment_type: AdjustmentType,
    pub steps: Vec<Step>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnDemandPolicy {
    pub name: String,
}

/// A scaling policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Policy {
    Step(StepPolicy),
    OnDemand(OnDemandPolicy),
}

impl Policy {
    pub fn name(&self) -> &str {
        match self {
            Policy::Step(p) => &p.name,
            Policy::OnDemand(p) => &p.name,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Policy::Step(_) => "step",
            Policy::OnDemand(_) => "on-demand",
        }
    }

    fn validate(&self) -> Result<()> {
        require(self.name(), "policy name")?;
        if let Policy::Step(step) = self {
            if step.steps.is_empty() {
                return Err(Error::Validation("a step policy needs at least one step".to_string()));
            }
        }
        Ok(())
    }
}

impl TryFrom<Value> for Policy {
    type Error = Error;

    fn try_from(value: Value) -> Result<Self> {
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::Decode("autoscale policy without a type".to_string()))?
            .to_string();
        match kind.as_str() {
            "step" => Ok(Policy::Step(serde_json::from_value(value)?)),
            "on-demand" => Ok(Policy::OnDemand(serde_json::from_value(value)?)),
            _ => Err(Error::UnknownPolicyType(kind)),
        }
    }
}

impl<'de> Deserialize<'de> for Policy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        Policy::try_from(value).map_err(de::Error::custom)
    }
}

/// Policy item as returned by the policies endpoints. Failed items may carry
/// only the common header, so the policy itself is optional.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyEntry {
    pub name: String,
    pub policy: Option<Policy>,
    pub common: ResponseCommon,
}

impl<'de> Deserialize<'de> for PolicyEntry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Value::deserialize(deserializer)?;
        let common: ResponseCommon = serde_json::from_value(value.clone()).map_err(de::Error::custom)?;
        let name = value
            .get("name")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let policy = match value.get("type") {
            Some(_) => Some(Policy::try_from(value).map_err(de::Error::custom)?),
            None => None,
        };
        Ok(PolicyEntry { name, policy, common })
    }
}

impl ApiItem for PolicyEntry {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateAutoscaleConfigurationRequest {
    /// Service group to scale.
    #[serde(flatten)]
    pub service_group: Identifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warmup_time_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cooldown_time_ms: Option<u64>,
    /// Template instance new replicas are cloned from.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub master: Option<Identifier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<Policy>,
}

impl CreateAutoscaleConfigurationRequest {
    fn validate(&self) -> Result<()> {
        require(self.service_group.as_str(), "service group identifier")?;
        if self.max_size == Some(0) {
            return Err(Error::Validation("max_size must be at least 1".to_string()));
        }
        if let (Some(min), Some(max)) = (self.min_size, self.max_size) {
            if min > max {
                return Err(Error::Validation(format!(
                    "min_size {min} exceeds max_size {max}"
                )));
            }
        }
        self.policies.iter().try_for_each(Policy::validate)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct AutoscaleConfiguration {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub enabled: Option<bool>,
    #[serde(default)]
    pub min_size: Option<u32>,
    #[serde(default)]
    pub max_size: Option<u32>,
    #[serde(default)]
    pub warmup_time_ms: Option<u64>,
    #[serde(default)]
    pub cooldown_time_ms: Option<u64>,
    #[serde(default)]
    pub master: Option<ObjectRef>,
    #[serde(default)]
    pub policies: Vec<Policy>,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl ApiItem for AutoscaleConfiguration {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Serialize)]
struct PolicyName<'a> {
    name: &'a str,
}

#[derive(Debug, Clone)]
pub struct AutoscaleClient {
    request: RequestBuilder,
}

impl ServiceClient for AutoscaleClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

fn policies_path(service_uuid: &str) -> Result<String> {
    require(service_uuid, "service group UUID")?;
    if !crate::identifier::is_uuid(service_uuid) {
        return Err(Error::Validation(format!(
            "{service_uuid:?} is not a service group UUID"
        )));
    }
    Ok(format!("/services/{service_uuid}/autoscale/policies"))
}

impl AutoscaleClient {
    pub async fn create_configuration(
        &self,
        cancel: &CancellationToken,
        req: &CreateAutoscaleConfigurationRequest,
    ) -> Result<AutoscaleConfiguration> {
        req.validate()?;
        with_body::<AutoscaleConfiguration, _>(
            &self.request,
            cancel,
            HttpMethod::Post,
            "/services/autoscale",
            &[req],
        )
        .await?
        .into_first()
    }

    pub async fn get_configuration<I, S>(
        &self,
        cancel: &CancellationToken,
        ids: I,
    ) -> Result<Envelope<AutoscaleConfiguration>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(
            &self.request,
            cancel,
            HttpMethod::Get,
            "/services/autoscale",
            ids,
            IdentifierKind::Detect,
        )
        .await
    }

    pub async fn delete_configuration<I, S>(
        &self,
        cancel: &CancellationToken,
        ids: I,
    ) -> Result<Envelope<AutoscaleConfiguration>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(
            &self.request,
            cancel,
            HttpMethod::Delete,
            "/services/autoscale",
            ids,
            IdentifierKind::Detect,
        )
        .await
    }

    pub async fn add_policy(
        &self,
        cancel: &CancellationToken,
        service_uuid: &str,
        policy: &Policy,
    ) -> Result<PolicyEntry> {
        let path = policies_path(service_uuid)?;
        policy.validate()?;
        with_body::<PolicyEntry, _>(&self.request, cancel, HttpMethod::Post, &path, &[policy])
            .await?
            .into_first()
    }

    pub async fn get_policies<I, S>(
        &self,
        cancel: &CancellationToken,
        service_uuid: &str,
        names: I,
    ) -> Result<Envelope<PolicyEntry>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = policies_path(service_uuid)?;
        let names = classify(names, IdentifierKind::Name)?;
        let items: Vec<PolicyName<'_>> = names.iter().map(|n| PolicyName { name: n.as_str() }).collect();
        with_body(&self.request, cancel, HttpMethod::Get, &path, &items).await
    }

    pub async fn delete_policies<I, S>(
        &self,
        cancel: &CancellationToken,
        service_uuid: &str,
        names: I,
    ) -> Result<Envelope<PolicyEntry>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let path = policies_path(service_uuid)?;
        let names = classify(names, IdentifierKind::Name)?;
        let items: Vec<PolicyName<'_>> = names.iter().map(|n| PolicyName { name: n.as_str() }).collect();
        with_body(&self.request, cancel, HttpMethod::Delete, &path, &items).await
    }
}
