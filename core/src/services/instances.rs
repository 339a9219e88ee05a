//! Instances: create, inspect, start, stop, wait on and read the console of
//! server-side virtual machines.

use std::collections::BTreeMap;

use base64::Engine;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::service_groups::{Domain, DomainRequest, Service};
use super::{by_identifiers, require, trim_fqdn, with_body};
use crate::client::ServiceClient;
use crate::envelope::{ApiItem, Envelope, ResponseCommon};
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::identifier::{classify, Identifier, IdentifierKind};
use crate::request::RequestBuilder;

const PATH: &str = "/instances";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Stopped,
    Starting,
    Running,
    Draining,
    Stopping,
    Standby,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RestartPolicy {
    Never,
    Always,
    OnFailure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScaleToZeroPolicy {
    Off,
    On,
    Idle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScaleToZero {
    pub policy: ScaleToZeroPolicy,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stateful: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cooldown_time_ms: Option<u64>,
}

/// Service group to create or join when creating an instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceServiceGroup {
    /// Existing group to join. When unset a new group is created from
    /// `services` and `domains`.
    #[serde(flatten)]
    pub group: Option<Identifier>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<DomainRequest>,
}

/// Volume to attach (existing) or create (with `size_mb`) at boot.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InstanceVolumeRequest {
    #[serde(flatten)]
    pub volume: Option<Identifier>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_mb: Option<u64>,
    pub at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub readonly: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateInstanceRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub image: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub env: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vcpus: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service_group: Option<InstanceServiceGroup>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub volumes: Vec<InstanceVolumeRequest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub autostart: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replicas: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scale_to_zero: Option<ScaleToZero>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wait_timeout_ms: Option<u64>,
}

impl CreateInstanceRequest {
    pub fn new(image: impl Into<String>) -> Self {
        Self {
            image: image.into(),
            ..Self::default()
        }
    }

    fn validate(&self) -> Result<()> {
        require(&self.image, "image")?;
        if self.memory_mb == Some(0) {
            return Err(Error::Validation("memory_mb must be at least 1".to_string()));
        }
        if self.vcpus == Some(0) {
            return Err(Error::Validation("vcpus must be at least 1".to_string()));
        }
        if let Some(name) = &self.name {
            require(name, "name")?;
        }
        for volume in &self.volumes {
            require(&volume.at, "volume mount point")?;
            if volume.volume.is_none() && volume.size_mb.is_none() {
                return Err(Error::Validation(
                    "a volume needs either an identifier or a size".to_string(),
                ));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstanceServiceGroupInfo {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub domains: Vec<Domain>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstanceVolume {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub at: String,
    #[serde(default)]
    pub read_only: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct NetworkInterface {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub mac: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Instance {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub state: Option<InstanceState>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(default)]
    pub vcpus: Option<u32>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default, deserialize_with = "trim_fqdn")]
    pub fqdn: Option<String>,
    #[serde(default, deserialize_with = "trim_fqdn")]
    pub private_fqdn: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
    #[serde(default)]
    pub boot_time_us: Option<u64>,
    #[serde(default)]
    pub start_count: Option<u64>,
    #[serde(default)]
    pub restart_count: Option<u64>,
    #[serde(default)]
    pub restart_policy: Option<RestartPolicy>,
    #[serde(default)]
    pub service_group: Option<InstanceServiceGroupInfo>,
    #[serde(default)]
    pub volumes: Vec<InstanceVolume>,
    #[serde(default)]
    pub network_interfaces: Vec<NetworkInterface>,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl ApiItem for Instance {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct LogRange {
    #[serde(default)]
    pub start: i64,
    #[serde(default)]
    pub end: i64,
}

/// Console output of one instance.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct InstanceLog {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    /// Base64 on the wire; see [`InstanceLog::decoded`].
    #[serde(default)]
    pub output: String,
    #[serde(default)]
    pub available: Option<LogRange>,
    #[serde(default)]
    pub range: Option<LogRange>,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl InstanceLog {
    pub fn decoded(&self) -> Result<Vec<u8>> {
        base64::engine::general_purpose::STANDARD
            .decode(self.output.as_bytes())
            .map_err(|e| Error::Decode(format!("console output: {e}")))
    }
}

impl ApiItem for InstanceLog {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Serialize)]
struct StartItem<'a> {
    #[serde(flatten)]
    id: &'a Identifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    wait_timeout_ms: Option<u64>,
}

/// Options for [`InstancesClient::stop`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StopOptions {
    pub drain_timeout_ms: Option<u64>,
    pub force: bool,
}

#[derive(Serialize)]
struct StopItem<'a> {
    #[serde(flatten)]
    id: &'a Identifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    drain_timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    force: bool,
}

#[derive(Serialize)]
struct WaitItem<'a> {
    #[serde(flatten)]
    id: &'a Identifier,
    state: InstanceState,
    #[serde(skip_serializing_if = "Option::is_none")]
    timeout_ms: Option<u64>,
}

#[derive(Serialize)]
struct LogItem<'a> {
    #[serde(flatten)]
    id: &'a Identifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    limit: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct InstancesClient {
    request: RequestBuilder,
}

impl ServiceClient for InstancesClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

impl InstancesClient {
    pub async fn create(&self, cancel: &CancellationToken, req: &CreateInstanceRequest) -> Result<Instance> {
        req.validate()?;
        with_body::<Instance, _>(&self.request, cancel, HttpMethod::Post, PATH, req)
            .await?
            .into_first()
    }

    /// Details of the given instances, each identified by UUID or name.
    pub async fn get<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Get, PATH, ids, IdentifierKind::Detect).await
    }

    pub async fn get_by_uuids<I, S>(&self, cancel: &CancellationToken, uuids: I) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Get, PATH, uuids, IdentifierKind::Uuid).await
    }

    pub async fn get_by_names<I, S>(&self, cancel: &CancellationToken, names: I) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Get, PATH, names, IdentifierKind::Name).await
    }

    pub async fn list(&self, cancel: &CancellationToken) -> Result<Envelope<Instance>> {
        self.request
            .dispatch(cancel, HttpMethod::Get, "/instances/list", None)
            .await
    }

    pub async fn delete<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Delete, PATH, ids, IdentifierKind::Detect).await
    }

    pub async fn delete_by_uuids<I, S>(&self, cancel: &CancellationToken, uuids: I) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Delete, PATH, uuids, IdentifierKind::Uuid).await
    }

    pub async fn delete_by_names<I, S>(&self, cancel: &CancellationToken, names: I) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Delete, PATH, names, IdentifierKind::Name).await
    }

    /// Start stopped instances, optionally waiting up to `wait_timeout_ms`
    /// for them to reach `running` server-side.
    pub async fn start<I, S>(
        &self,
        cancel: &CancellationToken,
        ids: I,
        wait_timeout_ms: Option<u64>,
    ) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = classify(ids, IdentifierKind::Detect)?;
        let items: Vec<StartItem<'_>> = ids
            .iter()
            .map(|id| StartItem { id, wait_timeout_ms })
            .collect();
        with_body(&self.request, cancel, HttpMethod::Put, "/instances/start", &items).await
    }

    pub async fn stop<I, S>(
        &self,
        cancel: &CancellationToken,
        ids: I,
        options: StopOptions,
    ) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids = classify(ids, IdentifierKind::Detect)?;
        let items: Vec<StopItem<'_>> = ids
            .iter()
            .map(|id| StopItem {
                id,
                drain_timeout_ms: options.drain_timeout_ms,
                force: options.force,
            })
            .collect();
        with_body(&self.request, cancel, HttpMethod::Put, "/instances/stop", &items).await
    }

    /// Block server-side until every instance reaches `state` or
    /// `timeout_ms` passes. The client does no polling of its own.
    pub async fn wait<I, S>(
        &self,
        cancel: &CancellationToken,
        ids: I,
        state: InstanceState,
        timeout_ms: Option<u64>,
    ) -> Result<Envelope<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if state == InstanceState::Unknown {
            return Err(Error::Validation("cannot wait for an unknown state".to_string()));
        }
        let ids = classify(ids, IdentifierKind::Detect)?;
        let items: Vec<WaitItem<'_>> = ids
            .iter()
            .map(|id| WaitItem { id, state, timeout_ms })
            .collect();
        with_body(&self.request, cancel, HttpMethod::Get, "/instances/wait", &items).await
    }

    /// Console output of one instance starting at `offset` bytes.
    pub async fn logs(
        &self,
        cancel: &CancellationToken,
        id: &str,
        offset: Option<i64>,
        limit: Option<u64>,
    ) -> Result<InstanceLog> {
        require(id, "instance identifier")?;
        let id = Identifier::parse(id);
        let items = [LogItem {
            id: &id,
            offset,
            limit,
        }];
        with_body::<InstanceLog, _>(&self.request, cancel, HttpMethod::Get, "/instances/log", &items)
            .await?
            .into_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_serializes_nested_groups() {
        let mut req = CreateInstanceRequest::new("nginx:latest");
        req.memory_mb = Some(128);
        req.service_group = Some(InstanceServiceGroup {
            group: None,
            services: vec![Service {
                port: 443,
                destination_port: Some(80),
                handlers: Vec::new(),
            }],
            domains: Vec::new(),
        });
        req.volumes = vec![InstanceVolumeRequest {
            volume: Some(Identifier::parse("data")),
            size_mb: None,
            at: "/data".to_string(),
            readonly: Some(false),
        }];

        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({
                "image": "nginx:latest",
                "memory_mb": 128,
                "service_group": {"services": [{"port": 443, "destination_port": 80}]},
                "volumes": [{"name": "data", "at": "/data", "readonly": false}]
            })
        );
    }

    #[test]
    fn create_request_validation() {
        assert!(CreateInstanceRequest::new("img").validate().is_ok());
        assert!(CreateInstanceRequest::new("").validate().is_err());

        let mut req = CreateInstanceRequest::new("img");
        req.memory_mb = Some(0);
        assert!(matches!(req.validate(), Err(Error::Validation(_))));

        let mut req = CreateInstanceRequest::new("img");
        req.volumes = vec![InstanceVolumeRequest {
            at: "/data".to_string(),
            ..Default::default()
        }];
        assert!(matches!(req.validate(), Err(Error::Validation(_))));
    }

    #[test]
    fn per_item_options_are_flattened() {
        let id = Identifier::parse("00000000-0000-0000-0000-000000000001");
        let stop = StopItem {
            id: &id,
            drain_timeout_ms: Some(500),
            force: false,
        };
        assert_eq!(
            serde_json::to_value(&stop).unwrap(),
            serde_json::json!({"uuid": "00000000-0000-0000-0000-000000000001", "drain_timeout_ms": 500})
        );

        let name = Identifier::parse("web");
        let wait = WaitItem {
            id: &name,
            state: InstanceState::Running,
            timeout_ms: Some(1000),
        };
        assert_eq!(
            serde_json::to_value(&wait).unwrap(),
            serde_json::json!({"name": "web", "state": "running", "timeout_ms": 1000})
        );
    }

    #[test]
    fn instance_decodes_with_common_header() {
        let env: Envelope<Instance> = Envelope::from_json(
            r#"{"status":"success","data":{"instances":[{
                "uuid":"00000000-0000-0000-0000-000000000001","name":"web","state":"running",
                "fqdn":"web.fra0.kraft.host.","private_ip":"10.0.0.2","boot_time_us":1200,
                "service_group":{"uuid":"00000000-0000-0000-0000-000000000003","name":"grp",
                  "domains":[{"fqdn":"web.fra0.kraft.host."}]},
                "status":"success"}]}}"#,
        )
        .unwrap();
        let instance = env.into_first().unwrap();
        assert_eq!(instance.state, Some(InstanceState::Running));
        assert_eq!(instance.fqdn.as_deref(), Some("web.fra0.kraft.host"));
        assert_eq!(instance.boot_time_us, Some(1200));
        assert!(instance.common.error.is_none());
    }

    #[test]
    fn unknown_states_do_not_fail_decoding() {
        let instance: Instance = serde_json::from_str(r#"{"state":"hibernating"}"#).unwrap();
        assert_eq!(instance.state, Some(InstanceState::Unknown));
    }

    #[test]
    fn console_output_is_base64() {
        let log = InstanceLog {
            output: "aGVsbG8K".to_string(),
            ..Default::default()
        };
        assert_eq!(log.decoded().unwrap(), b"hello\n");

        let bad = InstanceLog {
            output: "not base64!".to_string(),
            ..Default::default()
        };
        assert!(matches!(bad.decoded(), Err(Error::Decode(_))));
    }
}
