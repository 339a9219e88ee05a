//! Persistent volumes.
//!
//! The server owns the volume lifecycle
//! (`uninitialized -> initializing -> available <-> idle <-> mounted`, plus
//! `busy` and `error`); this client only reports the state it is given.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{by_identifiers, require, with_body, ObjectRef};
use crate::client::ServiceClient;
use crate::envelope::{ApiItem, Envelope, ResponseCommon};
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::identifier::{Identifier, IdentifierKind};
use crate::request::RequestBuilder;

const PATH: &str = "/volumes";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolumeState {
    Uninitialized,
    Initializing,
    Available,
    Idle,
    Mounted,
    /// Under maintenance.
    Busy,
    /// Needs an engineer.
    Error,
    /// Only acknowledges a request; never a stored state.
    Success,
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CreateVolumeRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub size_mb: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct VolumeMount {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub readonly: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Volume {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub state: Option<VolumeState>,
    #[serde(default)]
    pub size_mb: Option<u64>,
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub attached_to: Vec<ObjectRef>,
    #[serde(default)]
    pub mounted_by: Vec<VolumeMount>,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl ApiItem for Volume {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Serialize)]
struct AttachRequest<'a> {
    #[serde(flatten)]
    volume: &'a Identifier,
    attach_to: &'a Identifier,
    at: &'a str,
    readonly: bool,
}

#[derive(Serialize)]
struct DetachRequest<'a> {
    #[serde(flatten)]
    volume: &'a Identifier,
    #[serde(skip_serializing_if = "Option::is_none")]
    from: Option<&'a Identifier>,
}

#[derive(Debug, Clone)]
pub struct VolumesClient {
    request: RequestBuilder,
}

impl ServiceClient for VolumesClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

impl VolumesClient {
    /// Create a volume of `size_mb` megabytes. An empty name lets the server
    /// pick one.
    pub async fn create(&self, cancel: &CancellationToken, name: &str, size_mb: u64) -> Result<Volume> {
        if size_mb < 1 {
            return Err(Error::Validation("size_mb must be at least 1".to_string()));
        }
        let req = CreateVolumeRequest {
            name: (!name.is_empty()).then(|| name.to_string()),
            size_mb,
        };
        with_body::<Volume, _>(&self.request, cancel, HttpMethod::Post, PATH, &req)
            .await?
            .into_first()
    }

    pub async fn get<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<Volume>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Get, PATH, ids, IdentifierKind::Detect).await
    }

    pub async fn list(&self, cancel: &CancellationToken) -> Result<Envelope<Volume>> {
        self.request
            .dispatch(cancel, HttpMethod::Get, "/volumes/list", None)
            .await
    }

    pub async fn delete<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<Volume>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Delete, PATH, ids, IdentifierKind::Detect).await
    }

    /// Attach `volume` to `instance` at mount point `at`.
    pub async fn attach(
        &self,
        cancel: &CancellationToken,
        volume: &str,
        instance: &str,
        at: &str,
        readonly: bool,
    ) -> Result<Volume> {
        require(volume, "volume identifier")?;
        require(instance, "instance identifier")?;
        require(at, "mount point")?;
        let volume = Identifier::parse(volume);
        let instance = Identifier::parse(instance);
        let req = AttachRequest {
            volume: &volume,
            attach_to: &instance,
            at,
            readonly,
        };
        with_body::<Volume, _>(&self.request, cancel, HttpMethod::Put, "/volumes/attach", &req)
            .await?
            .into_first()
    }

    /// Detach `volume`, optionally only from the instance `from`.
    pub async fn detach(&self, cancel: &CancellationToken, volume: &str, from: Option<&str>) -> Result<Volume> {
        require(volume, "volume identifier")?;
        let volume = Identifier::parse(volume);
        let from = match from {
            Some(from) => {
                require(from, "instance identifier")?;
                Some(Identifier::parse(from))
            }
            None => None,
        };
        let req = DetachRequest {
            volume: &volume,
            from: from.as_ref(),
        };
        with_body::<Volume, _>(&self.request, cancel, HttpMethod::Put, "/volumes/detach", &req)
            .await?
            .into_first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attach_body_shape() {
        let volume = Identifier::parse("data");
        let instance = Identifier::parse("00000000-0000-0000-0000-000000000001");
        let req = AttachRequest {
            volume: &volume,
            attach_to: &instance,
            at: "/mnt",
            readonly: true,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({
                "name": "data",
                "attach_to": {"uuid": "00000000-0000-0000-0000-000000000001"},
                "at": "/mnt",
                "readonly": true
            })
        );
    }

    #[test]
    fn detach_omits_missing_instance() {
        let volume = Identifier::parse("data");
        let req = DetachRequest {
            volume: &volume,
            from: None,
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"name": "data"})
        );
    }

    #[test]
    fn volume_states_decode() {
        for (raw, state) in [
            ("uninitialized", VolumeState::Uninitialized),
            ("initializing", VolumeState::Initializing),
            ("available", VolumeState::Available),
            ("idle", VolumeState::Idle),
            ("mounted", VolumeState::Mounted),
            ("busy", VolumeState::Busy),
            ("error", VolumeState::Error),
            ("success", VolumeState::Success),
            ("melting", VolumeState::Unknown),
        ] {
            let decoded: VolumeState = serde_json::from_value(serde_json::json!(raw)).unwrap();
            assert_eq!(decoded, state, "{raw}");
        }
    }

    #[test]
    fn volume_decodes_mounts() {
        let volume: Volume = serde_json::from_str(
            r#"{"uuid":"v","name":"data","state":"mounted","size_mb":100,
                "attached_to":[{"uuid":"i","name":"web"}],
                "mounted_by":[{"uuid":"i","name":"web","readonly":true}],
                "status":"success"}"#,
        )
        .unwrap();
        assert_eq!(volume.state, Some(VolumeState::Mounted));
        assert_eq!(volume.attached_to[0].name, "web");
        assert!(volume.mounted_by[0].readonly);
    }
}
