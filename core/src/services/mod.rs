//! Resource clients. Each one projects the core onto a URL prefix and a
//! pair of request/response record types.

pub mod autoscale;
pub mod certificates;
pub mod images;
pub mod instances;
pub mod metros;
pub mod service_groups;
pub mod users;
pub mod volumes;

pub use autoscale::AutoscaleClient;
pub use certificates::CertificatesClient;
pub use images::ImagesClient;
pub use instances::InstancesClient;
pub use metros::MetrosClient;
pub use service_groups::ServiceGroupsClient;
pub use users::UsersClient;
pub use volumes::VolumesClient;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use tokio_util::sync::CancellationToken;

use crate::envelope::Envelope;
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::identifier::{classify, IdentifierKind};
use crate::request::{json_body, RequestBuilder};

/// Minimal `{uuid, name}` reference returned inside many items.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
}

/// Send `ids` as a JSON array of `{"uuid"|"name": ...}` objects.
pub(crate) async fn by_identifiers<T, I, S>(
    request: &RequestBuilder,
    cancel: &CancellationToken,
    method: HttpMethod,
    path: &str,
    ids: I,
    kind: IdentifierKind,
) -> Result<Envelope<T>>
where
    T: DeserializeOwned,
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let ids = classify(ids, kind)?;
    request.dispatch(cancel, method, path, Some(json_body(&ids)?)).await
}

/// Send a single JSON object.
pub(crate) async fn with_body<T, B>(
    request: &RequestBuilder,
    cancel: &CancellationToken,
    method: HttpMethod,
    path: &str,
    body: &B,
) -> Result<Envelope<T>>
where
    T: DeserializeOwned,
    B: Serialize + ?Sized,
{
    request.dispatch(cancel, method, path, Some(json_body(body)?)).await
}

pub(crate) fn require(value: &str, what: &str) -> Result<()> {
    if value.is_empty() {
        return Err(Error::Validation(format!("{what} must not be empty")));
    }
    Ok(())
}

/// FQDNs arrive with or without the root `.`; every FQDN field goes through
/// here so callers always see the trimmed form.
pub(crate) fn trim_fqdn<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let fqdn = Option::<String>::deserialize(deserializer)?;
    Ok(fqdn.map(|s| s.trim_end_matches('.').to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Deserialize)]
    struct Host {
        #[serde(default, deserialize_with = "trim_fqdn")]
        fqdn: Option<String>,
    }

    #[test]
    fn fqdn_root_dot_is_trimmed() {
        let host: Host = serde_json::from_str(r#"{"fqdn":"app.fra0.kraft.host."}"#).unwrap();
        assert_eq!(host.fqdn.as_deref(), Some("app.fra0.kraft.host"));

        let host: Host = serde_json::from_str(r#"{"fqdn":"app.fra0.kraft.host"}"#).unwrap();
        assert_eq!(host.fqdn.as_deref(), Some("app.fra0.kraft.host"));

        let host: Host = serde_json::from_str(r#"{}"#).unwrap();
        assert!(host.fqdn.is_none());
    }

    #[test]
    fn require_rejects_empty() {
        assert!(require("x", "name").is_ok());
        let err = require("", "name").unwrap_err();
        assert_eq!(err.to_string(), "invalid request: name must not be empty");
    }
}
