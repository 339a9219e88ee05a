//! Service groups: published ports, domains and the instances behind them.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{by_identifiers, trim_fqdn, with_body, ObjectRef};
use crate::client::ServiceClient;
use crate::envelope::{ApiItem, Envelope, ResponseCommon};
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::identifier::{Identifier, IdentifierKind};
use crate::request::RequestBuilder;

const PATH: &str = "/services";

/// Connection handler applied to a published port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Handler {
    Tls,
    Http,
    Redirect,
}

/// One published port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub handlers: Vec<Handler>,
}

/// Domain requested at creation time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainRequest {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate: Option<Identifier>,
}

/// Domain as reported by the API.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Domain {
    #[serde(default, deserialize_with = "trim_fqdn")]
    pub fqdn: Option<String>,
    #[serde(default)]
    pub certificate: Option<DomainCertificate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct DomainCertificate {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub state: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CreateServiceGroupRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub services: Vec<Service>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub domains: Vec<DomainRequest>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ServiceGroup {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub persistent: Option<bool>,
    #[serde(default)]
    pub autoscale: Option<bool>,
    #[serde(default)]
    pub services: Vec<Service>,
    #[serde(default)]
    pub domains: Vec<Domain>,
    #[serde(default)]
    pub instances: Vec<ObjectRef>,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl ApiItem for ServiceGroup {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Debug, Clone)]
pub struct ServiceGroupsClient {
    request: RequestBuilder,
}

impl ServiceClient for ServiceGroupsClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

impl ServiceGroupsClient {
    /// Create a service group. At least one service is required.
    pub async fn create(
        &self,
        cancel: &CancellationToken,
        req: &CreateServiceGroupRequest,
    ) -> Result<ServiceGroup> {
        if req.services.is_empty() {
            return Err(Error::Validation(
                "a service group needs at least one service".to_string(),
            ));
        }
        if req.services.iter().any(|s| s.port == 0) {
            return Err(Error::Validation("service port must be non-zero".to_string()));
        }
        with_body::<ServiceGroup, _>(&self.request, cancel, HttpMethod::Post, PATH, req)
            .await?
            .into_first()
    }

    pub async fn get<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<ServiceGroup>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Get, PATH, ids, IdentifierKind::Detect).await
    }

    pub async fn list(&self, cancel: &CancellationToken) -> Result<Envelope<ServiceGroup>> {
        self.request
            .dispatch(cancel, HttpMethod::Get, "/services/list", None)
            .await
    }

    pub async fn delete<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<ServiceGroup>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Delete, PATH, ids, IdentifierKind::Detect).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_request_omits_empty_fields() {
        let req = CreateServiceGroupRequest {
            name: None,
            services: vec![Service {
                port: 443,
                destination_port: Some(8080),
                handlers: vec![Handler::Tls, Handler::Http],
            }],
            domains: Vec::new(),
        };
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "services": [{"port": 443, "destination_port": 8080, "handlers": ["tls", "http"]}]
            })
        );
    }

    #[test]
    fn domain_certificate_is_keyed() {
        let req = DomainRequest {
            name: "example.com".to_string(),
            certificate: Some(Identifier::parse("my-cert")),
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            serde_json::json!({"name": "example.com", "certificate": {"name": "my-cert"}})
        );
    }

    #[test]
    fn service_group_decodes_with_trimmed_domains() {
        let env: Envelope<ServiceGroup> = Envelope::from_json(
            r#"{"status":"success","data":{"service_groups":[{
                "uuid":"00000000-0000-0000-0000-000000000003","name":"web","status":"success",
                "services":[{"port":443,"destination_port":8080,"handlers":["tls","http"]}],
                "domains":[{"fqdn":"web.fra0.kraft.host."}],
                "instances":[{"uuid":"00000000-0000-0000-0000-000000000001","name":"app"}]}]}}"#,
        )
        .unwrap();
        let group = env.into_first().unwrap();
        assert_eq!(group.name, "web");
        assert_eq!(group.domains[0].fqdn.as_deref(), Some("web.fra0.kraft.host"));
        assert_eq!(group.instances[0].name, "app");
        assert_eq!(group.services[0].handlers, vec![Handler::Tls, Handler::Http]);
    }
}
