//! TLS certificates held by the platform for service-group domains.

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{by_identifiers, require, with_body, ObjectRef};
use crate::client::ServiceClient;
use crate::envelope::{ApiItem, Envelope, ResponseCommon};
use crate::error::Result;
use crate::http::HttpMethod;
use crate::identifier::IdentifierKind;
use crate::request::RequestBuilder;

const PATH: &str = "/certificates";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateState {
    Pending,
    Valid,
    Error,
    #[serde(other)]
    Unknown,
}

#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct CreateCertificateRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Common name the certificate is issued for.
    pub cn: String,
    /// PEM-encoded certificate chain.
    pub chain: String,
    /// PEM-encoded private key.
    pub pkey: String,
}

impl std::fmt::Debug for CreateCertificateRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CreateCertificateRequest")
            .field("name", &self.name)
            .field("cn", &self.cn)
            .field("chain_len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Certificate {
    #[serde(default)]
    pub uuid: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub state: Option<CertificateState>,
    #[serde(default)]
    pub common_name: Option<String>,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub serial_number: Option<String>,
    #[serde(default)]
    pub not_before: Option<String>,
    #[serde(default)]
    pub not_after: Option<String>,
    #[serde(default)]
    pub service_groups: Vec<ObjectRef>,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl ApiItem for Certificate {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

#[derive(Debug, Clone)]
pub struct CertificatesClient {
    request: RequestBuilder,
}

impl ServiceClient for CertificatesClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

impl CertificatesClient {
    /// Upload a certificate. `cn`, `chain` and `pkey` are required.
    pub async fn create(&self, cancel: &CancellationToken, req: &CreateCertificateRequest) -> Result<Certificate> {
        require(&req.cn, "common name")?;
        require(&req.chain, "certificate chain")?;
        require(&req.pkey, "private key")?;
        with_body::<Certificate, _>(&self.request, cancel, HttpMethod::Post, PATH, req)
            .await?
            .into_first()
    }

    pub async fn get<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<Certificate>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Get, PATH, ids, IdentifierKind::Detect).await
    }

    pub async fn list(&self, cancel: &CancellationToken) -> Result<Envelope<Certificate>> {
        self.request
            .dispatch(cancel, HttpMethod::Get, "/certificates/list", None)
            .await
    }

    pub async fn delete<I, S>(&self, cancel: &CancellationToken, ids: I) -> Result<Envelope<Certificate>>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        by_identifiers(&self.request, cancel, HttpMethod::Delete, PATH, ids, IdentifierKind::Detect).await
    }
}
