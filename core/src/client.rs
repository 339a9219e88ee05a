//! The service-client template and the façade that bundles every client.
//!
//! # Design
//! Each resource client owns exactly one `RequestBuilder` and nothing else.
//! The fluent overrides live on [`ServiceClient`] as provided methods, so
//! every client gets them by implementing two accessors. An override builds
//! a new client around a new builder; the receiver is left untouched, which
//! is what makes a single client value safe to share between tasks.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Result;
use crate::http::Transport;
use crate::options::Options;
use crate::request::RequestBuilder;
use crate::services::{
    AutoscaleClient, CertificatesClient, ImagesClient, InstancesClient, MetrosClient,
    ServiceGroupsClient, UsersClient, VolumesClient,
};

/// Shape shared by every resource client.
pub trait ServiceClient: Sized {
    fn request(&self) -> &RequestBuilder;

    fn from_request(request: RequestBuilder) -> Self;

    /// Copy of this client routed to `metro`.
    fn with_metro(&self, metro: impl Into<String>) -> Self {
        Self::from_request(self.request().with_metro(metro))
    }

    /// Copy of this client sending through `transport`.
    fn with_transport(&self, transport: Arc<dyn Transport>) -> Self {
        Self::from_request(self.request().with_transport(transport))
    }

    /// Copy of this client with a different per-request timeout.
    fn with_timeout(&self, timeout: Duration) -> Self {
        Self::from_request(self.request().with_timeout(timeout))
    }
}

/// Every resource client, wired to one shared `Options`.
///
/// Construction performs no I/O.
#[derive(Debug, Clone)]
pub struct KraftCloud {
    options: Arc<Options>,
    instances: InstancesClient,
    volumes: VolumesClient,
    services: ServiceGroupsClient,
    autoscale: AutoscaleClient,
    certificates: CertificatesClient,
    images: ImagesClient,
    users: UsersClient,
    metros: MetrosClient,
}

impl KraftCloud {
    pub fn new(options: Options) -> Self {
        let options = Arc::new(options);
        let request = RequestBuilder::new(Arc::clone(&options));
        Self {
            instances: InstancesClient::from_request(request.clone()),
            volumes: VolumesClient::from_request(request.clone()),
            services: ServiceGroupsClient::from_request(request.clone()),
            autoscale: AutoscaleClient::from_request(request.clone()),
            certificates: CertificatesClient::from_request(request.clone()),
            images: ImagesClient::from_request(request.clone()),
            users: UsersClient::from_request(request.clone()),
            metros: MetrosClient::from_request(request),
            options,
        }
    }

    /// Bundle built from environment variables and defaults only.
    pub fn from_env() -> Result<Self> {
        Ok(Self::new(Options::from_env()?))
    }

    pub fn options(&self) -> &Arc<Options> {
        &self.options
    }

    pub fn instances(&self) -> &InstancesClient {
        &self.instances
    }

    pub fn volumes(&self) -> &VolumesClient {
        &self.volumes
    }

    pub fn services(&self) -> &ServiceGroupsClient {
        &self.services
    }

    pub fn autoscale(&self) -> &AutoscaleClient {
        &self.autoscale
    }

    pub fn certificates(&self) -> &CertificatesClient {
        &self.certificates
    }

    pub fn images(&self) -> &ImagesClient {
        &self.images
    }

    pub fn users(&self) -> &UsersClient {
        &self.users
    }

    pub fn metros(&self) -> &MetrosClient {
        &self.metros
    }
}
