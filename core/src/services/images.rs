//! Image metadata.
//!
//! Deleting images and reading registry quotas go through the separate
//! image registry API and are not handled here.

use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use crate::client::ServiceClient;
use crate::envelope::{ApiItem, Envelope, ResponseCommon};
use crate::error::{Error, Result};
use crate::http::HttpMethod;
use crate::request::RequestBuilder;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Image {
    #[serde(default)]
    pub digest: String,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub initrd: Option<bool>,
    #[serde(default)]
    pub size_in_bytes: Option<u64>,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub kernel_args: Vec<String>,
    #[serde(flatten)]
    pub common: ResponseCommon,
}

impl ApiItem for Image {
    fn common(&self) -> &ResponseCommon {
        &self.common
    }
}

/// Turn `repo/name:tag` into the path form `repo/name/tag`.
///
/// A name without a tag is returned unchanged; more than one `:` is
/// rejected.
pub fn normalize_image_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(Error::Validation("image name must not be empty".to_string()));
    }
    let mut parts = name.split(':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(repo), None, _) => Ok(repo.to_string()),
        (Some(repo), Some(tag), None) if !repo.is_empty() && !tag.is_empty() => {
            Ok(format!("{repo}/{tag}"))
        }
        _ => Err(Error::Validation(format!("invalid image name {name:?}"))),
    }
}

#[derive(Debug, Clone)]
pub struct ImagesClient {
    request: RequestBuilder,
}

impl ServiceClient for ImagesClient {
    fn request(&self) -> &RequestBuilder {
        &self.request
    }

    fn from_request(request: RequestBuilder) -> Self {
        Self { request }
    }
}

impl ImagesClient {
    /// Every image visible to the caller in the current metro.
    pub async fn list(&self, cancel: &CancellationToken) -> Result<Envelope<Image>> {
        self.request
            .dispatch(cancel, HttpMethod::Get, "/images/list", None)
            .await
    }
}
