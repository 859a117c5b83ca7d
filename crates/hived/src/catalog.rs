//! Image catalog over the Docker Hub tags API.

use std::time::Duration;

use anyhow::{Context, anyhow};
use async_trait::async_trait;
use serde::Deserialize;

use hive_core::collab::ImageCatalog;
use hive_core::net::{self, HttpRequest};
use hive_core::types::ImageRef;

#[derive(Debug, Deserialize)]
struct TagInfo {
    full_size: u64,
}

/// Looks images up at `/v2/repositories/{namespace}/{name}/tags/{tag}`.
#[derive(Debug, Clone)]
pub struct HubCatalog {
    endpoint: String,
    timeout: Duration,
}

impl HubCatalog {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(20),
        }
    }
}

pub fn tag_path(image: &ImageRef) -> String {
    format!(
        "/v2/repositories/{}/{}/tags/{}",
        image.namespace, image.name, image.tag
    )
}

#[async_trait]
impl ImageCatalog for HubCatalog {
    async fn image_size(&self, image: &ImageRef) -> anyhow::Result<Option<u64>> {
        let response = net::send(&self.endpoint, HttpRequest::get(tag_path(image)), self.timeout).await?;
        if response.status.as_u16() == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(anyhow!("catalog returned {} for {image}", response.status));
        }
        let info: TagInfo = response
            .json()
            .with_context(|| format!("unexpected catalog reply for {image}"))?;
        Ok(Some(info.full_size))
    }
}
