use anyhow::Result;
use async_trait::async_trait;

use crate::renderer::{self, RenderRequest};
use crate::uploader::Uploader;

/// Seam over the headless-browser renderer so handlers can be exercised
/// without launching Chrome.
#[async_trait]
pub trait Capture: Send + Sync {
    async fn capture(&self, request: RenderRequest) -> Result<Vec<u8>>;
}

/// Seam over the image host.
#[async_trait]
pub trait ImageHost: Send + Sync {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String>;
}

/// Renders with a fresh headless Chrome per request, so concurrent captures
/// share no browser state. The underlying library is synchronous; each
/// capture runs on the blocking pool.
pub struct ChromeCapture;

#[async_trait]
impl Capture for ChromeCapture {
    async fn capture(&self, request: RenderRequest) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || renderer::render(&request))
            .await
            .map_err(|err| anyhow::anyhow!("render task panicked: {err}"))?
    }
}

#[async_trait]
impl ImageHost for Uploader {
    async fn upload(&self, bytes: Vec<u8>) -> Result<String> {
        self.upload_stream(bytes).await
    }
}
