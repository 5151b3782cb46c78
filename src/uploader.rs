use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{Context, Result, bail};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::config::CloudinaryConfig;

const UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Cloudinary image host. Uploads are signed with SHA-256.
pub struct Uploader {
    client: Client,
    config: CloudinaryConfig,
}

#[derive(Deserialize)]
struct UploadResponse {
    secure_url: String,
}

impl Uploader {
    pub fn new(config: CloudinaryConfig) -> Result<Self> {
        Ok(Self {
            client: Client::builder().timeout(UPLOAD_TIMEOUT).build()?,
            config,
        })
    }

    /// Stream `bytes` to the image host as an image resource and return its
    /// public URL. A failure here fails the whole screenshot operation.
    pub async fn upload_stream(&self, bytes: Vec<u8>) -> Result<String> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .context("system clock is before the unix epoch")?
            .as_secs();
        let params = [("timestamp", timestamp.to_string())];
        let signature = sign(&params, &self.config.api_secret);

        let part = Part::bytes(bytes).file_name("screenshot.png").mime_str("image/png")?;
        let mut form = Form::new()
            .part("file", part)
            .text("api_key", self.config.api_key.clone());
        for (name, value) in params {
            form = form.text(name, value);
        }
        let form = form.text("signature", signature);

        let endpoint = format!(
            "https://api.cloudinary.com/v1_1/{}/image/upload",
            self.config.cloud_name
        );
        let response = self.client.post(&endpoint).multipart(form).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("image host returned {status}: {body}");
        }

        let uploaded: UploadResponse = response
            .json()
            .await
            .context("image host returned an unreadable body")?;
        debug!(url = %uploaded.secure_url, "upload complete");
        Ok(uploaded.secure_url)
    }
}

/// Cloudinary request signature: every parameter sent other than `file`,
/// `api_key` and the signature itself, sorted, joined as `k=v` with `&`,
/// with the secret appended, then hashed. The provider recognizes SHA-256
/// signatures by digest length.
fn sign(params: &[(&str, String)], api_secret: &str) -> String {
    let mut pairs: Vec<String> = params
        .iter()
        .map(|(name, value)| format!("{name}={value}"))
        .collect();
    pairs.sort();
    let payload = format!("{}{}", pairs.join("&"), api_secret);
    hex::encode(Sha256::digest(payload.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn timestamp_param(timestamp: u64) -> [(&'static str, String); 1] {
        [("timestamp", timestamp.to_string())]
    }

    #[test]
    fn signature_is_deterministic_hex() {
        let a = sign(&timestamp_param(1_700_000_000), "secret");
        let b = sign(&timestamp_param(1_700_000_000), "secret");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn signature_varies_with_inputs() {
        assert_ne!(sign(&timestamp_param(1), "secret"), sign(&timestamp_param(2), "secret"));
        assert_ne!(sign(&timestamp_param(1), "secret"), sign(&timestamp_param(1), "other"));
    }

    #[test]
    fn signature_sorts_parameters() {
        let forward = [("eager", "w_400".to_string()), ("timestamp", "1".to_string())];
        let backward = [("timestamp", "1".to_string()), ("eager", "w_400".to_string())];
        assert_eq!(sign(&forward, "secret"), sign(&backward, "secret"));
    }
}
