//! Client for the remote segmentation service
//!
//! The service receives the original upload as multipart form data and
//! answers with `{ "success": bool, "image": "<data URL>" }`. Anything else
//! is a [`BgComposerError::Remote`] and the caller falls back to the local
//! engine.

use crate::{
    config::RemoteConfig,
    error::{BgComposerError, Result},
    services::{mime_type, ImageLoader},
    types::{ForegroundLayer, SegmentationSource, SourceImage},
    utils::data_url,
};
use image::ImageFormat;
use reqwest::{multipart, Client};
use serde::Deserialize;
use std::io::Cursor;
use std::time::Duration;
use tracing::debug;

/// Path of the removal endpoint relative to the API base
pub const REMOVE_BACKGROUND_PATH: &str = "/files/remove-background";

/// Name of the form field carrying the upload
pub const UPLOAD_FIELD: &str = "image";

/// Response body of the removal endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct RemoteResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
}

/// HTTP client bound to one configured endpoint
#[derive(Debug, Clone)]
pub struct RemoteClient {
    client: Client,
    endpoint: String,
    max_upload_bytes: usize,
    loader: ImageLoader,
}

impl RemoteClient {
    /// Build a client from configuration
    ///
    /// # Errors
    /// - `InvalidConfig` when no `http(s)` API base is configured
    /// - `Remote` when the HTTP client cannot be created
    pub fn new(config: &RemoteConfig, loader: ImageLoader) -> Result<Self> {
        let base = config
            .api_base
            .as_deref()
            .filter(|_| config.is_configured())
            .ok_or_else(|| BgComposerError::invalid_config("remote API base is not configured"))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BgComposerError::remote(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint_url(base),
            max_upload_bytes: config.max_upload_bytes,
            loader,
        })
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Submit `source` and decode the returned cutout
    ///
    /// The returned layer is bounded by the same loader limit as local
    /// results.
    pub async fn remove_background(&self, source: &SourceImage) -> Result<ForegroundLayer> {
        let (bytes, mime) = upload_payload(source)?;
        if bytes.len() > self.max_upload_bytes {
            return Err(BgComposerError::remote(format!(
                "upload of {} bytes exceeds the {} byte service limit",
                bytes.len(),
                self.max_upload_bytes
            )));
        }

        let part = multipart::Part::bytes(bytes)
            .file_name(format!("upload.{}", extension(mime)))
            .mime_str(mime)
            .map_err(|e| BgComposerError::remote(format!("invalid upload type {}: {}", mime, e)))?;
        let form = multipart::Form::new().part(UPLOAD_FIELD, part);

        debug!(endpoint = %self.endpoint, mime, "submitting image to remote segmentation");
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .await
            .map_err(|e| BgComposerError::remote(format!("request failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(BgComposerError::remote(format!(
                "HTTP error {} from {}",
                status, self.endpoint
            )));
        }

        let body: RemoteResponse = response
            .json()
            .await
            .map_err(|e| BgComposerError::remote(format!("malformed response body: {}", e)))?;

        self.decode_response(body)
    }

    fn decode_response(&self, body: RemoteResponse) -> Result<ForegroundLayer> {
        if !body.success {
            return Err(BgComposerError::remote(format!(
                "service reported failure: {}",
                body.message.as_deref().unwrap_or("no message")
            )));
        }

        let encoded = body
            .image
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| BgComposerError::remote("response has no image"))?;
        let payload = data_url::decode(&encoded)
            .map_err(|e| BgComposerError::remote(format!("invalid image payload: {}", e)))?;
        let image = self
            .loader
            .decode_rgba(&payload.bytes)
            .map_err(|e| BgComposerError::remote(format!("undecodable image payload: {}", e)))?;

        Ok(ForegroundLayer::new(image, SegmentationSource::Remote))
    }
}

/// `{base}/files/remove-background`, tolerating a trailing slash on the base
#[must_use]
pub fn endpoint_url(api_base: &str) -> String {
    format!("{}{}", api_base.trim_end_matches('/'), REMOVE_BACKGROUND_PATH)
}

/// Original encoded bytes when available, otherwise the raster re-encoded as PNG
fn upload_payload(source: &SourceImage) -> Result<(Vec<u8>, &'static str)> {
    if let Some(bytes) = source.original_bytes() {
        return Ok((bytes.to_vec(), mime_type(source.original_format())));
    }

    let mut bytes = Vec::new();
    source
        .pixels()
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| BgComposerError::remote(format!("failed to encode upload: {}", e)))?;
    Ok((bytes, mime_type(Some(ImageFormat::Png))))
}

fn extension(mime: &str) -> &str {
    mime.strip_prefix("image/").unwrap_or("bin")
}
