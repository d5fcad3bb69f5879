use std::{sync::Arc, time::Duration};

use reqwest::Client;
use tracing::{debug, instrument, warn};
use url::Url;

use crate::{
    constants::BROWSER_USER_AGENT,
    errors::ImageError,
    imaging::{EncodeSettings, FormatCodec, ImageFormat, Quality},
    utils::file_name::{file_extension, parse_file_name},
};

/// Downloaded image, already converted when a target format was requested.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub bytes: Vec<u8>,
    /// Last URL path segment without extension.
    pub name: String,
    pub file_name: String,
    pub format: ImageFormat,
}

#[derive(Clone)]
pub struct RemoteFetcher {
    client: Client,
    codec: Arc<FormatCodec>,
    max_bytes: usize,
    quality: Quality,
}

impl RemoteFetcher {
    pub fn new(
        codec: Arc<FormatCodec>,
        timeout: Duration,
        max_bytes: usize,
        quality: Quality,
    ) -> Result<Self, ImageError> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| ImageError::FetchError(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { client, codec, max_bytes, quality })
    }

    /// Format implied by the URL path's extension.
    pub fn format_from_url(url: &str) -> Option<ImageFormat> {
        file_extension(url).and_then(|ext| ImageFormat::from_extension(&ext))
    }

    /// True only when the URL looks like an image by extension and answers
    /// a GET with 200..=208. Never fails.
    #[instrument(skip(self))]
    pub async fn probe(&self, url: &str) -> bool {
        let looks_like_image = Self::format_from_url(url)
            .is_some_and(|format| format.mime_type().starts_with("image/"));
        if !looks_like_image {
            debug!("URL has no image extension");
            return false;
        }

        let Ok(parsed) = Url::parse(url) else {
            return false;
        };

        match self.client.get(parsed).send().await {
            Ok(response) => {
                let status = response.status().as_u16();
                debug!(status, "probe response");
                (200..=208).contains(&status)
            }
            Err(e) => {
                debug!(error = %e, "probe request failed");
                false
            }
        }
    }

    /// Downloads the body within the size cap and converts it to `target`
    /// when the source is in another format.
    #[instrument(skip(self))]
    pub async fn fetch(&self, url: &str, target: Option<ImageFormat>) -> Result<FetchedImage, ImageError> {
        let parsed = Url::parse(url).map_err(|e| ImageError::FetchError(format!("invalid URL: {e}")))?;

        let mut response = self.client.get(parsed).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ImageError::FetchError(format!("upstream responded with {status}")));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.max_bytes {
                return Err(self.too_large());
            }
        }

        let mut bytes = Vec::with_capacity(8192);
        while let Some(chunk) = response.chunk().await? {
            if bytes.len() + chunk.len() > self.max_bytes {
                return Err(self.too_large());
            }
            bytes.extend_from_slice(&chunk);
        }

        let source = ImageFormat::sniff(&bytes)
            .or_else(|| Self::format_from_url(url))
            .ok_or_else(|| ImageError::UnsupportedFormat(format!("cannot determine format of {url}")))?;

        let name = parse_file_name(url, false);

        let (bytes, format) = match target {
            Some(target) if target != source => {
                debug!(from = %source, to = %target, "converting download");
                let codec = self.codec.clone();
                let settings = EncodeSettings::new(target, self.quality);
                let converted = tokio::task::spawn_blocking(move || codec.transcode(&bytes, settings))
                    .await
                    .map_err(|e| ImageError::ConversionError(format!("conversion task failed: {e}")))??;
                (converted, target)
            }
            _ => (bytes, source),
        };

        Ok(FetchedImage {
            file_name: format!("{}.{}", name, format.extension()),
            name,
            bytes,
            format,
        })
    }

    fn too_large(&self) -> ImageError {
        warn!(limit = self.max_bytes, "download exceeded size limit");
        ImageError::FetchError(format!("response body exceeds {} bytes", self.max_bytes))
    }
}

impl std::fmt::Debug for RemoteFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteFetcher")
            .field("max_bytes", &self.max_bytes)
            .field("quality", &self.quality)
            .finish()
    }
}
