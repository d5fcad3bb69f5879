use std::sync::Arc;

use tracing::{debug, info, instrument};

use crate::{
    constants::MAX_RESIZE_DIMENSION,
    errors::ImageError,
    fetch::RemoteFetcher,
    imaging::{EncodeSettings, ExtensionValidator, FormatCodec, ImageFormat, Quality},
    utils::file_name::parse_file_name,
};

/// Canonical-format image ready to be stored.
#[derive(Debug, Clone)]
pub struct NormalizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    /// Display name derived from the file name or URL.
    pub name: String,
    /// Storage file name, extension matching `format`.
    pub file_name: String,
    pub format: ImageFormat,
}

#[derive(Debug, Clone)]
pub struct ResizedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, Copy)]
pub struct PipelineSettings {
    pub heif_quality: Quality,
    pub jpeg_quality: Quality,
    pub max_dimension: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            heif_quality: Quality::default(),
            jpeg_quality: Quality::default(),
            max_dimension: MAX_RESIZE_DIMENSION,
        }
    }
}

impl PipelineSettings {
    fn quality_for(&self, format: ImageFormat) -> Quality {
        match format {
            ImageFormat::Heif => self.heif_quality,
            ImageFormat::Jpeg => self.jpeg_quality,
            _ => Quality::default(),
        }
    }
}

/// Stateless ingestion and transformation steps. The synchronous methods are
/// CPU-bound and belong on the blocking pool.
#[derive(Clone)]
pub struct ImagePipeline {
    codec: Arc<FormatCodec>,
    validator: Arc<ExtensionValidator>,
    fetcher: RemoteFetcher,
    settings: PipelineSettings,
}

impl ImagePipeline {
    pub fn new(codec: Arc<FormatCodec>, fetcher: RemoteFetcher, settings: PipelineSettings) -> Self {
        let validator = Arc::new(ExtensionValidator::new(codec.advertised_formats()));
        Self { codec, validator, fetcher, settings }
    }

    pub fn codec(&self) -> &FormatCodec {
        &self.codec
    }

    pub fn validator(&self) -> &ExtensionValidator {
        &self.validator
    }

    pub fn settings(&self) -> PipelineSettings {
        self.settings
    }

    /// Validates the extension, decodes, converts to HEIF unless the upload
    /// already is HEIF/HEIC, and encodes.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn normalize_upload(&self, bytes: &[u8], file_name: &str) -> Result<NormalizedImage, ImageError> {
        self.validator.validate(file_name)?;

        let target = ImageFormat::CANONICAL;
        let handle = self.codec.decode_any(bytes)?;
        let source = handle.format();

        let (bytes, dims) = if source == target {
            let dims = self.codec.dimensions(&handle);
            (bytes.to_vec(), dims)
        } else {
            let converted = self.codec.to_format(handle, target)?;
            let dims = self.codec.dimensions(&converted);
            let encoded = self
                .codec
                .encode(&converted, EncodeSettings::new(target, self.settings.quality_for(target)))?;
            (encoded, dims)
        };

        let name = Some(parse_file_name(file_name, false))
            .filter(|n| !n.trim().is_empty())
            .unwrap_or_else(|| "image".to_string());

        info!(%source, %target, width = dims.width, height = dims.height, "upload normalized");
        Ok(NormalizedImage {
            bytes,
            width: dims.width,
            height: dims.height,
            file_name: format!("{}.{}", name, target.extension()),
            name,
            format: target,
        })
    }

    /// Probes the URL, downloads it converted to HEIF, and reads dimensions.
    #[instrument(skip(self))]
    pub async fn normalize_from_url(&self, url: &str) -> Result<NormalizedImage, ImageError> {
        if !self.fetcher.probe(url).await {
            return Err(ImageError::UnreachableOrNotImage(url.to_string()));
        }

        let fetched = self.fetcher.fetch(url, Some(ImageFormat::CANONICAL)).await?;

        let codec = self.codec.clone();
        let (fetched, dims) = tokio::task::spawn_blocking(move || {
            let dims = codec.identify(&fetched.bytes);
            (fetched, dims)
        })
        .await
        .map_err(|e| ImageError::ConversionError(format!("identify task failed: {e}")))?;
        let dims = dims?;

        info!(format = %fetched.format, width = dims.width, height = dims.height, "URL normalized");
        Ok(NormalizedImage {
            bytes: fetched.bytes,
            width: dims.width,
            height: dims.height,
            name: fetched.name,
            file_name: fetched.file_name,
            format: fetched.format,
        })
    }

    /// `InvalidDimension` unless both sides are within `1..=max_dimension`.
    pub fn check_dimensions(&self, width: i64, height: i64) -> Result<(u32, u32), ImageError> {
        let max = self.settings.max_dimension;
        let in_range = |v: i64| v >= 1 && v <= max as i64;
        if in_range(width) && in_range(height) {
            Ok((width as u32, height as u32))
        } else {
            Err(ImageError::InvalidDimension { width, height, max })
        }
    }

    /// Resizes to exactly `width`x`height` and re-encodes in the stored format.
    #[instrument(skip(self, bytes), fields(size = bytes.len()))]
    pub fn resize(&self, bytes: &[u8], width: i64, height: i64) -> Result<ResizedImage, ImageError> {
        let (width, height) = self.check_dimensions(width, height)?;

        let handle = self.codec.decode_any(bytes)?;
        let format = handle.format();
        let resized = self.codec.resize(&handle, width, height)?;
        let dims = self.codec.dimensions(&resized);
        let bytes = self
            .codec
            .encode(&resized, EncodeSettings::new(format, self.settings.quality_for(format)))?;

        debug!(%format, width = dims.width, height = dims.height, "resized");
        Ok(ResizedImage {
            bytes,
            width: dims.width,
            height: dims.height,
            format,
        })
    }

    /// Re-encodes stored bytes for display; returns them untouched when
    /// already in `format`.
    pub fn render(&self, bytes: Vec<u8>, format: ImageFormat) -> Result<Vec<u8>, ImageError> {
        if ImageFormat::sniff(&bytes) == Some(format) {
            return Ok(bytes);
        }
        self.codec
            .transcode(&bytes, EncodeSettings::new(format, self.settings.quality_for(format)))
    }
}
