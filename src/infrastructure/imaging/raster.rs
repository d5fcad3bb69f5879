use std::io::Cursor;

use image::{codecs::jpeg::JpegEncoder, ImageReader, Limits};
use tracing::debug;

use crate::{constants::MAX_DECODE_DIMENSION, errors::ImageError};

use super::{
    engine::{canonical_pixels, Dimensions, EngineKind, ImageEngine, ImageHandle},
    format::{EncodeSettings, ImageFormat},
};

const RASTER_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Ico,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

/// Fast engine over the `image` crate's pure-Rust codecs.
#[derive(Debug, Default, Clone, Copy)]
pub struct RasterEngine;

impl RasterEngine {
    pub fn new() -> Self {
        Self
    }

    fn limits() -> Limits {
        let mut limits = Limits::default();
        limits.max_image_width = Some(MAX_DECODE_DIMENSION);
        limits.max_image_height = Some(MAX_DECODE_DIMENSION);
        limits
    }

    fn reader(bytes: &[u8]) -> Result<(ImageReader<Cursor<&[u8]>>, ImageFormat), ImageError> {
        let format = ImageFormat::sniff(bytes)
            .ok_or_else(|| ImageError::UnsupportedFormat("unrecognized image data".into()))?;
        let raster = format
            .to_raster()
            .ok_or_else(|| ImageError::UnsupportedFormat(format!("{format} is not a raster format")))?;

        let mut reader = ImageReader::with_format(Cursor::new(bytes), raster);
        reader.limits(Self::limits());
        Ok((reader, format))
    }
}

impl ImageEngine for RasterEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Raster
    }

    fn readable_formats(&self) -> &[ImageFormat] {
        RASTER_FORMATS
    }

    fn writable_formats(&self) -> &[ImageFormat] {
        RASTER_FORMATS
    }

    fn decode(&self, bytes: &[u8]) -> Result<ImageHandle, ImageError> {
        let (reader, format) = Self::reader(bytes)?;
        let pixels = reader.decode()?;
        debug!(%format, width = pixels.width(), height = pixels.height(), "raster decode");
        Ok(ImageHandle::new(EngineKind::Raster, format, pixels))
    }

    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, ImageError> {
        let (reader, _) = Self::reader(bytes)?;
        Ok(reader.into_dimensions()?.into())
    }

    fn encode(&self, handle: &ImageHandle, settings: EncodeSettings) -> Result<Vec<u8>, ImageError> {
        let raster = settings
            .format
            .to_raster()
            .filter(|_| self.can_write(settings.format))
            .ok_or_else(|| {
                ImageError::EncodeError(format!("raster engine cannot write {}", settings.format))
            })?;

        let pixels = canonical_pixels(handle.pixels(), settings.format);
        let mut out = Cursor::new(Vec::new());

        match settings.format {
            ImageFormat::Jpeg => {
                let encoder = JpegEncoder::new_with_quality(&mut out, settings.quality.value());
                pixels
                    .write_with_encoder(encoder)
                    .map_err(|e| ImageError::EncodeError(e.to_string()))?;
            }
            _ => pixels
                .write_to(&mut out, raster)
                .map_err(|e| ImageError::EncodeError(e.to_string()))?,
        }

        Ok(out.into_inner())
    }
}
