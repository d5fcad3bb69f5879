//! Broad-format engine.
//!
//! Reads and writes HEIF/HEIC through the system libheif when the `heif`
//! feature is enabled; every other format is delegated to [`RasterEngine`]
//! and re-tagged as owned by this engine. Without the feature the engine
//! only covers the raster formats and reports HEIF as unsupported.

use crate::errors::ImageError;

use super::{
    engine::{Dimensions, EngineKind, ImageEngine, ImageHandle},
    format::{EncodeSettings, ImageFormat},
    raster::RasterEngine,
};

#[cfg(feature = "heif")]
const BROAD_FORMATS: &[ImageFormat] = &ImageFormat::ALL;

#[cfg(not(feature = "heif"))]
const BROAD_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::Gif,
    ImageFormat::Bmp,
    ImageFormat::Ico,
    ImageFormat::Tiff,
    ImageFormat::WebP,
];

#[derive(Debug, Default, Clone, Copy)]
pub struct HeifEngine {
    raster: RasterEngine,
}

impl HeifEngine {
    pub fn new() -> Self {
        Self { raster: RasterEngine::new() }
    }

    /// Whether HEIF support was compiled in.
    pub fn heif_enabled() -> bool {
        cfg!(feature = "heif")
    }
}

impl ImageEngine for HeifEngine {
    fn kind(&self) -> EngineKind {
        EngineKind::Heif
    }

    fn readable_formats(&self) -> &[ImageFormat] {
        BROAD_FORMATS
    }

    fn writable_formats(&self) -> &[ImageFormat] {
        BROAD_FORMATS
    }

    fn decode(&self, bytes: &[u8]) -> Result<ImageHandle, ImageError> {
        if ImageFormat::sniff(bytes).is_some_and(|f| f.is_heif()) {
            let pixels = libheif::decode(bytes)?;
            return Ok(ImageHandle::new(EngineKind::Heif, ImageFormat::Heif, pixels));
        }

        let handle = self.raster.decode(bytes)?;
        let format = handle.format();
        Ok(ImageHandle::new(EngineKind::Heif, format, handle.into_pixels()))
    }

    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, ImageError> {
        if ImageFormat::sniff(bytes).is_some_and(|f| f.is_heif()) {
            return libheif::identify(bytes);
        }
        self.raster.identify(bytes)
    }

    fn encode(&self, handle: &ImageHandle, settings: EncodeSettings) -> Result<Vec<u8>, ImageError> {
        if settings.format.is_heif() {
            return libheif::encode(handle, settings);
        }
        self.raster.encode(handle, settings)
    }
}

#[cfg(feature = "heif")]
mod libheif {
    use image::{DynamicImage, RgbImage, RgbaImage};
    use libheif_rs::{
        Channel, ColorSpace, CompressionFormat, EncoderQuality, HeifContext, Image, LibHeif,
        RgbChroma,
    };
    use tracing::debug;

    use crate::{constants::MAX_DECODE_DIMENSION, errors::ImageError};

    use super::super::{
        engine::{canonical_pixels, Dimensions, ImageHandle},
        format::{EncodeSettings, ImageFormat},
    };

    fn unsupported(e: libheif_rs::HeifError) -> ImageError {
        ImageError::UnsupportedFormat(format!("HEIF decode failed: {e}"))
    }

    fn encode_err(e: libheif_rs::HeifError) -> ImageError {
        ImageError::EncodeError(format!("HEIF encode failed: {e}"))
    }

    pub(super) fn identify(bytes: &[u8]) -> Result<Dimensions, ImageError> {
        let ctx = HeifContext::read_from_bytes(bytes).map_err(unsupported)?;
        let handle = ctx.primary_image_handle().map_err(unsupported)?;
        Ok(Dimensions {
            width: handle.width(),
            height: handle.height(),
        })
    }

    pub(super) fn decode(bytes: &[u8]) -> Result<DynamicImage, ImageError> {
        let lib = LibHeif::new();
        let ctx = HeifContext::read_from_bytes(bytes).map_err(unsupported)?;
        let handle = ctx.primary_image_handle().map_err(unsupported)?;

        let (width, height) = (handle.width(), handle.height());
        if width > MAX_DECODE_DIMENSION || height > MAX_DECODE_DIMENSION {
            return Err(ImageError::UnsupportedFormat(format!(
                "HEIF image {width}x{height} exceeds decoder limit of {MAX_DECODE_DIMENSION}"
            )));
        }

        let has_alpha = handle.has_alpha_channel();
        let chroma = if has_alpha { RgbChroma::Rgba } else { RgbChroma::Rgb };
        let decoded = lib
            .decode(&handle, ColorSpace::Rgb(chroma), None)
            .map_err(unsupported)?;

        let planes = decoded.planes();
        let plane = planes
            .interleaved
            .ok_or_else(|| ImageError::UnsupportedFormat("HEIF image has no interleaved plane".into()))?;

        let channels: usize = if has_alpha { 4 } else { 3 };
        let row_len = width as usize * channels;
        let mut buf = Vec::with_capacity(row_len * height as usize);
        for row in plane.data.chunks(plane.stride).take(height as usize) {
            buf.extend_from_slice(&row[..row_len]);
        }
        debug!(width, height, has_alpha, "heif decode");

        let pixels = if has_alpha {
            RgbaImage::from_raw(width, height, buf).map(DynamicImage::ImageRgba8)
        } else {
            RgbImage::from_raw(width, height, buf).map(DynamicImage::ImageRgb8)
        };
        pixels.ok_or_else(|| ImageError::UnsupportedFormat("truncated HEIF pixel data".into()))
    }

    pub(super) fn encode(handle: &ImageHandle, settings: EncodeSettings) -> Result<Vec<u8>, ImageError> {
        let rgb = canonical_pixels(handle.pixels(), ImageFormat::Heif).to_rgb8();
        let (width, height) = rgb.dimensions();

        let mut image = Image::new(width, height, ColorSpace::Rgb(RgbChroma::Rgb)).map_err(encode_err)?;
        image
            .create_plane(Channel::Interleaved, width, height, 8)
            .map_err(encode_err)?;

        {
            let planes = image.planes_mut();
            let mut plane = planes
                .interleaved
                .ok_or_else(|| ImageError::EncodeError("HEIF plane allocation failed".into()))?;
            let stride = plane.stride;
            let row_len = width as usize * 3;
            for (y, src) in rgb.as_raw().chunks(row_len).enumerate() {
                let start = y * stride;
                plane.data[start..start + row_len].copy_from_slice(src);
            }
        }

        let lib = LibHeif::new();
        let mut encoder = lib
            .encoder_for_format(CompressionFormat::Hevc)
            .map_err(encode_err)?;
        encoder
            .set_quality(EncoderQuality::Lossy(settings.quality.value()))
            .map_err(encode_err)?;

        let mut ctx = HeifContext::new().map_err(encode_err)?;
        ctx.encode_image(&image, &mut encoder, None).map_err(encode_err)?;
        ctx.write_to_bytes().map_err(encode_err)
    }
}

#[cfg(not(feature = "heif"))]
mod libheif {
    use image::DynamicImage;

    use crate::errors::ImageError;

    use super::super::{
        engine::{Dimensions, ImageHandle},
        format::EncodeSettings,
    };

    const MISSING: &str = "HEIF support requires the `heif` feature";

    pub(super) fn identify(_bytes: &[u8]) -> Result<Dimensions, ImageError> {
        Err(ImageError::UnsupportedFormat(MISSING.into()))
    }

    pub(super) fn decode(_bytes: &[u8]) -> Result<DynamicImage, ImageError> {
        Err(ImageError::UnsupportedFormat(MISSING.into()))
    }

    pub(super) fn encode(_handle: &ImageHandle, _settings: EncodeSettings) -> Result<Vec<u8>, ImageError> {
        Err(ImageError::EncodeError(MISSING.into()))
    }
}
