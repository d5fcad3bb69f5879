use image::imageops::FilterType;
use tracing::debug;

use crate::{constants::MAX_RESIZE_DIMENSION, errors::ImageError};

use super::{
    engine::{canonical_pixels, Dimensions, EngineKind, ImageEngine, ImageHandle},
    format::{EncodeSettings, ImageFormat},
    heif::HeifEngine,
    raster::RasterEngine,
};

/// Both engines behind one interface. Every transform returns a new handle.
#[derive(Debug, Default, Clone)]
pub struct FormatCodec {
    raster: RasterEngine,
    heif: HeifEngine,
}

impl FormatCodec {
    pub fn new() -> Self {
        Self {
            raster: RasterEngine::new(),
            heif: HeifEngine::new(),
        }
    }

    pub fn engine(&self, kind: EngineKind) -> &dyn ImageEngine {
        match kind {
            EngineKind::Raster => &self.raster,
            EngineKind::Heif => &self.heif,
        }
    }

    /// Formats the raster engine can decode; the extension whitelist starts here.
    pub fn advertised_formats(&self) -> &[ImageFormat] {
        self.raster.readable_formats()
    }

    pub fn decode(&self, bytes: &[u8], kind: EngineKind) -> Result<ImageHandle, ImageError> {
        self.engine(kind).decode(bytes)
    }

    /// Picks the fast engine when it reads the sniffed format, the broad one otherwise.
    pub fn decode_any(&self, bytes: &[u8]) -> Result<ImageHandle, ImageError> {
        match ImageFormat::sniff(bytes) {
            Some(format) if self.raster.can_read(format) => self.raster.decode(bytes),
            Some(_) => self.heif.decode(bytes),
            None => Err(ImageError::UnsupportedFormat("unrecognized image data".into())),
        }
    }

    pub fn identify(&self, bytes: &[u8]) -> Result<Dimensions, ImageError> {
        match ImageFormat::sniff(bytes) {
            Some(format) if self.raster.can_read(format) => self.raster.identify(bytes),
            Some(_) => self.heif.identify(bytes),
            None => Err(ImageError::UnsupportedFormat("unrecognized image data".into())),
        }
    }

    pub fn dimensions(&self, handle: &ImageHandle) -> Dimensions {
        handle.dimensions()
    }

    /// Exact resize with Lanczos3 after moving to the format's color mode.
    /// Bounds above 1 are the caller's concern.
    pub fn resize(&self, handle: &ImageHandle, width: u32, height: u32) -> Result<ImageHandle, ImageError> {
        if width == 0 || height == 0 {
            return Err(ImageError::InvalidDimension {
                width: width as i64,
                height: height as i64,
                max: MAX_RESIZE_DIMENSION,
            });
        }

        let pixels = canonical_pixels(handle.pixels(), handle.format())
            .resize_exact(width, height, FilterType::Lanczos3);
        Ok(ImageHandle::new(handle.engine(), handle.format(), pixels))
    }

    /// Re-targets the handle's logical format. The pixels are only re-encoded
    /// on [`encode`](Self::encode).
    pub fn convert(&self, handle: ImageHandle, target: ImageFormat) -> Result<ImageHandle, ImageError> {
        if handle.format() == target {
            return Ok(handle);
        }
        if !self.engine(handle.engine()).can_write(target) {
            return Err(ImageError::ConversionError(format!(
                "{:?} engine cannot write {target}",
                handle.engine()
            )));
        }

        let pixels = canonical_pixels(handle.pixels(), target);
        Ok(handle.with_pixels(pixels).with_format(target))
    }

    pub fn encode(&self, handle: &ImageHandle, settings: EncodeSettings) -> Result<Vec<u8>, ImageError> {
        self.engine(handle.engine()).encode(handle, settings)
    }

    /// Moves a handle to the other engine through a lossless PNG buffer.
    pub fn bridge(&self, handle: &ImageHandle) -> Result<ImageHandle, ImageError> {
        let source = handle.engine();
        let target = source.other();

        let buffer = self
            .encode(handle, EncodeSettings::lossless())
            .map_err(|e| ImageError::ConversionError(format!("bridge encode failed: {e}")))?;
        let moved = self
            .decode(&buffer, target)
            .map_err(|e| ImageError::ConversionError(format!("bridge decode failed: {e}")))?;

        debug!(from = ?source, to = ?target, format = %handle.format(), "bridged handle");
        Ok(moved.with_format(handle.format()))
    }

    /// Converts to `target`, bridging first when the current engine cannot write it.
    pub fn to_format(&self, handle: ImageHandle, target: ImageFormat) -> Result<ImageHandle, ImageError> {
        if handle.format() == target {
            return Ok(handle);
        }
        let handle = if self.engine(handle.engine()).can_write(target) {
            handle
        } else {
            self.bridge(&handle)?
        };
        self.convert(handle, target)
    }

    /// Decode, convert and encode in one step.
    pub fn transcode(&self, bytes: &[u8], settings: EncodeSettings) -> Result<Vec<u8>, ImageError> {
        let handle = self.decode_any(bytes)?;
        let handle = self.to_format(handle, settings.format)?;
        self.encode(&handle, settings)
    }
}
