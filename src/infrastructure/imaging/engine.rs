use image::DynamicImage;
use serde::Serialize;

use crate::errors::ImageError;

use super::format::{EncodeSettings, ImageFormat};

/// Which implementation owns a decoded handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    /// `image` crate decoders and encoders.
    Raster,
    /// Broad-format engine: raster formats plus HEIF/HEIC through libheif.
    Heif,
}

impl EngineKind {
    pub fn other(&self) -> EngineKind {
        match self {
            EngineKind::Raster => EngineKind::Heif,
            EngineKind::Heif => EngineKind::Raster,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Dimensions {
    pub width: u32,
    pub height: u32,
}

impl From<(u32, u32)> for Dimensions {
    fn from((width, height): (u32, u32)) -> Self {
        Self { width, height }
    }
}

/// Decoded image tagged with the engine that produced it and the logical
/// format it came from (or was converted to).
#[derive(Debug, Clone)]
pub struct ImageHandle {
    engine: EngineKind,
    format: ImageFormat,
    pixels: DynamicImage,
}

impl ImageHandle {
    pub(crate) fn new(engine: EngineKind, format: ImageFormat, pixels: DynamicImage) -> Self {
        Self { engine, format, pixels }
    }

    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn pixels(&self) -> &DynamicImage {
        &self.pixels
    }

    pub fn dimensions(&self) -> Dimensions {
        Dimensions {
            width: self.pixels.width(),
            height: self.pixels.height(),
        }
    }

    pub(crate) fn with_format(self, format: ImageFormat) -> Self {
        Self { format, ..self }
    }

    pub(crate) fn with_pixels(self, pixels: DynamicImage) -> Self {
        Self { pixels, ..self }
    }

    pub(crate) fn into_pixels(self) -> DynamicImage {
        self.pixels
    }
}

/// Common capability surface of both engines.
pub trait ImageEngine: Send + Sync {
    fn kind(&self) -> EngineKind;

    fn readable_formats(&self) -> &[ImageFormat];

    fn writable_formats(&self) -> &[ImageFormat];

    fn can_read(&self, format: ImageFormat) -> bool {
        self.readable_formats().contains(&format)
    }

    fn can_write(&self, format: ImageFormat) -> bool {
        self.writable_formats().contains(&format)
    }

    /// Full decode; `UnsupportedFormat` when the bytes cannot be parsed.
    fn decode(&self, bytes: &[u8]) -> Result<ImageHandle, ImageError>;

    /// Header-only dimension read.
    fn identify(&self, bytes: &[u8]) -> Result<Dimensions, ImageError>;

    fn encode(&self, handle: &ImageHandle, settings: EncodeSettings) -> Result<Vec<u8>, ImageError>;
}

/// Converts pixels to the color mode the target encoder expects: RGBA when
/// the format keeps alpha and the source has it, RGB otherwise.
pub fn canonical_pixels(pixels: &DynamicImage, format: ImageFormat) -> DynamicImage {
    if format.supports_alpha() && pixels.color().has_alpha() {
        match pixels {
            DynamicImage::ImageRgba8(_) => pixels.clone(),
            other => DynamicImage::ImageRgba8(other.to_rgba8()),
        }
    } else {
        match pixels {
            DynamicImage::ImageRgb8(_) => pixels.clone(),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        }
    }
}
