use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{constants::DEFAULT_QUALITY, errors::ImageError};

/// Container formats the service can read or write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    Bmp,
    Ico,
    Tiff,
    WebP,
    Heif,
}

impl ImageFormat {
    /// Storage format every ingested image is normalized to.
    pub const CANONICAL: ImageFormat = ImageFormat::Heif;

    pub const ALL: [ImageFormat; 8] = [
        ImageFormat::Jpeg,
        ImageFormat::Png,
        ImageFormat::Gif,
        ImageFormat::Bmp,
        ImageFormat::Ico,
        ImageFormat::Tiff,
        ImageFormat::WebP,
        ImageFormat::Heif,
    ];

    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "jpg" | "jpeg" | "jpe" => Some(ImageFormat::Jpeg),
            "png" => Some(ImageFormat::Png),
            "gif" => Some(ImageFormat::Gif),
            "bmp" => Some(ImageFormat::Bmp),
            "ico" => Some(ImageFormat::Ico),
            "tif" | "tiff" => Some(ImageFormat::Tiff),
            "webp" => Some(ImageFormat::WebP),
            "heif" | "heic" | "hif" => Some(ImageFormat::Heif),
            _ => None,
        }
    }

    /// Extension used when writing a blob of this format.
    pub fn extension(&self) -> &'static str {
        self.extensions()[0]
    }

    pub fn extensions(&self) -> &'static [&'static str] {
        match self {
            ImageFormat::Jpeg => &["jpg", "jpeg", "jpe"],
            ImageFormat::Png => &["png"],
            ImageFormat::Gif => &["gif"],
            ImageFormat::Bmp => &["bmp"],
            ImageFormat::Ico => &["ico"],
            ImageFormat::Tiff => &["tiff", "tif"],
            ImageFormat::WebP => &["webp"],
            ImageFormat::Heif => &["heic", "heif", "hif"],
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ImageFormat::Jpeg => "image/jpeg",
            ImageFormat::Png => "image/png",
            ImageFormat::Gif => "image/gif",
            ImageFormat::Bmp => "image/bmp",
            ImageFormat::Ico => "image/vnd.microsoft.icon",
            ImageFormat::Tiff => "image/tiff",
            ImageFormat::WebP => "image/webp",
            ImageFormat::Heif => "image/heic",
        }
    }

    pub fn from_mime_type(mime: &str) -> Option<Self> {
        let essence = mime.split(';').next().unwrap_or_default().trim().to_ascii_lowercase();
        match essence.as_str() {
            "image/jpeg" | "image/jpg" | "image/pjpeg" => Some(ImageFormat::Jpeg),
            "image/png" => Some(ImageFormat::Png),
            "image/gif" => Some(ImageFormat::Gif),
            "image/bmp" | "image/x-ms-bmp" => Some(ImageFormat::Bmp),
            "image/vnd.microsoft.icon" | "image/x-icon" => Some(ImageFormat::Ico),
            "image/tiff" => Some(ImageFormat::Tiff),
            "image/webp" => Some(ImageFormat::WebP),
            "image/heic" | "image/heif" | "image/heic-sequence" | "image/heif-sequence" => {
                Some(ImageFormat::Heif)
            }
            _ => None,
        }
    }

    /// Detects the container from magic bytes.
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        let kind = infer::get(bytes)?;
        Self::from_mime_type(kind.mime_type())
    }

    pub fn is_heif(&self) -> bool {
        matches!(self, ImageFormat::Heif)
    }

    /// Whether the encoder keeps an alpha channel.
    pub fn supports_alpha(&self) -> bool {
        !matches!(self, ImageFormat::Jpeg | ImageFormat::Heif | ImageFormat::Bmp)
    }

    pub fn to_raster(&self) -> Option<image::ImageFormat> {
        match self {
            ImageFormat::Jpeg => Some(image::ImageFormat::Jpeg),
            ImageFormat::Png => Some(image::ImageFormat::Png),
            ImageFormat::Gif => Some(image::ImageFormat::Gif),
            ImageFormat::Bmp => Some(image::ImageFormat::Bmp),
            ImageFormat::Ico => Some(image::ImageFormat::Ico),
            ImageFormat::Tiff => Some(image::ImageFormat::Tiff),
            ImageFormat::WebP => Some(image::ImageFormat::WebP),
            ImageFormat::Heif => None,
        }
    }

    pub fn from_raster(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Jpeg => Some(ImageFormat::Jpeg),
            image::ImageFormat::Png => Some(ImageFormat::Png),
            image::ImageFormat::Gif => Some(ImageFormat::Gif),
            image::ImageFormat::Bmp => Some(ImageFormat::Bmp),
            image::ImageFormat::Ico => Some(ImageFormat::Ico),
            image::ImageFormat::Tiff => Some(ImageFormat::Tiff),
            image::ImageFormat::WebP => Some(ImageFormat::WebP),
            _ => None,
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ImageFormat::Jpeg => "JPEG",
            ImageFormat::Png => "PNG",
            ImageFormat::Gif => "GIF",
            ImageFormat::Bmp => "BMP",
            ImageFormat::Ico => "ICO",
            ImageFormat::Tiff => "TIFF",
            ImageFormat::WebP => "WEBP",
            ImageFormat::Heif => "HEIF",
        };
        write!(f, "{name}")
    }
}

impl FromStr for ImageFormat {
    type Err = ImageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
            .or_else(|| Self::from_mime_type(s))
            .ok_or_else(|| ImageError::UnsupportedFormat(s.to_string()))
    }
}

/// Encoder quality, 1 (smallest) to 100 (best).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quality(u8);

impl Quality {
    pub fn new(value: u8) -> Result<Self, ImageError> {
        if (1..=100).contains(&value) {
            Ok(Self(value))
        } else {
            Err(ImageError::EncodeError(format!(
                "quality must be between 1 and 100, got {value}"
            )))
        }
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(DEFAULT_QUALITY)
    }
}

/// Immutable per-call encoder settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodeSettings {
    pub format: ImageFormat,
    pub quality: Quality,
}

impl EncodeSettings {
    pub fn new(format: ImageFormat, quality: Quality) -> Self {
        Self { format, quality }
    }

    /// Lossless intermediate used when moving pixels between engines.
    pub fn lossless() -> Self {
        Self {
            format: ImageFormat::Png,
            quality: Quality(100),
        }
    }
}

impl From<ImageFormat> for EncodeSettings {
    fn from(format: ImageFormat) -> Self {
        Self::new(format, Quality::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_case_insensitive() {
        assert_eq!(ImageFormat::from_extension("JPG"), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_extension(".HeIc"), Some(ImageFormat::Heif));
        assert_eq!(ImageFormat::from_extension("tif"), Some(ImageFormat::Tiff));
        assert_eq!(ImageFormat::from_extension("exe"), None);
    }

    #[test]
    fn canonical_format_writes_heic() {
        assert_eq!(ImageFormat::CANONICAL.extension(), "heic");
        assert_eq!(ImageFormat::CANONICAL.mime_type(), "image/heic");
        assert!(ImageFormat::CANONICAL.to_raster().is_none());
    }

    #[test]
    fn sniffs_png_magic() {
        let png = [0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A, 0, 0, 0, 0x0D];
        assert_eq!(ImageFormat::sniff(&png), Some(ImageFormat::Png));
        assert_eq!(ImageFormat::sniff(b"plain text"), None);
    }

    #[test]
    fn quality_bounds() {
        assert!(Quality::new(0).is_err());
        assert!(Quality::new(101).is_err());
        assert_eq!(Quality::new(100).map(|q| q.value()), Ok(100));
        assert_eq!(Quality::default().value(), 90);
    }

    #[test]
    fn parses_from_mime_or_extension() {
        assert_eq!("jpeg".parse::<ImageFormat>(), Ok(ImageFormat::Jpeg));
        assert_eq!("image/webp".parse::<ImageFormat>(), Ok(ImageFormat::WebP));
        assert!("bogus".parse::<ImageFormat>().is_err());
    }
}
