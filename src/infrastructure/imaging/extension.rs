use std::collections::BTreeSet;

use crate::{errors::ImageError, utils::file_name::file_extension};

use super::format::ImageFormat;

/// Extensions accepted regardless of which raster decoders are compiled in.
const ALWAYS_ALLOWED: &[&str] = &["HEIF", "HEIC", "JPEG", "JPG", "ICO"];

/// Upload whitelist: advertised raster formats plus HEIF, HEIC, JPEG, JPG and ICO.
#[derive(Debug, Clone)]
pub struct ExtensionValidator {
    allowed: BTreeSet<String>,
}

impl ExtensionValidator {
    pub fn new(advertised: &[ImageFormat]) -> Self {
        let allowed = advertised
            .iter()
            .flat_map(|format| format.extensions().iter())
            .map(|ext| ext.to_ascii_uppercase())
            .chain(ALWAYS_ALLOWED.iter().map(|ext| ext.to_string()))
            .collect();
        Self { allowed }
    }

    pub fn allowed(&self) -> impl Iterator<Item = &str> {
        self.allowed.iter().map(String::as_str)
    }

    pub fn is_allowed(&self, extension: &str) -> bool {
        !extension.is_empty() && self.allowed.contains(&extension.to_ascii_uppercase())
    }

    pub fn validate(&self, file_name: &str) -> Result<(), ImageError> {
        let extension = file_extension(file_name).unwrap_or_default();
        if self.is_allowed(&extension) {
            return Ok(());
        }
        Err(ImageError::UnsupportedExtension {
            extension,
            allowed: self.allowed().map(|ext| ext.to_ascii_lowercase()).collect(),
        })
    }
}
