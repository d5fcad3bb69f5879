use actix_multipart::form::{tempfile::TempFile, text::Text, MultipartForm};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::{
    entities::option_fields::OptionField,
    errors::ImageError,
    imaging::Dimensions,
};

pub const MAX_NAME_LENGTH: u64 = 255;
pub const MAX_URL_LENGTH: u64 = 255;

// ───── Persisted record ─────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct ImageRecord {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    /// Blob path, relative to the media root.
    pub picture: String,
    pub width: i32,
    pub height: i32,
    pub parent_picture: Option<i64>,
    pub date_created: DateTime<Utc>,
    pub date_updated: DateTime<Utc>,
}

/// Insert payload; only produced by [`ImageRecordBuilder::build`].
#[derive(Debug, Clone, PartialEq)]
pub struct NewImageRecord {
    pub name: String,
    pub description: Option<String>,
    pub url: Option<String>,
    pub picture: String,
    pub width: i32,
    pub height: i32,
    pub parent_picture: Option<i64>,
}

/// Accumulates client fields and pipeline-derived fields for a new record.
#[derive(Debug, Default, Clone)]
pub struct ImageRecordBuilder {
    name: Option<String>,
    derived_name: Option<String>,
    description: Option<String>,
    url: Option<String>,
    parent_picture: Option<i64>,
    picture: Option<String>,
    dimensions: Option<Dimensions>,
}

impl ImageRecordBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Client-supplied name; blank names fall back to the derived one.
    pub fn name(mut self, name: Option<String>) -> Self {
        self.name = name.filter(|n| !n.trim().is_empty());
        self
    }

    pub fn derived_name(mut self, name: impl Into<String>) -> Self {
        self.derived_name = Some(name.into());
        self
    }

    pub fn description(mut self, description: Option<String>) -> Self {
        self.description = description;
        self
    }

    pub fn url(mut self, url: Option<String>) -> Self {
        self.url = url;
        self
    }

    pub fn parent_picture(mut self, parent: Option<i64>) -> Self {
        self.parent_picture = parent;
        self
    }

    pub fn picture(mut self, path: impl Into<String>, dimensions: Dimensions) -> Self {
        self.picture = Some(path.into());
        self.dimensions = Some(dimensions);
        self
    }

    pub fn build(self) -> Result<NewImageRecord, ImageError> {
        let picture = self
            .picture
            .ok_or_else(|| ImageError::InvalidInput("picture path is missing".into()))?;
        let dimensions = self
            .dimensions
            .ok_or_else(|| ImageError::InvalidInput("picture dimensions are missing".into()))?;
        let name = self
            .name
            .or(self.derived_name)
            .ok_or_else(|| ImageError::InvalidInput("image name is missing".into()))?;

        let width = i32::try_from(dimensions.width)
            .map_err(|_| ImageError::InvalidInput("width out of range".into()))?;
        let height = i32::try_from(dimensions.height)
            .map_err(|_| ImageError::InvalidInput("height out of range".into()))?;
        if width < 1 || height < 1 {
            return Err(ImageError::InvalidInput("picture has empty dimensions".into()));
        }

        Ok(NewImageRecord {
            name: truncate(name, MAX_NAME_LENGTH as usize),
            description: self.description,
            url: self.url,
            picture,
            width,
            height,
            parent_picture: self.parent_picture,
        })
    }
}

fn truncate(mut value: String, max_chars: usize) -> String {
    if let Some((idx, _)) = value.char_indices().nth(max_chars) {
        value.truncate(idx);
    }
    value
}

// ───── Create input ─────────────────────────────────────────────────

/// JSON body for URL ingestion.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateImageRequest {
    #[validate(url(message = "Enter a valid URL"), length(max = MAX_URL_LENGTH))]
    pub url: Option<String>,

    #[validate(length(max = MAX_NAME_LENGTH))]
    pub name: Option<String>,

    pub description: Option<String>,

    pub parent_picture: Option<i64>,
}

/// Multipart body for file uploads; `url` may also be sent here.
#[derive(Debug, MultipartForm)]
pub struct ImageUploadForm {
    #[multipart(limit = "25MB")]
    pub picture: Option<TempFile>,
    pub url: Option<Text<String>>,
    pub name: Option<Text<String>>,
    pub description: Option<Text<String>>,
    pub parent_picture: Option<Text<i64>>,
}

#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Transport-neutral create command.
#[derive(Debug, Clone, Default, Validate)]
pub struct CreateImage {
    pub file: Option<UploadedFile>,

    #[validate(url(message = "Enter a valid URL"), length(max = MAX_URL_LENGTH))]
    pub url: Option<String>,

    #[validate(length(max = MAX_NAME_LENGTH))]
    pub name: Option<String>,

    pub description: Option<String>,

    pub parent_picture: Option<i64>,
}

impl From<CreateImageRequest> for CreateImage {
    fn from(req: CreateImageRequest) -> Self {
        Self {
            file: None,
            url: req.url.filter(|u| !u.trim().is_empty()),
            name: req.name,
            description: req.description,
            parent_picture: req.parent_picture,
        }
    }
}

// ───── Update / resize / queries ────────────────────────────────────

/// Only these fields are client-writable after creation.
#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
#[serde(default)]
pub struct UpdateImageRequest {
    #[validate(length(min = 1, max = MAX_NAME_LENGTH))]
    pub name: Option<String>,

    pub description: OptionField<String>,

    pub parent_picture: OptionField<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ResizeRequest {
    pub width: i64,
    pub height: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ListQuery {
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PictureQuery {
    pub format: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ImageListResponse {
    pub count: i64,
    pub page: u32,
    pub per_page: u32,
    pub results: Vec<ImageRecord>,
}
