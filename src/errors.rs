use std::borrow::Cow;
use std::fmt;

use actix_web::{
    error::ResponseError,
    http::{header::{self, ContentType}, StatusCode},
    HttpResponse
};
use derive_more::Display;
use serde::Serialize;
use validator::ValidationErrors;

#[derive(Debug)]
pub enum AppError {
    ValidationError(Vec<FieldError>),
    NotFound(String),
    Conflict(String),
    RateLimited { retry_after: u64 },
    InternalError(String),
    Image(ImageError),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::ValidationError(errors) => {
                let messages = errors.iter()
                    .map(|e| format!("{}:{}", e.field, e.message))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "validation error: {}", messages)
            }
            AppError::NotFound(msg) => write!(f, "Not found: {}", msg),
            AppError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            AppError::RateLimited { retry_after } => {
                write!(f, "Request was throttled, retry in {} seconds", retry_after)
            }
            AppError::InternalError(msg) => write!(f, "Internal server error: {}", msg),
            AppError::Image(err) => write!(f, "{}", err),
        }
    }
}

impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        match self {
            AppError::Image(err) => err.error_response(),
            AppError::ValidationError(errors) => {
                HttpResponse::build(self.status_code())
                    .insert_header(ContentType::json())
                    .json(serde_json::json!({
                        "error": "Validation failed",
                        "details": errors
                    }))
            }
            AppError::RateLimited { retry_after } => {
                HttpResponse::build(self.status_code())
                    .insert_header((header::RETRY_AFTER, retry_after.to_string()))
                    .json(serde_json::json!({"error": self.to_string()}))
            }
            _ => {
                HttpResponse::build(self.status_code())
                    .insert_header(ContentType::json())
                    .json(serde_json::json!({"error": self.to_string()}))
            }
        }
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimited { .. } => StatusCode::TOO_MANY_REQUESTS,
            AppError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Image(err) => err.status_code(),
        }
    }
}

impl From<ValidationErrors> for AppError {
    fn from(errors: ValidationErrors) -> Self {
        let field_errors = errors
            .field_errors()
            .iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(|e| FieldError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|s| s.to_string())
                        .unwrap_or_else(|| "Invalid value".to_string()),
                })
            })
            .collect();

        AppError::ValidationError(field_errors)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::NotFound("Image record".into()),
            sqlx::Error::Database(e) if e.code() == Some(Cow::Borrowed("23505")) => {
                AppError::Conflict("Database conflict occurred".into())
            }
            sqlx::Error::Database(e) if e.code() == Some(Cow::Borrowed("23503")) => {
                AppError::Conflict("Foreign key violation".into())
            }
            _ => AppError::InternalError(format!("Database error: {}", err))
        }
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        AppError::Image(err)
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        AppError::InternalError(format!("Image task failed: {}", err))
    }
}

/// Failures of the ingestion and transformation pipeline and of the blob store.
#[derive(Debug, Display, Clone, PartialEq)]
pub enum ImageError {
    #[display("Unsupported file extension '{extension}'")]
    UnsupportedExtension {
        extension: String,
        allowed: Vec<String>,
    },

    #[display("Unsupported image format: {_0}")]
    UnsupportedFormat(String),

    #[display("Image conversion failed: {_0}")]
    ConversionError(String),

    #[display("Image encoding failed: {_0}")]
    EncodeError(String),

    #[display("Invalid dimensions {width}x{height}: width and height must be between 1 and {max}")]
    InvalidDimension {
        width: i64,
        height: i64,
        max: u32,
    },

    #[display("URL is unreachable or does not point to an image: {_0}")]
    UnreachableOrNotImage(String),

    #[display("Download failed: {_0}")]
    FetchError(String),

    #[display("Invalid input: {_0}")]
    InvalidInput(String),

    #[display("Image {id} cannot take image {parent} as its parent")]
    SelfReferenceError {
        id: i64,
        parent: i64,
    },

    #[display("Storage error: {_0}")]
    StorageError(String),
}

impl ImageError {
    pub fn code(&self) -> &'static str {
        match self {
            ImageError::UnsupportedExtension { .. } => "unsupported_extension",
            ImageError::UnsupportedFormat(_) => "unsupported_format",
            ImageError::ConversionError(_) => "conversion_error",
            ImageError::EncodeError(_) => "encode_error",
            ImageError::InvalidDimension { .. } => "invalid_dimension",
            ImageError::UnreachableOrNotImage(_) => "unreachable_or_not_image",
            ImageError::FetchError(_) => "fetch_error",
            ImageError::InvalidInput(_) => "invalid_input",
            ImageError::SelfReferenceError { .. } => "self_reference",
            ImageError::StorageError(_) => "storage_error",
        }
    }

    /// Client-fault errors are detected before anything is written.
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }
}

impl ResponseError for ImageError {
    fn error_response(&self) -> HttpResponse {
        let body = match self {
            ImageError::UnsupportedExtension { allowed, .. } => serde_json::json!({
                "error": self.code(),
                "message": self.to_string(),
                "allowed": allowed,
            }),
            _ => serde_json::json!({
                "error": self.code(),
                "message": self.to_string(),
            }),
        };
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .json(body)
    }

    fn status_code(&self) -> StatusCode {
        match self {
            ImageError::UnsupportedExtension { .. } => StatusCode::BAD_REQUEST,
            ImageError::UnsupportedFormat(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ImageError::ConversionError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageError::EncodeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ImageError::InvalidDimension { .. } => StatusCode::BAD_REQUEST,
            ImageError::UnreachableOrNotImage(_) => StatusCode::BAD_REQUEST,
            ImageError::FetchError(_) => StatusCode::BAD_GATEWAY,
            ImageError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ImageError::SelfReferenceError { .. } => StatusCode::BAD_REQUEST,
            ImageError::StorageError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<std::io::Error> for ImageError {
    fn from(err: std::io::Error) -> Self {
        ImageError::StorageError(err.to_string())
    }
}

impl From<reqwest::Error> for ImageError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ImageError::FetchError(format!("request timed out: {}", err))
        } else {
            ImageError::FetchError(err.to_string())
        }
    }
}

impl From<image::ImageError> for ImageError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Unsupported(e) => ImageError::UnsupportedFormat(e.to_string()),
            image::ImageError::Encoding(e) => ImageError::EncodeError(e.to_string()),
            image::ImageError::IoError(e) => ImageError::StorageError(e.to_string()),
            other => ImageError::UnsupportedFormat(other.to_string()),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}
