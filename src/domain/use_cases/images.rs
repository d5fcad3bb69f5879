use tracing::{error, info, instrument, warn};
use validator::Validate;

use crate::{
    constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE},
    entities::{
        image::{CreateImage, ImageListResponse, ImageRecord, ImageRecordBuilder, UpdateImageRequest},
        option_fields::OptionField,
    },
    errors::{AppError, ImageError},
    imaging::{Dimensions, ImageFormat},
    repositories::image::ImageRepository,
    storage::BlobStore,
    use_cases::pipeline::{ImagePipeline, NormalizedImage},
    utils::file_name::file_extension,
};

/// Image use cases over the pipeline, the blob store and the record store.
pub struct ImageService<R, B>
where
    R: ImageRepository,
    B: BlobStore,
{
    pub image_repo: R,
    pub blob_store: B,
    pub pipeline: ImagePipeline,
}

impl<R, B> ImageService<R, B>
where
    R: ImageRepository,
    B: BlobStore,
{
    pub fn new(image_repo: R, blob_store: B, pipeline: ImagePipeline) -> Self {
        ImageService { image_repo, blob_store, pipeline }
    }

    /// Creates a record from exactly one of an uploaded file or a URL.
    #[instrument(skip(self, input), fields(has_file = input.file.is_some(), url = ?input.url))]
    pub async fn create(&self, input: CreateImage) -> Result<ImageRecord, AppError> {
        input.validate()?;

        let CreateImage { file, url, name, description, parent_picture } = input;

        if let Some(parent) = parent_picture {
            self.ensure_parent_exists(parent).await?;
        }

        let normalized: NormalizedImage = match (file, url.as_deref()) {
            (Some(file), None) => {
                let pipeline = self.pipeline.clone();
                tokio::task::spawn_blocking(move || pipeline.normalize_upload(&file.bytes, &file.file_name))
                    .await??
            }
            (None, Some(url)) => self.pipeline.normalize_from_url(url).await?,
            (Some(_), Some(_)) => {
                return Err(ImageError::InvalidInput("provide either a picture or a url, not both".into()).into());
            }
            (None, None) => {
                return Err(ImageError::InvalidInput("a picture or a url is required".into()).into());
            }
        };

        let path = self.blob_store.save(&normalized.file_name, &normalized.bytes).await?;

        let new_record = ImageRecordBuilder::new()
            .name(name)
            .derived_name(normalized.name.clone())
            .description(description)
            .url(url)
            .parent_picture(parent_picture)
            .picture(path.clone(), Dimensions { width: normalized.width, height: normalized.height })
            .build();

        let created = match new_record {
            Ok(record) => self.image_repo.create_image(&record).await,
            Err(e) => Err(e.into()),
        };

        match created {
            Ok(record) => {
                info!(id = record.id, picture = %record.picture, "image created");
                Ok(record)
            }
            Err(e) => {
                if let Err(cleanup) = self.blob_store.delete(&path).await {
                    error!(path = %path, error = %cleanup, "failed to remove orphaned blob");
                }
                Err(e)
            }
        }
    }

    pub async fn get(&self, id: i64) -> Result<ImageRecord, AppError> {
        self.image_repo
            .get_image_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Image {}", id)))
    }

    pub async fn list(&self, page: Option<u32>, per_page: Option<u32>) -> Result<ImageListResponse, AppError> {
        let page = page.unwrap_or(1).max(1);
        let per_page = per_page.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);

        let results = self.image_repo.list_images(page, per_page).await?;
        let count = self.image_repo.count_images().await?;

        Ok(ImageListResponse { count, page, per_page, results })
    }

    /// Updates name, description and parent. A parent equal to the image or
    /// below it in the tree is rejected.
    #[instrument(skip(self, fields))]
    pub async fn update(&self, id: i64, fields: &UpdateImageRequest) -> Result<ImageRecord, AppError> {
        fields.validate()?;
        self.get(id).await?;

        if let OptionField::SetToValue(parent) = fields.parent_picture {
            if parent == id {
                return Err(ImageError::SelfReferenceError { id, parent }.into());
            }
            self.ensure_parent_exists(parent).await?;

            let descendants = self.image_repo.get_descendants(id).await?;
            if descendants.iter().any(|d| d.id == parent) {
                return Err(ImageError::SelfReferenceError { id, parent }.into());
            }
        }

        self.image_repo.update_image_fields(id, fields).await
    }

    /// Replaces the stored binary with a `width`x`height` rendition at the
    /// same path and persists the new dimensions.
    #[instrument(skip(self))]
    pub async fn resize(&self, id: i64, width: i64, height: i64) -> Result<ImageRecord, AppError> {
        self.pipeline.check_dimensions(width, height)?;

        let record = self.get(id).await?;
        let bytes = self.blob_store.read(&record.picture).await?;

        let pipeline = self.pipeline.clone();
        let resized = tokio::task::spawn_blocking(move || pipeline.resize(&bytes, width, height)).await??;

        self.blob_store.delete(&record.picture).await?;
        let path = match self.blob_store.replace(&record.picture, &resized.bytes).await {
            Ok(path) => path,
            Err(e) => {
                error!(id, picture = %record.picture, error = %e, "resized blob not written, record points at a deleted file");
                return Err(e.into());
            }
        };

        let width = i32::try_from(resized.width)
            .map_err(|_| ImageError::InvalidInput("width out of range".into()))?;
        let height = i32::try_from(resized.height)
            .map_err(|_| ImageError::InvalidInput("height out of range".into()))?;

        let updated = self
            .image_repo
            .update_image_picture(id, &path, width, height)
            .await
            .inspect_err(|e| error!(id, picture = %path, error = %e, "resized blob written but dimensions not saved"))?;
        info!(id, width, height, picture = %updated.picture, "image resized");
        Ok(updated)
    }

    /// Removes the subtree deepest first, each blob before its record, so a
    /// blob failure only leaves records whose blobs still exist.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: i64) -> Result<(), AppError> {
        let record = self.get(id).await?;
        let descendants = self.image_repo.get_descendants(id).await?;

        for image in descendants.iter().chain(std::iter::once(&record)) {
            if let Err(e) = self.blob_store.delete(&image.picture).await {
                warn!(id = image.id, picture = %image.picture, error = %e, "blob deletion failed, keeping remaining records");
                let message = match e {
                    ImageError::StorageError(msg) => msg,
                    other => other.to_string(),
                };
                return Err(ImageError::StorageError(message).into());
            }
            self.image_repo.delete_image(image.id).await?;
        }

        info!(id, cascaded = descendants.len(), "image deleted");
        Ok(())
    }

    /// Stored bytes, or a display rendition when `format` is given.
    pub async fn picture(&self, id: i64, format: Option<ImageFormat>) -> Result<(Vec<u8>, ImageFormat), AppError> {
        let record = self.get(id).await?;
        let bytes = self.blob_store.read(&record.picture).await?;

        match format {
            Some(format) => {
                let pipeline = self.pipeline.clone();
                let rendered = tokio::task::spawn_blocking(move || pipeline.render(bytes, format)).await??;
                Ok((rendered, format))
            }
            None => {
                let stored = ImageFormat::sniff(&bytes)
                    .or_else(|| file_extension(&record.picture).and_then(|ext| ImageFormat::from_extension(&ext)))
                    .unwrap_or(ImageFormat::CANONICAL);
                Ok((bytes, stored))
            }
        }
    }

    async fn ensure_parent_exists(&self, parent: i64) -> Result<(), AppError> {
        match self.image_repo.get_image_by_id(parent).await? {
            Some(_) => Ok(()),
            None => Err(ImageError::InvalidInput(format!("parent image {} does not exist", parent)).into()),
        }
    }
}
