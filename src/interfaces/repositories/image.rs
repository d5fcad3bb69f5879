use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{self, PgPool};

use crate::{
    entities::image::{ImageRecord, NewImageRecord, UpdateImageRequest},
    errors::AppError,
    repositories::sqlx_repo::SqlxImageRepo,
};

/// Helper to compute OFFSET safely from 1-based `page` and `per_page`.
pub(crate) fn page_offset(page: u32, per_page: u32) -> i64 {
    let page = page.saturating_sub(1);
    (page as i64) * (per_page as i64)
}

const IMAGE_COLUMNS: &str =
    "id, name, description, url, picture, width, height, parent_picture, date_created, date_updated";

/// Record store keyed by id. Deleting a record cascades to its descendants.
#[async_trait]
pub trait ImageRepository: Send + Sync {
    async fn check_connection(&self) -> Result<(), AppError>;
    async fn create_image(&self, image: &NewImageRecord) -> Result<ImageRecord, AppError>;
    async fn get_image_by_id(&self, id: i64) -> Result<Option<ImageRecord>, AppError>;
    /// Ordered by id.
    async fn list_images(&self, page: u32, per_page: u32) -> Result<Vec<ImageRecord>, AppError>;
    async fn count_images(&self) -> Result<i64, AppError>;
    async fn update_image_fields(&self, id: i64, fields: &UpdateImageRequest) -> Result<ImageRecord, AppError>;
    async fn update_image_picture(&self, id: i64, picture: &str, width: i32, height: i32) -> Result<ImageRecord, AppError>;
    /// Transitive children of `id`, deepest first.
    async fn get_descendants(&self, id: i64) -> Result<Vec<ImageRecord>, AppError>;
    async fn delete_image(&self, id: i64) -> Result<(), AppError>;
}

#[async_trait]
impl<T: ImageRepository + ?Sized> ImageRepository for Arc<T> {
    async fn check_connection(&self) -> Result<(), AppError> {
        (**self).check_connection().await
    }

    async fn create_image(&self, image: &NewImageRecord) -> Result<ImageRecord, AppError> {
        (**self).create_image(image).await
    }

    async fn get_image_by_id(&self, id: i64) -> Result<Option<ImageRecord>, AppError> {
        (**self).get_image_by_id(id).await
    }

    async fn list_images(&self, page: u32, per_page: u32) -> Result<Vec<ImageRecord>, AppError> {
        (**self).list_images(page, per_page).await
    }

    async fn count_images(&self) -> Result<i64, AppError> {
        (**self).count_images().await
    }

    async fn update_image_fields(&self, id: i64, fields: &UpdateImageRequest) -> Result<ImageRecord, AppError> {
        (**self).update_image_fields(id, fields).await
    }

    async fn update_image_picture(&self, id: i64, picture: &str, width: i32, height: i32) -> Result<ImageRecord, AppError> {
        (**self).update_image_picture(id, picture, width, height).await
    }

    async fn get_descendants(&self, id: i64) -> Result<Vec<ImageRecord>, AppError> {
        (**self).get_descendants(id).await
    }

    async fn delete_image(&self, id: i64) -> Result<(), AppError> {
        (**self).delete_image(id).await
    }
}

impl SqlxImageRepo {
    pub fn new(pool: PgPool) -> Self {
        SqlxImageRepo { pool }
    }
}

#[async_trait]
impl ImageRepository for SqlxImageRepo {
    async fn check_connection(&self) -> Result<(), AppError> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map(|_| ())
            .map_err(|e| AppError::InternalError(format!("Database connection failed: {}", e)))
    }

    async fn create_image(&self, image: &NewImageRecord) -> Result<ImageRecord, AppError> {
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            r#"
            INSERT INTO images (
                name, description, url, picture, width, height, parent_picture,
                date_created, date_updated
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, NOW(), NOW())
            RETURNING {IMAGE_COLUMNS}
            "#
        ))
        .bind(&image.name)
        .bind(&image.description)
        .bind(&image.url)
        .bind(&image.picture)
        .bind(image.width)
        .bind(image.height)
        .bind(image.parent_picture)
        .fetch_one(&self.pool)
        .await?;

        Ok(record)
    }

    async fn get_image_by_id(&self, id: i64) -> Result<Option<ImageRecord>, AppError> {
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(record)
    }

    async fn list_images(&self, page: u32, per_page: u32) -> Result<Vec<ImageRecord>, AppError> {
        let records = sqlx::query_as::<_, ImageRecord>(&format!(
            "SELECT {IMAGE_COLUMNS} FROM images ORDER BY id LIMIT $1 OFFSET $2"
        ))
        .bind(per_page as i64)
        .bind(page_offset(page, per_page))
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn count_images(&self) -> Result<i64, AppError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM images")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn update_image_fields(&self, id: i64, fields: &UpdateImageRequest) -> Result<ImageRecord, AppError> {
        // CASE on an explicit "changed" flag keeps Unchanged apart from SetToNull
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            r#"
            UPDATE images SET
                name = COALESCE($2, name),
                description = CASE WHEN $3 THEN $4 ELSE description END,
                parent_picture = CASE WHEN $5 THEN $6 ELSE parent_picture END,
                date_updated = NOW()
            WHERE id = $1
            RETURNING {IMAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(fields.name.as_deref())
        .bind(!fields.description.is_unchanged())
        .bind(fields.description.value_ref().map(String::as_str))
        .bind(!fields.parent_picture.is_unchanged())
        .bind(fields.parent_picture.value_ref().copied())
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| AppError::NotFound(format!("Image {}", id)))
    }

    async fn update_image_picture(&self, id: i64, picture: &str, width: i32, height: i32) -> Result<ImageRecord, AppError> {
        let record = sqlx::query_as::<_, ImageRecord>(&format!(
            r#"
            UPDATE images SET
                picture = $2,
                width = $3,
                height = $4,
                date_updated = NOW()
            WHERE id = $1
            RETURNING {IMAGE_COLUMNS}
            "#
        ))
        .bind(id)
        .bind(picture)
        .bind(width)
        .bind(height)
        .fetch_optional(&self.pool)
        .await?;

        record.ok_or_else(|| AppError::NotFound(format!("Image {}", id)))
    }

    async fn get_descendants(&self, id: i64) -> Result<Vec<ImageRecord>, AppError> {
        let records = sqlx::query_as::<_, ImageRecord>(&format!(
            r#"
            WITH RECURSIVE subtree AS (
                SELECT {IMAGE_COLUMNS}, 1 AS depth
                FROM images
                WHERE parent_picture = $1
                UNION ALL
                SELECT c.id, c.name, c.description, c.url, c.picture, c.width, c.height,
                       c.parent_picture, c.date_created, c.date_updated, s.depth + 1
                FROM images c
                JOIN subtree s ON c.parent_picture = s.id
            )
            SELECT {IMAGE_COLUMNS} FROM subtree
            ORDER BY depth DESC, id DESC
            "#
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        Ok(records)
    }

    async fn delete_image(&self, id: i64) -> Result<(), AppError> {
        let result = sqlx::query("DELETE FROM images WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Image {}", id)));
        }
        Ok(())
    }
}
