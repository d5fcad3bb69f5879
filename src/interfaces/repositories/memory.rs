use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use crate::{
    entities::image::{ImageRecord, NewImageRecord, UpdateImageRequest},
    errors::AppError,
    repositories::image::{page_offset, ImageRepository},
};

/// Process-local record store, used when no database is configured and in tests.
#[derive(Debug)]
pub struct MemoryImageRepo {
    records: DashMap<i64, ImageRecord>,
    next_id: AtomicI64,
}

impl Default for MemoryImageRepo {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryImageRepo {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }

    fn ensure_parent(&self, parent: Option<i64>) -> Result<(), AppError> {
        match parent {
            Some(parent) if !self.records.contains_key(&parent) => {
                Err(AppError::Conflict("Foreign key violation".into()))
            }
            _ => Ok(()),
        }
    }

    fn children_of(&self, id: i64) -> Vec<i64> {
        let mut children: Vec<i64> = self
            .records
            .iter()
            .filter(|entry| entry.parent_picture == Some(id))
            .map(|entry| *entry.key())
            .collect();
        children.sort_unstable();
        children
    }

    /// Breadth-first walk, returned deepest level first.
    fn subtree(&self, id: i64) -> Vec<i64> {
        let mut levels: Vec<Vec<i64>> = Vec::new();
        let mut frontier = self.children_of(id);
        while !frontier.is_empty() {
            let next: Vec<i64> = frontier.iter().flat_map(|child| self.children_of(*child)).collect();
            levels.push(frontier);
            frontier = next;
        }
        levels.into_iter().rev().flat_map(|level| level.into_iter().rev()).collect()
    }
}

#[async_trait]
impl ImageRepository for MemoryImageRepo {
    async fn check_connection(&self) -> Result<(), AppError> {
        Ok(())
    }

    async fn create_image(&self, image: &NewImageRecord) -> Result<ImageRecord, AppError> {
        self.ensure_parent(image.parent_picture)?;

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let record = ImageRecord {
            id,
            name: image.name.clone(),
            description: image.description.clone(),
            url: image.url.clone(),
            picture: image.picture.clone(),
            width: image.width,
            height: image.height,
            parent_picture: image.parent_picture,
            date_created: now,
            date_updated: now,
        };
        self.records.insert(id, record.clone());
        Ok(record)
    }

    async fn get_image_by_id(&self, id: i64) -> Result<Option<ImageRecord>, AppError> {
        Ok(self.records.get(&id).map(|r| r.clone()))
    }

    async fn list_images(&self, page: u32, per_page: u32) -> Result<Vec<ImageRecord>, AppError> {
        let mut all: Vec<ImageRecord> = self.records.iter().map(|r| r.clone()).collect();
        all.sort_by_key(|r| r.id);
        Ok(all
            .into_iter()
            .skip(page_offset(page, per_page) as usize)
            .take(per_page as usize)
            .collect())
    }

    async fn count_images(&self) -> Result<i64, AppError> {
        Ok(self.records.len() as i64)
    }

    async fn update_image_fields(&self, id: i64, fields: &UpdateImageRequest) -> Result<ImageRecord, AppError> {
        if let Some(parent) = fields.parent_picture.value_ref() {
            self.ensure_parent(Some(*parent))?;
        }

        let mut record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Image {}", id)))?;

        if let Some(name) = &fields.name {
            record.name = name.clone();
        }
        let description = record.description.take();
        record.description = fields.description.apply(description);
        let parent = record.parent_picture;
        record.parent_picture = fields.parent_picture.apply(parent);
        record.date_updated = Utc::now();
        Ok(record.clone())
    }

    async fn update_image_picture(&self, id: i64, picture: &str, width: i32, height: i32) -> Result<ImageRecord, AppError> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or_else(|| AppError::NotFound(format!("Image {}", id)))?;

        record.picture = picture.to_string();
        record.width = width;
        record.height = height;
        record.date_updated = Utc::now();
        Ok(record.clone())
    }

    async fn get_descendants(&self, id: i64) -> Result<Vec<ImageRecord>, AppError> {
        Ok(self
            .subtree(id)
            .into_iter()
            .filter_map(|child| self.records.get(&child).map(|r| r.clone()))
            .collect())
    }

    async fn delete_image(&self, id: i64) -> Result<(), AppError> {
        if !self.records.contains_key(&id) {
            return Err(AppError::NotFound(format!("Image {}", id)));
        }
        let cascade = self.subtree(id);
        debug!(id, cascaded = cascade.len(), "deleting image record");
        for child in cascade {
            self.records.remove(&child);
        }
        self.records.remove(&id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::option_fields::OptionField;

    fn new_record(name: &str, parent: Option<i64>) -> NewImageRecord {
        NewImageRecord {
            name: name.into(),
            description: None,
            url: None,
            picture: format!("{name}.heic"),
            width: 10,
            height: 10,
            parent_picture: parent,
        }
    }

    #[actix_rt::test]
    async fn cascade_removes_subtree() {
        let repo = MemoryImageRepo::new();
        let root = repo.create_image(&new_record("root", None)).await.unwrap();
        let child = repo.create_image(&new_record("child", Some(root.id))).await.unwrap();
        let grandchild = repo.create_image(&new_record("grandchild", Some(child.id))).await.unwrap();
        let other = repo.create_image(&new_record("other", None)).await.unwrap();

        let descendants: Vec<i64> = repo
            .get_descendants(root.id)
            .await
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(descendants, vec![grandchild.id, child.id]);

        repo.delete_image(root.id).await.unwrap();
        assert_eq!(repo.count_images().await.unwrap(), 1);
        assert!(repo.get_image_by_id(other.id).await.unwrap().is_some());
    }

    #[actix_rt::test]
    async fn list_is_ordered_and_paged() {
        let repo = MemoryImageRepo::new();
        for i in 0..5 {
            repo.create_image(&new_record(&format!("img{i}"), None)).await.unwrap();
        }
        let page: Vec<i64> = repo.list_images(2, 2).await.unwrap().iter().map(|r| r.id).collect();
        assert_eq!(page, vec![3, 4]);
    }

    #[actix_rt::test]
    async fn patch_fields() {
        let repo = MemoryImageRepo::new();
        let mut record = new_record("a", None);
        record.description = Some("desc".into());
        let created = repo.create_image(&record).await.unwrap();

        let updated = repo
            .update_image_fields(
                created.id,
                &UpdateImageRequest {
                    name: Some("renamed".into()),
                    description: OptionField::SetToNull,
                    parent_picture: OptionField::Unchanged,
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "renamed");
        assert_eq!(updated.description, None);
        assert_eq!(updated.picture, created.picture);
    }

    #[actix_rt::test]
    async fn unknown_parent_is_rejected() {
        let repo = MemoryImageRepo::new();
        let result = repo.create_image(&new_record("orphan", Some(99))).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }
}
