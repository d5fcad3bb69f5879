mod test_utils;

use std::sync::Arc;

use async_trait::async_trait;
use heifmgur::{
    build_pipeline,
    entities::{
        image::{CreateImage, ImageRecord, NewImageRecord, UpdateImageRequest, UploadedFile},
        option_fields::OptionField,
    },
    errors::{AppError, ImageError},
    imaging::{Dimensions, ImageFormat},
    repositories::{image::ImageRepository, memory::MemoryImageRepo},
    storage::{BlobStore, FsBlobStore},
    use_cases::images::ImageService,
    utils::file_name::parse_file_name,
};
use mockall::{mock, predicate::*};
use tempfile::TempDir;
use test_utils::{png_fixture, seed_record, test_config};

mock! {
    pub Repo {}

    #[async_trait]
    impl ImageRepository for Repo {
        async fn check_connection(&self) -> Result<(), AppError>;
        async fn create_image(&self, image: &NewImageRecord) -> Result<ImageRecord, AppError>;
        async fn get_image_by_id(&self, id: i64) -> Result<Option<ImageRecord>, AppError>;
        async fn list_images(&self, page: u32, per_page: u32) -> Result<Vec<ImageRecord>, AppError>;
        async fn count_images(&self) -> Result<i64, AppError>;
        async fn update_image_fields(&self, id: i64, fields: &UpdateImageRequest) -> Result<ImageRecord, AppError>;
        async fn update_image_picture(&self, id: i64, picture: &str, width: i32, height: i32) -> Result<ImageRecord, AppError>;
        async fn get_descendants(&self, id: i64) -> Result<Vec<ImageRecord>, AppError>;
        async fn delete_image(&self, id: i64) -> Result<(), AppError>;
    }
}

mock! {
    pub Blobs {}

    #[async_trait]
    impl BlobStore for Blobs {
        async fn save(&self, name: &str, bytes: &[u8]) -> Result<String, ImageError>;
        async fn replace(&self, path: &str, bytes: &[u8]) -> Result<String, ImageError>;
        async fn read(&self, path: &str) -> Result<Vec<u8>, ImageError>;
        async fn delete(&self, path: &str) -> Result<(), ImageError>;
    }
}

fn mocked_service(repo: Arc<MemoryImageRepo>, blobs: MockBlobs) -> ImageService<Arc<MemoryImageRepo>, MockBlobs> {
    let pipeline = build_pipeline(&test_config("unused")).expect("Failed to build pipeline");
    ImageService::new(repo, blobs, pipeline)
}

struct FsFixture {
    service: ImageService<Arc<MemoryImageRepo>, Arc<FsBlobStore>>,
    repo: Arc<MemoryImageRepo>,
    blobs: Arc<FsBlobStore>,
    _media: TempDir,
}

fn fs_service() -> FsFixture {
    let media = TempDir::new().unwrap();
    let repo = Arc::new(MemoryImageRepo::new());
    let blobs = Arc::new(FsBlobStore::new(media.path()));
    let pipeline = build_pipeline(&test_config(media.path().to_string_lossy().as_ref())).unwrap();

    FsFixture {
        service: ImageService::new(repo.clone(), blobs.clone(), pipeline),
        repo,
        blobs,
        _media: media,
    }
}

async fn insert(repo: &MemoryImageRepo, picture: &str, parent: Option<i64>) -> i64 {
    repo.create_image(&NewImageRecord {
        name: "seeded".into(),
        description: None,
        url: None,
        picture: picture.into(),
        width: 10,
        height: 10,
        parent_picture: parent,
    })
    .await
    .unwrap()
    .id
}

fn upload() -> UploadedFile {
    UploadedFile {
        file_name: "sunset.png".into(),
        bytes: png_fixture(),
    }
}

#[actix_rt::test]
async fn create_requires_exactly_one_source() {
    let service = mocked_service(Arc::new(MemoryImageRepo::new()), MockBlobs::new());

    let both = CreateImage {
        file: Some(upload()),
        url: Some("http://example.com/sunset.png".into()),
        ..Default::default()
    };
    let err = service.create(both).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::InvalidInput(_))), "got {err:?}");

    let err = service.create(CreateImage::default()).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::InvalidInput(_))), "got {err:?}");
}

#[actix_rt::test]
async fn create_rejects_unknown_parent() {
    let service = mocked_service(Arc::new(MemoryImageRepo::new()), MockBlobs::new());

    let input = CreateImage {
        file: Some(upload()),
        parent_picture: Some(42),
        ..Default::default()
    };
    let err = service.create(input).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::InvalidInput(_))), "got {err:?}");
}

#[actix_rt::test]
async fn bad_extension_writes_nothing() {
    let repo = Arc::new(MemoryImageRepo::new());
    let service = mocked_service(repo.clone(), MockBlobs::new());

    let input = CreateImage {
        file: Some(UploadedFile { file_name: "notes.txt".into(), bytes: b"hello".to_vec() }),
        ..Default::default()
    };
    let err = service.create(input).await.unwrap_err();

    assert!(matches!(err, AppError::Image(ImageError::UnsupportedExtension { .. })), "got {err:?}");
    assert_eq!(repo.count_images().await.unwrap(), 0);
}

#[cfg(feature = "heif")]
#[actix_rt::test]
async fn create_from_upload_stores_heif() {
    let fx = fs_service();

    let record = fx
        .service
        .create(CreateImage {
            file: Some(upload()),
            description: Some("evening".into()),
            ..Default::default()
        })
        .await
        .unwrap();

    assert_eq!(record.name, "sunset");
    assert_eq!(record.description.as_deref(), Some("evening"));
    assert!(record.picture.ends_with("sunset.heic"), "{}", record.picture);
    assert_eq!((record.width, record.height), (1460, 366));

    let stored = fx.blobs.read(&record.picture).await.unwrap();
    assert_eq!(ImageFormat::sniff(&stored), Some(ImageFormat::Heif));
}

#[cfg(feature = "heif")]
#[actix_rt::test]
async fn failed_insert_removes_saved_blob() {
    let mut repo = MockRepo::new();
    repo.expect_create_image()
        .times(1)
        .returning(|_| Err(AppError::InternalError("connection reset".into())));

    let mut blobs = MockBlobs::new();
    blobs
        .expect_save()
        .times(1)
        .returning(|name, _| Ok(format!("2024/01/01/{name}")));
    blobs
        .expect_delete()
        .with(eq("2024/01/01/sunset.heic"))
        .times(1)
        .returning(|_| Ok(()));

    let pipeline = build_pipeline(&test_config("unused")).unwrap();
    let service = ImageService::new(repo, blobs, pipeline);

    let err = service
        .create(CreateImage { file: Some(upload()), ..Default::default() })
        .await
        .unwrap_err();
    assert!(matches!(err, AppError::InternalError(_)), "got {err:?}");
}

#[actix_rt::test]
async fn update_rejects_cycles() {
    let repo = Arc::new(MemoryImageRepo::new());
    let root = insert(&repo, "a.png", None).await;
    let child = insert(&repo, "b.png", Some(root)).await;
    let grandchild = insert(&repo, "c.png", Some(child)).await;
    let service = mocked_service(repo.clone(), MockBlobs::new());

    let to_self = UpdateImageRequest {
        parent_picture: OptionField::SetToValue(root),
        ..Default::default()
    };
    let err = service.update(root, &to_self).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::SelfReferenceError { .. })), "got {err:?}");

    let to_descendant = UpdateImageRequest {
        parent_picture: OptionField::SetToValue(grandchild),
        ..Default::default()
    };
    let err = service.update(root, &to_descendant).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::SelfReferenceError { .. })), "got {err:?}");

    let unknown = UpdateImageRequest {
        parent_picture: OptionField::SetToValue(999),
        ..Default::default()
    };
    let err = service.update(root, &unknown).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::InvalidInput(_))), "got {err:?}");

    assert_eq!(service.get(root).await.unwrap().parent_picture, None);
}

#[actix_rt::test]
async fn update_edits_only_writable_fields() {
    let repo = Arc::new(MemoryImageRepo::new());
    let a = insert(&repo, "a.png", None).await;
    let b = insert(&repo, "b.png", None).await;
    let service = mocked_service(repo.clone(), MockBlobs::new());

    let fields = UpdateImageRequest {
        name: Some("renamed".into()),
        description: OptionField::SetToValue("new text".into()),
        parent_picture: OptionField::SetToValue(a),
    };
    let updated = service.update(b, &fields).await.unwrap();
    assert_eq!(updated.name, "renamed");
    assert_eq!(updated.description.as_deref(), Some("new text"));
    assert_eq!(updated.parent_picture, Some(a));
    assert_eq!(updated.picture, "b.png");

    let clear = UpdateImageRequest {
        parent_picture: OptionField::SetToNull,
        ..Default::default()
    };
    let updated = service.update(b, &clear).await.unwrap();
    assert_eq!(updated.parent_picture, None);
    assert_eq!(updated.name, "renamed");
}

#[actix_rt::test]
async fn invalid_resize_touches_nothing() {
    let repo = Arc::new(MemoryImageRepo::new());
    let id = insert(&repo, "a.png", None).await;
    // no expectations: any blob access fails the test
    let service = mocked_service(repo.clone(), MockBlobs::new());

    for (w, h) in [(0, 100), (100, -1), (4001, 100)] {
        let err = service.resize(id, w, h).await.unwrap_err();
        assert!(matches!(err, AppError::Image(ImageError::InvalidDimension { .. })), "got {err:?}");
    }

    let record = service.get(id).await.unwrap();
    assert_eq!((record.width, record.height), (10, 10));
}

#[actix_rt::test]
async fn resize_keeps_file_name_and_is_repeatable() {
    let fx = fs_service();
    let original = seed_record(&fx.repo, &fx.blobs, "sunset.png", &png_fixture(), None).await;

    let resized = fx.service.resize(original.id, 300, 200).await.unwrap();
    assert_eq!((resized.width, resized.height), (300, 200));
    assert_eq!(parse_file_name(&resized.picture, true), parse_file_name(&original.picture, true));

    let bytes = fx.blobs.read(&resized.picture).await.unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (300, 200));

    let again = fx.service.resize(original.id, 300, 200).await.unwrap();
    assert_eq!((again.width, again.height), (300, 200));
    assert_eq!(parse_file_name(&again.picture, true), "sunset.png");
}

#[actix_rt::test]
async fn failed_rewrite_after_resize_is_reported() {
    let repo = Arc::new(MemoryImageRepo::new());
    let id = insert(&repo, "2024/05/01/a.png", None).await;

    let mut blobs = MockBlobs::new();
    blobs.expect_read().times(1).returning(|_| Ok(png_fixture()));
    blobs
        .expect_delete()
        .with(eq("2024/05/01/a.png"))
        .times(1)
        .returning(|_| Ok(()));
    blobs
        .expect_replace()
        .times(1)
        .returning(|_, _| Err(ImageError::StorageError("disk full".into())));
    let service = mocked_service(repo.clone(), blobs);

    let err = service.resize(id, 300, 200).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::StorageError(ref m)) if m == "disk full"));

    let record = repo.get_image_by_id(id).await.unwrap().unwrap();
    assert_eq!((record.width, record.height), (10, 10));
}

#[actix_rt::test]
async fn resize_of_missing_image_is_not_found() {
    let fx = fs_service();
    let err = fx.service.resize(77, 300, 200).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)), "got {err:?}");
}

#[actix_rt::test]
async fn failed_blob_delete_keeps_record() {
    let repo = Arc::new(MemoryImageRepo::new());
    let id = insert(&repo, "2024/05/01/a.heic", None).await;

    let mut blobs = MockBlobs::new();
    blobs
        .expect_delete()
        .with(eq("2024/05/01/a.heic"))
        .times(1)
        .returning(|_| Err(ImageError::StorageError("disk unplugged".into())));
    let service = mocked_service(repo.clone(), blobs);

    let err = service.delete(id).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::StorageError(ref m)) if m == "disk unplugged"));
    assert!(repo.get_image_by_id(id).await.unwrap().is_some());
}

#[actix_rt::test]
async fn failed_blob_delete_keeps_only_records_with_blobs() {
    let repo = Arc::new(MemoryImageRepo::new());
    let root = insert(&repo, "root.heic", None).await;
    let child = insert(&repo, "child.heic", Some(root)).await;

    let mut blobs = MockBlobs::new();
    blobs
        .expect_delete()
        .with(eq("child.heic"))
        .times(1)
        .returning(|_| Ok(()));
    blobs
        .expect_delete()
        .with(eq("root.heic"))
        .times(1)
        .returning(|_| Err(ImageError::StorageError("boom".into())));
    let service = mocked_service(repo.clone(), blobs);

    let err = service.delete(root).await.unwrap_err();
    assert!(matches!(err, AppError::Image(ImageError::StorageError(ref m)) if m == "boom"));

    assert!(repo.get_image_by_id(child).await.unwrap().is_none());
    let kept = repo.get_image_by_id(root).await.unwrap().unwrap();
    assert_eq!(kept.picture, "root.heic");
}

#[actix_rt::test]
async fn resize_stays_in_original_directory() {
    let fx = fs_service();
    let old_path = fx.blobs.replace("2020/01/01/sunset.png", &png_fixture()).await.unwrap();
    let old_id = insert(&fx.repo, &old_path, None).await;
    // a newer upload with the same name lands in today's directory
    seed_record(&fx.repo, &fx.blobs, "sunset.png", &png_fixture(), None).await;

    let resized = fx.service.resize(old_id, 300, 200).await.unwrap();
    assert_eq!(resized.picture, "2020/01/01/sunset.png");

    let bytes = fx.blobs.read(&resized.picture).await.unwrap();
    let decoded = image::load_from_memory(&bytes).unwrap();
    assert_eq!((decoded.width(), decoded.height()), (300, 200));
}

#[cfg(feature = "heif")]
#[actix_rt::test]
async fn resize_of_ingested_heif_stays_heif() {
    let fx = fs_service();
    let created = fx
        .service
        .create(CreateImage { file: Some(upload()), ..Default::default() })
        .await
        .unwrap();

    for (w, h) in [(300u32, 200u32), (301, 201)] {
        let resized = fx.service.resize(created.id, w as i64, h as i64).await.unwrap();
        assert_eq!(resized.picture, created.picture);
        assert_eq!((resized.width, resized.height), (w as i32, h as i32));

        let bytes = fx.blobs.read(&resized.picture).await.unwrap();
        assert_eq!(ImageFormat::sniff(&bytes), Some(ImageFormat::Heif));
        let codec = fx.service.pipeline.codec();
        assert_eq!(codec.identify(&bytes).unwrap(), Dimensions { width: w, height: h });
        let decoded = codec.decode_any(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), Dimensions { width: w, height: h });
    }
}

#[actix_rt::test]
async fn delete_cascades_to_descendants() {
    let fx = fs_service();
    let png = png_fixture();
    let root = seed_record(&fx.repo, &fx.blobs, "root.png", &png, None).await;
    let child = seed_record(&fx.repo, &fx.blobs, "child.png", &png, Some(root.id)).await;
    let leaf = seed_record(&fx.repo, &fx.blobs, "leaf.png", &png, Some(child.id)).await;
    let other = seed_record(&fx.repo, &fx.blobs, "other.png", &png, None).await;

    fx.service.delete(root.id).await.unwrap();

    for gone in [&root, &child, &leaf] {
        assert!(fx.repo.get_image_by_id(gone.id).await.unwrap().is_none());
        assert!(fx.blobs.read(&gone.picture).await.is_err());
    }
    assert!(fx.repo.get_image_by_id(other.id).await.unwrap().is_some());
    assert!(fx.blobs.read(&other.picture).await.is_ok());

    let err = fx.service.delete(root.id).await.unwrap_err();
    assert!(matches!(err, AppError::NotFound(_)));
}

#[actix_rt::test]
async fn list_pages_are_clamped() {
    let repo = Arc::new(MemoryImageRepo::new());
    for n in 0..3 {
        insert(&repo, &format!("{n}.png"), None).await;
    }
    let service = mocked_service(repo, MockBlobs::new());

    let page = service.list(Some(0), Some(500)).await.unwrap();
    assert_eq!(page.page, 1);
    assert_eq!(page.per_page, 100);
    assert_eq!(page.count, 3);
    assert_eq!(page.results.len(), 3);

    let page = service.list(Some(2), Some(2)).await.unwrap();
    assert_eq!(page.results.len(), 1);
}
