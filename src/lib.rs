use std::sync::Arc;

mod domain;
mod interfaces;
mod infrastructure;
pub mod errors;
pub mod settings;
pub mod constants;
pub mod graceful_shutdown;
pub mod telemetry;

pub use domain::{entities, use_cases};
pub use interfaces::{handlers, middlewares, repositories, routes};
pub use infrastructure::{db, fetch, imaging, limiter, storage, utils};

use errors::AppError;
use fetch::RemoteFetcher;
use imaging::{FormatCodec, Quality};
use middlewares::throttle::Throttles;
use repositories::image::ImageRepository;
use storage::BlobStore;
use use_cases::{
    images::ImageService,
    pipeline::{ImagePipeline, PipelineSettings},
};

pub type AppImageService = ImageService<Arc<dyn ImageRepository>, Arc<dyn BlobStore>>;

pub struct AppState {
    pub image_service: AppImageService,
    pub throttles: Throttles,
}

impl AppState {
    pub fn new(
        config: &settings::AppConfig,
        image_repo: Arc<dyn ImageRepository>,
        blob_store: Arc<dyn BlobStore>,
    ) -> Result<Self, AppError> {
        let pipeline = build_pipeline(config)?;
        let throttles = Throttles::from_config(config)?;

        Ok(AppState {
            image_service: ImageService::new(image_repo, blob_store, pipeline),
            throttles,
        })
    }
}

pub fn build_pipeline(config: &settings::AppConfig) -> Result<ImagePipeline, AppError> {
    let heif_quality = Quality::new(config.heif_quality)?;
    let jpeg_quality = Quality::new(config.jpeg_quality)?;

    let codec = Arc::new(FormatCodec::new());
    let fetcher = RemoteFetcher::new(
        codec.clone(),
        config.fetch_timeout(),
        config.max_download_bytes,
        heif_quality,
    )?;

    Ok(ImagePipeline::new(
        codec,
        fetcher,
        PipelineSettings {
            heif_quality,
            jpeg_quality,
            ..PipelineSettings::default()
        },
    ))
}
