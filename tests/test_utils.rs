#![allow(dead_code)]

use std::{io::Cursor, net::TcpListener, sync::Arc, time::Duration};

use actix_multipart::form::MultipartFormConfig;
use actix_web::{middleware::NormalizePath, web, App, HttpResponse, HttpServer};
use heifmgur::{
    entities::image::{ImageRecord, NewImageRecord},
    middlewares::throttle::ThrottleMiddleware,
    repositories::{image::ImageRepository, memory::MemoryImageRepo},
    routes::configure_routes,
    settings::{AppConfig, AppEnvironment, LogFormat, ThrottleRates},
    storage::{BlobStore, FsBlobStore},
    AppState,
};
use image::{ImageBuffer, Rgb, RgbImage};
use reqwest::Client;
use tempfile::TempDir;

pub const FIXTURE_WIDTH: u32 = 1460;
pub const FIXTURE_HEIGHT: u32 = 366;

pub struct TestApp {
    pub state: web::Data<AppState>,
    pub address: String,
    pub client: Client,
    pub config: AppConfig,
    pub repo: Arc<MemoryImageRepo>,
    pub blobs: Arc<FsBlobStore>,
    _media: TempDir,
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(ThrottleRates {
            list_burst: "1000/minute".into(),
            list_sustained: "10000/day".into(),
            detail_burst: "1000/minute".into(),
            detail_sustained: "10000/day".into(),
            action_burst: "1000/minute".into(),
            action_sustained: "10000/day".into(),
        })
        .await
    }

    pub async fn spawn_with(throttle: ThrottleRates) -> Self {
        let media = TempDir::new().expect("Failed to create media dir");
        let mut config = test_config(media.path().to_string_lossy().as_ref());
        config.throttle = throttle;

        let repo = Arc::new(MemoryImageRepo::new());
        let blobs = Arc::new(FsBlobStore::new(media.path()));

        let state = web::Data::new(
            AppState::new(&config, repo.clone(), blobs.clone()).expect("Failed to build state"),
        );

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        let server_state = state.clone();
        let max_upload = config.max_upload_bytes;
        let server = HttpServer::new(move || {
            App::new()
                .app_data(server_state.clone())
                .app_data(
                    MultipartFormConfig::default()
                        .total_limit(max_upload)
                        .memory_limit(max_upload),
                )
                .wrap(ThrottleMiddleware)
                .wrap(NormalizePath::trim())
                .configure(configure_routes)
        })
        .listen(listener)
        .expect("Failed to bind server")
        .workers(1)
        .run();

        tokio::spawn(server);

        let client = Client::new();
        while client.get(&format!("{}/", address)).send().await.is_err() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self {
            state,
            address,
            client,
            config,
            repo,
            blobs,
            _media: media,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.address, path)
    }

    /// Stores `bytes` and inserts a record pointing at them.
    pub async fn seed(&self, file_name: &str, bytes: &[u8], parent: Option<i64>) -> ImageRecord {
        seed_record(&self.repo, &self.blobs, file_name, bytes, parent).await
    }
}

pub async fn seed_record(
    repo: &MemoryImageRepo,
    blobs: &FsBlobStore,
    file_name: &str,
    bytes: &[u8],
    parent: Option<i64>,
) -> ImageRecord {
    let picture = blobs.save(file_name, bytes).await.expect("Failed to save blob");
    let dims = image::load_from_memory(bytes)
        .map(|img| (img.width() as i32, img.height() as i32))
        .unwrap_or((FIXTURE_WIDTH as i32, FIXTURE_HEIGHT as i32));

    repo.create_image(&NewImageRecord {
        name: file_name.rsplit_once('.').map(|(n, _)| n).unwrap_or(file_name).to_string(),
        description: None,
        url: None,
        picture,
        width: dims.0,
        height: dims.1,
        parent_picture: parent,
    })
    .await
    .expect("Failed to insert record")
}

pub fn test_config(media_root: &str) -> AppConfig {
    AppConfig {
        env: AppEnvironment::Testing,
        name: "heifmgur test".to_string(),
        port: 0,
        host: "127.0.0.1".to_string(),
        worker_count: 1,
        database_url: None,
        media_root: media_root.to_string(),
        cors_allowed_origins: vec!["*".to_string()],
        trust_x_forwarded_for: false,
        log_format: LogFormat::Pretty,
        fetch_timeout_secs: 5,
        max_download_bytes: 5 * 1024 * 1024,
        max_upload_bytes: 5 * 1024 * 1024,
        heif_quality: 80,
        jpeg_quality: 85,
        throttle: ThrottleRates::default(),
    }
}

fn fixture() -> RgbImage {
    ImageBuffer::from_fn(FIXTURE_WIDTH, FIXTURE_HEIGHT, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
    })
}

pub fn png_fixture() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    fixture()
        .write_to(&mut out, image::ImageFormat::Png)
        .expect("Failed to encode PNG fixture");
    out.into_inner()
}

pub fn jpeg_fixture() -> Vec<u8> {
    let mut out = Cursor::new(Vec::new());
    fixture()
        .write_to(&mut out, image::ImageFormat::Jpeg)
        .expect("Failed to encode JPEG fixture");
    out.into_inner()
}

/// Local stand-in for third-party image hosts.
pub struct RemoteHost {
    pub address: String,
}

impl RemoteHost {
    pub async fn spawn() -> Self {
        let png = web::Bytes::from(png_fixture());
        let jpeg = web::Bytes::from(jpeg_fixture());

        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        let address = format!("http://127.0.0.1:{}", port);

        let server = HttpServer::new(move || {
            let png = png.clone();
            let jpeg = jpeg.clone();
            App::new()
                .route(
                    "/photos/sunset.png",
                    web::get().to(move || {
                        let body = png.clone();
                        async move { HttpResponse::Ok().content_type("image/png").body(body) }
                    }),
                )
                .route(
                    "/photos/harbour.jpg",
                    web::get().to(move || {
                        let body = jpeg.clone();
                        async move { HttpResponse::Ok().content_type("image/jpeg").body(body) }
                    }),
                )
                .route(
                    "/notes.txt",
                    web::get().to(|| async { HttpResponse::Ok().content_type("text/plain").body("hello") }),
                )
                .route(
                    "/fake.png",
                    web::get().to(|| async { HttpResponse::Ok().content_type("image/png").body("not an image") }),
                )
        })
        .listen(listener)
        .expect("Failed to bind remote host")
        .workers(1)
        .run();

        tokio::spawn(server);

        let client = Client::new();
        while client.get(&format!("{}/notes.txt", address)).send().await.is_err() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        Self { address }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.address, path)
    }
}
