use std::sync::Arc;

use actix_multipart::form::MultipartFormConfig;
use actix_web::{middleware::NormalizePath, web, App, HttpServer};
use heifmgur::{
    db::postgres::create_pool,
    graceful_shutdown::shutdown_signal,
    middlewares::{cors::cors_policy, throttle::ThrottleMiddleware},
    repositories::{image::ImageRepository, memory::MemoryImageRepo, sqlx_repo::SqlxImageRepo},
    routes::configure_routes,
    settings::AppConfig,
    storage::{BlobStore, FsBlobStore},
    telemetry::init_tracing,
    AppState,
};
use tracing_actix_web::TracingLogger;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    let config = match AppConfig::new() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    init_tracing(config.log_format);
    tracing::info!("Loaded configuration: {:?}", config);

    let image_repo: Arc<dyn ImageRepository> = match &config.database_url {
        Some(url) => {
            let pool = create_pool(url, (config.worker_count as u32).max(5) * 2)
                .await
                .map_err(std::io::Error::other)?;
            Arc::new(SqlxImageRepo::new(pool))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, records are kept in memory");
            Arc::new(MemoryImageRepo::new())
        }
    };

    tokio::fs::create_dir_all(&config.media_root).await?;
    let blob_store: Arc<dyn BlobStore> = Arc::new(FsBlobStore::new(&config.media_root));

    let app_state = match AppState::new(&config, image_repo, blob_store) {
        Ok(state) => web::Data::new(state),
        Err(e) => {
            tracing::error!("Failed to build application state: {}", e);
            std::process::exit(1);
        }
    };
    app_state.throttles.spawn_eviction();

    let server_addr = format!("{}:{}", config.host, config.port);

    tracing::info!(
        "🚀 Starting {} v{} on {}",
        config.name,
        env!("CARGO_PKG_VERSION"),
        server_addr
    );

    let server_config = config.clone();
    let server = HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(
                MultipartFormConfig::default()
                    .total_limit(server_config.max_upload_bytes)
                    .memory_limit(server_config.max_upload_bytes),
            )
            .wrap(ThrottleMiddleware)
            .wrap(NormalizePath::trim())
            .wrap(cors_policy(&server_config))
            .wrap(TracingLogger::default())
            .configure(configure_routes)
    })
    .workers(config.worker_count)
    .bind(server_addr)?
    .run();

    tokio::select! {
        res = server => res,
        _ = shutdown_signal() => Ok(()),
    }
}
