use actix_web::{get, web, HttpResponse, Responder};
use chrono::{DateTime, Utc};
use humantime::format_duration;
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use serde::Serialize;
use std::time::Duration;
use sysinfo::System;

use crate::{
    constants::START_TIME,
    imaging::{heif::HeifEngine, ImageFormat},
    repositories::image::ImageRepository,
    AppState,
};

const CACHE_TTL_SECS: i64 = 5;

#[derive(Serialize, Clone)]
struct HostInfo {
    os: String,
    hostname: String,
    cpu_count: usize,
    memory_total: String,
    process_memory: String,
}

#[derive(Serialize, Clone)]
struct ImagingInfo {
    canonical_format: String,
    heif_support: bool,
    max_resize_dimension: u32,
    accepted_extensions: Vec<String>,
}

#[derive(Serialize, Clone)]
struct HealthReport {
    status: &'static str,
    database: &'static str,
    image_count: Option<i64>,
    version: &'static str,
    uptime: String,
    checked_at: DateTime<Utc>,
    imaging: ImagingInfo,
    host: HostInfo,
}

/// Last report; rebuilt at most every `CACHE_TTL_SECS`.
static LAST_REPORT: Lazy<RwLock<Option<HealthReport>>> = Lazy::new(|| RwLock::new(None));

fn host_info() -> HostInfo {
    let mut sys = System::new_all();
    sys.refresh_all();

    let process_memory = sysinfo::get_current_pid()
        .ok()
        .and_then(|pid| sys.process(pid))
        .map_or_else(
            || "Unknown".to_string(),
            |p| format!("{:.2} MB", p.memory() as f64 / 1024.0 / 1024.0),
        );

    HostInfo {
        os: System::long_os_version().unwrap_or_else(|| "Unknown".to_string()),
        hostname: System::host_name().unwrap_or_else(|| "Unknown".to_string()),
        cpu_count: sys.cpus().len(),
        memory_total: format!("{:.2} GB", sys.total_memory() as f64 / 1024.0 / 1024.0 / 1024.0),
        process_memory,
    }
}

async fn build_report(state: &AppState) -> HealthReport {
    let service = &state.image_service;
    let now = Utc::now();
    let uptime = now.signed_duration_since(*START_TIME).num_seconds().max(0) as u64;

    let (status, database, image_count) = match service.image_repo.check_connection().await {
        Ok(()) => ("healthy", "OK", service.image_repo.count_images().await.ok()),
        Err(e) => {
            tracing::warn!(error = %e, "health check: record store unreachable");
            ("degraded", "Unavailable", None)
        }
    };

    let pipeline = &service.pipeline;
    HealthReport {
        status,
        database,
        image_count,
        version: env!("CARGO_PKG_VERSION"),
        uptime: format_duration(Duration::from_secs(uptime)).to_string(),
        checked_at: now,
        imaging: ImagingInfo {
            canonical_format: ImageFormat::CANONICAL.to_string(),
            heif_support: HeifEngine::heif_enabled(),
            max_resize_dimension: pipeline.settings().max_dimension,
            accepted_extensions: pipeline
                .validator()
                .allowed()
                .map(|ext| ext.to_ascii_lowercase())
                .collect(),
        },
        host: host_info(),
    }
}

#[get("/health")]
pub async fn admin_health_check(state: web::Data<AppState>) -> impl Responder {
    let fresh = LAST_REPORT
        .read()
        .as_ref()
        .filter(|report| (Utc::now() - report.checked_at).num_seconds() < CACHE_TTL_SECS)
        .cloned();

    let report = match fresh {
        Some(report) => report,
        None => {
            let report = build_report(&state).await;
            *LAST_REPORT.write() = Some(report.clone());
            report
        }
    };

    HttpResponse::Ok().json(report)
}
