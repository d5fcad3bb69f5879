use actix_web::{get, HttpResponse, Responder};

use crate::imaging::{heif::HeifEngine, ImageFormat};

#[get("/")]
pub async fn home() -> impl Responder {
    HttpResponse::Ok().json(serde_json::json!({
        "message": "Welcome to the heifmgur image API!",
        "status": "Ok",
        "version": env!("CARGO_PKG_VERSION"),
        "canonical_format": ImageFormat::CANONICAL.mime_type(),
        "heif_support": HeifEngine::heif_enabled(),
        "images": "/api/v1/images"
    }))
}
