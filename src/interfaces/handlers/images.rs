use actix_multipart::form::MultipartForm;
use actix_web::{web, Either, HttpResponse, Responder};
use tracing::instrument;

use crate::{
    entities::image::{
        CreateImage, CreateImageRequest, ImageUploadForm, ListQuery, PictureQuery, ResizeRequest,
        UpdateImageRequest, UploadedFile,
    },
    errors::{AppError, ImageError},
    imaging::ImageFormat,
    AppState,
};

#[instrument(skip(state, query))]
pub async fn list_images(
    state: web::Data<AppState>,
    query: web::Query<ListQuery>,
) -> Result<impl Responder, AppError> {
    let query = query.into_inner();
    let images = state.image_service.list(query.page, query.per_page).await?;
    Ok(HttpResponse::Ok().json(images))
}

#[instrument(skip(state, data_input))]
pub async fn create_image(
    state: web::Data<AppState>,
    data_input: Result<Either<MultipartForm<ImageUploadForm>, web::Json<CreateImageRequest>>, actix_web::Error>,
) -> Result<HttpResponse, AppError> {
    let either = match data_input {
        Ok(either) => either,
        Err(e) => {
            let status = e.as_response_error().status_code();
            return Ok(HttpResponse::build(status).json(serde_json::json!({
                "error": "Invalid request body",
                "message": "Request must be application/json or multipart/form-data",
                "details": e.to_string()
            })));
        }
    };

    let input = match either {
        Either::Left(form) => read_upload(form.into_inner()).await?,
        Either::Right(json) => CreateImage::from(json.into_inner()),
    };

    let created = state.image_service.create(input).await?;
    Ok(HttpResponse::Created().json(created))
}

async fn read_upload(form: ImageUploadForm) -> Result<CreateImage, AppError> {
    let file = match form.picture {
        Some(temp) => {
            let file_name = temp
                .file_name
                .clone()
                .filter(|name| !name.trim().is_empty())
                .unwrap_or_else(|| "upload".to_string());
            let bytes = tokio::fs::read(temp.file.path())
                .await
                .map_err(ImageError::from)?;
            Some(UploadedFile { file_name, bytes })
        }
        None => None,
    };

    Ok(CreateImage {
        file,
        url: form.url.map(|t| t.into_inner()).filter(|u| !u.trim().is_empty()),
        name: form.name.map(|t| t.into_inner()),
        description: form.description.map(|t| t.into_inner()),
        parent_picture: form.parent_picture.map(|t| t.into_inner()),
    })
}

#[instrument(skip(state))]
pub async fn get_image(
    image_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    let image = state.image_service.get(image_id.into_inner()).await?;
    Ok(HttpResponse::Ok().json(image))
}

#[instrument(skip(state, data))]
pub async fn update_image(
    image_id: web::Path<i64>,
    state: web::Data<AppState>,
    data: web::Json<UpdateImageRequest>,
) -> Result<impl Responder, AppError> {
    let updated = state
        .image_service
        .update(image_id.into_inner(), &data.into_inner())
        .await?;
    Ok(HttpResponse::Ok().json(updated))
}

#[instrument(skip(state))]
pub async fn delete_image(
    image_id: web::Path<i64>,
    state: web::Data<AppState>,
) -> Result<impl Responder, AppError> {
    state.image_service.delete(image_id.into_inner()).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[instrument(skip(state, data))]
pub async fn resize_image(
    image_id: web::Path<i64>,
    state: web::Data<AppState>,
    data: web::Json<ResizeRequest>,
) -> Result<impl Responder, AppError> {
    let ResizeRequest { width, height } = data.into_inner();
    let resized = state
        .image_service
        .resize(image_id.into_inner(), width, height)
        .await?;
    Ok(HttpResponse::Created().json(resized))
}

#[instrument(skip(state, query))]
pub async fn get_picture(
    image_id: web::Path<i64>,
    state: web::Data<AppState>,
    query: web::Query<PictureQuery>,
) -> Result<impl Responder, AppError> {
    let format = query
        .into_inner()
        .format
        .map(|f| f.parse::<ImageFormat>())
        .transpose()?;

    let (bytes, format) = state
        .image_service
        .picture(image_id.into_inner(), format)
        .await?;

    Ok(HttpResponse::Ok()
        .content_type(format.mime_type())
        .body(bytes))
}
