use axum::{extract::State, http::StatusCode, response::Json};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::NewBook,
};

#[derive(Debug, Deserialize)]
pub struct ImageRequest {
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractRequest {
    pub image_data: Option<String>,
    pub image_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IngestResponse {
    pub image_id: String,
    pub created_count: u64,
    pub books: Vec<NewBook>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    pub image_id: String,
    pub image_data: String,
}

#[derive(Debug, Serialize)]
pub struct ExtractResponse {
    pub books: Vec<NewBook>,
}

fn required_image(image: Option<String>) -> Result<String> {
    image
        .filter(|i| !i.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Image data is required".to_string()))
}

/// Validates, extracts, enriches and saves books from one shelf photo.
pub async fn ingest(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ImageRequest>,
) -> Result<(StatusCode, Json<IngestResponse>)> {
    let image = required_image(payload.image)?;

    let outcome = state.pipeline.ingest(&user.user_id, &image).await?;

    Ok((
        StatusCode::CREATED,
        Json(IngestResponse {
            image_id: outcome.image_id.to_string(),
            created_count: outcome.created_count,
            books: outcome.books,
        }),
    ))
}

pub async fn upload(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<ImageRequest>,
) -> Result<Json<UploadResponse>> {
    let image = required_image(payload.image)?;

    let validated = state.pipeline.validate_upload(&user.user_id, &image).await?;
    tracing::info!(user_id = %user.user_id, image_id = %validated.image_id, "Upload accepted");

    Ok(Json(UploadResponse {
        image_id: validated.image_id.to_string(),
        image_data: validated.data_url,
    }))
}

pub async fn extract(
    State(state): State<AppState>,
    _user: AuthenticatedUser,
    Json(payload): Json<ExtractRequest>,
) -> Result<Json<ExtractResponse>> {
    let image = required_image(payload.image_data)?;

    let books = state
        .pipeline
        .preview(&image, payload.image_id.as_deref())
        .await?;

    Ok(Json(ExtractResponse { books }))
}
