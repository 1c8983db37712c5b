use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json, Response},
};
use serde_json::json;

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::{BookListResponse, CreateBooksRequest, NewBook},
    services::export::{self, CSV_FILENAME},
};

pub async fn list_books(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<BookListResponse>> {
    let books = state.catalog.list_books(&user.user_id).await?;
    Ok(Json(BookListResponse { books }))
}

/// Accepts one book or `{ "books": [...] }`. Each book keeps its own
/// `imageId`.
pub async fn create_books(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CreateBooksRequest>,
) -> Result<(StatusCode, Json<serde_json::Value>)> {
    let books: Vec<NewBook> = match payload {
        CreateBooksRequest::Many { books } => books,
        CreateBooksRequest::One(book) => vec![book],
    }
    .into_iter()
    .map(NewBook::normalized)
    .collect();

    if books.iter().any(|b| b.title.is_empty()) {
        return Err(AppError::Validation("Title is required".to_string()));
    }

    let count = state.catalog.insert_books(&user.user_id, None, &books).await?;
    state.metrics.record_books_created(count);
    tracing::info!(user_id = %user.user_id, count, "Books saved");

    Ok((StatusCode::CREATED, Json(json!({ "count": count }))))
}

pub async fn export_csv(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Response> {
    let books = state.catalog.list_books(&user.user_id).await?;
    let csv = export::to_csv(&books).map_err(|e| AppError::Internal(e.into()))?;

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", CSV_FILENAME),
            ),
        ],
        csv,
    )
        .into_response())
}
