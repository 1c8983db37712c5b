use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Terminal failures of one ingestion run.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IngestError {
    #[error("Invalid image format: {0}")]
    InvalidFormat(String),

    #[error("Image payload of {size} bytes exceeds the {limit} byte limit")]
    PayloadTooLarge { size: usize, limit: usize },

    #[error("Upload quota exceeded ({used}/{limit})")]
    QuotaExceeded { used: u64, limit: u64 },

    #[error("Book extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Persisting books failed: {0}")]
    PersistFailed(String),
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::InvalidFormat(_) => StatusCode::BAD_REQUEST,
            IngestError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            IngestError::QuotaExceeded { .. } => StatusCode::PAYMENT_REQUIRED,
            IngestError::ExtractionFailed(_) => StatusCode::BAD_GATEWAY,
            IngestError::PersistFailed(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn user_message(&self) -> String {
        let message = match self {
            IngestError::InvalidFormat(_) => {
                "Invalid image format. Must be a base64-encoded png, jpeg, gif or webp image."
            }
            IngestError::PayloadTooLarge { limit, .. } => {
                return format!("Image size exceeds the {} limit.", display_size(*limit));
            }
            IngestError::QuotaExceeded { .. } => {
                "You've reached your upload limit. Upgrade your plan to upload more photos."
            }
            IngestError::ExtractionFailed(_) => {
                "We couldn't read books from this image right now. Please try again."
            }
            IngestError::PersistFailed(_) => "We couldn't save your books. Please try again.",
        };
        message.to_string()
    }

    /// Short label used for metrics and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            IngestError::InvalidFormat(_) => "invalid_format",
            IngestError::PayloadTooLarge { .. } => "payload_too_large",
            IngestError::QuotaExceeded { .. } => "quota_exceeded",
            IngestError::ExtractionFailed(_) => "extraction_failed",
            IngestError::PersistFailed(_) => "persist_failed",
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Invalid stored value: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Webhook rejected: {0}")]
    Webhook(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AppError::Store(ref e) => {
                tracing::error!("Store error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Database error".to_string())
            }
            AppError::Ingest(ref e) => (e.status_code(), e.user_message()),
            AppError::Auth(ref msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Validation(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Webhook(ref msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Upstream(ref msg) => {
                tracing::error!("Upstream error: {}", msg);
                (StatusCode::BAD_GATEWAY, "Upstream service error".to_string())
            }
            AppError::Internal(ref e) => {
                tracing::error!("Internal error: {}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error".to_string())
            }
        };

        let body = Json(json!({
            "error": error_message,
            "status": status.as_u16()
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;

/// `10485760` -> `10MB`; sizes that are not whole MiB or KiB stay in bytes.
fn display_size(bytes: usize) -> String {
    const KIB: usize = 1024;
    const MIB: usize = 1024 * KIB;

    match bytes {
        b if b >= MIB && b % MIB == 0 => format!("{}MB", b / MIB),
        b if b >= KIB && b % KIB == 0 => format!("{}KB", b / KIB),
        b => format!("{} byte", b),
    }
}
