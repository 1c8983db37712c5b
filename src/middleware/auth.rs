use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts},
    response::{IntoResponse, Response},
};

use crate::{errors::AppError, handlers::AppState};

/// Caller identity from a verified `Authorization: Bearer` session token.
/// The identity provider's user id is trusted as-is.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub user_id: String,
}

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = Response;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> std::result::Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(header::AUTHORIZATION)
            .and_then(|header| header.to_str().ok())
            .and_then(|header| header.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| AppError::Auth("Unauthorized".to_string()).into_response())?;

        match state.jwt.verify_token(token) {
            Ok(claims) => Ok(AuthenticatedUser { user_id: claims.sub }),
            Err(e) => {
                tracing::debug!("Rejected session token: {}", e);
                Err(AppError::Auth("Invalid or expired token".to_string()).into_response())
            }
        }
    }
}
