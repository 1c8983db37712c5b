use axum::{extract::State, response::Json};
use serde::{Deserialize, Serialize};

use crate::{
    errors::{AppError, Result},
    handlers::AppState,
    middleware::auth::AuthenticatedUser,
    models::{Account, AccountResponse},
};

#[derive(Debug, Serialize)]
pub struct UploadLimitResponse {
    pub count: u64,
    /// `null` for unbounded plans.
    pub limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutRequest {
    pub price_id: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub url: String,
}

/// Accounts are created by the identity webhook; until it arrives the
/// caller is reported with the defaults.
pub async fn get_account(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<AccountResponse>> {
    let account = state
        .accounts
        .find_account(&user.user_id)
        .await?
        .unwrap_or_else(|| Account::new(&user.user_id));

    Ok(Json(account.into()))
}

pub async fn upload_limit(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<UploadLimitResponse>> {
    let status = state.pipeline.quota().status(&user.user_id).await?;

    Ok(Json(UploadLimitResponse {
        count: status.used,
        limit: status.limit,
    }))
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    Json(payload): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let price_id = payload
        .price_id
        .filter(|p| !p.trim().is_empty())
        .ok_or_else(|| AppError::Validation("Price ID is required".to_string()))?;

    let checkout = state
        .checkout
        .as_ref()
        .ok_or_else(|| AppError::Upstream("Billing is not configured".to_string()))?;

    let url = checkout
        .create_session(&user.user_id, &price_id, &state.config.public_base_url)
        .await
        .map_err(|e| AppError::Upstream(e.to_string()))?;

    tracing::info!(user_id = %user.user_id, price_id = %price_id, "Checkout session created");
    Ok(Json(CheckoutResponse { url }))
}
