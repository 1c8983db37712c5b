use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    response::Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use crate::{
    auth::{verify_stripe_signature, verify_svix_signature, SvixHeaders},
    errors::{AppError, Result},
    handlers::AppState,
    services::billing::{BillingError, BillingEvent, WebhookOutcome},
};

const HANDLED_BILLING_EVENTS: [&str; 4] = [
    "checkout.session.completed",
    "customer.subscription.created",
    "customer.subscription.updated",
    "customer.subscription.deleted",
];

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|value| value.to_str().ok())
}

pub async fn billing_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<serde_json::Value>> {
    let secret = state
        .config
        .billing
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Webhook("Billing webhook secret is not configured".to_string()))?;

    verify_stripe_signature(&body, header(&headers, "stripe-signature"), secret, Utc::now().timestamp())
        .map_err(|e| {
            tracing::warn!("Billing webhook signature rejected: {}", e);
            AppError::Webhook("Webhook signature verification failed.".to_string())
        })?;

    let event = BillingEvent::parse(&body).map_err(|e| AppError::Webhook(e.to_string()))?;

    let label = if HANDLED_BILLING_EVENTS.iter().any(|handled| *handled == event.event_type) {
        event.event_type.as_str()
    } else {
        "other"
    };
    state.metrics.record_billing_event(label);

    match state.billing.apply_event(&event).await {
        Ok(WebhookOutcome::Applied(_)) => Ok(Json(json!({ "received": true }))),
        Ok(WebhookOutcome::Ignored(reason)) => {
            Ok(Json(json!({ "received": true, "ignored": reason })))
        }
        Err(BillingError::Store(e)) => Err(AppError::Store(e)),
        Err(e) => {
            tracing::error!(event_type = %event.event_type, "Billing webhook rejected: {}", e);
            Err(AppError::Webhook(e.to_string()))
        }
    }
}

#[derive(Debug, Deserialize)]
struct IdentityEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: IdentityEventData,
}

#[derive(Debug, Default, Deserialize)]
struct IdentityEventData {
    id: Option<String>,
}

/// Identity provider lifecycle events. `user.created` provisions the
/// account; other events are acknowledged.
pub async fn auth_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode> {
    let secret = state
        .config
        .auth
        .webhook_secret
        .as_deref()
        .ok_or_else(|| AppError::Webhook("Auth webhook secret is not configured".to_string()))?;

    let svix = SvixHeaders {
        id: header(&headers, "svix-id"),
        timestamp: header(&headers, "svix-timestamp"),
        signature: header(&headers, "svix-signature"),
    };
    verify_svix_signature(&body, svix, secret, Utc::now().timestamp()).map_err(|e| {
        tracing::warn!("Auth webhook signature rejected: {}", e);
        AppError::Webhook("Error verifying webhook".to_string())
    })?;

    let event: IdentityEvent =
        serde_json::from_slice(&body).map_err(|e| AppError::Webhook(e.to_string()))?;
    tracing::info!(event_type = %event.event_type, id = ?event.data.id, "Auth webhook received");

    if event.event_type == "user.created" {
        let user_id = event
            .data
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| AppError::Webhook("user.created event has no user id".to_string()))?;

        let account = state.accounts.create_account(&user_id).await?;
        tracing::info!(user_id = %account.user_id, status = %account.status, "Account provisioned");
    }

    Ok(StatusCode::OK)
}
