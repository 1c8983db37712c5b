//! Billing provider integration: subscription webhooks drive account
//! status, and checkout sessions are created on behalf of a user.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

use crate::config::BillingConfig;
use crate::errors::StoreError;
use crate::models::{Account, AccountStatus};
use crate::storage::AccountStore;

#[derive(Debug, Error)]
pub enum BillingError {
    #[error("Invalid event payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    MissingField(&'static str),

    #[error("Unrecognized price id: {0}")]
    UnknownPrice(String),

    #[error("Billing is not configured")]
    NotConfigured,

    #[error("Billing API error {0}: {1}")]
    Api(u16, String),

    #[error("Network error: {0}")]
    Network(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

#[derive(Debug, Deserialize)]
pub struct BillingEvent {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub event_type: String,
    pub data: EventData,
}

#[derive(Debug, Deserialize)]
pub struct EventData {
    pub object: Value,
}

#[derive(Debug, Default, Deserialize)]
pub struct Subscription {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub customer: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub cancel_at_period_end: bool,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
    #[serde(default)]
    pub items: SubscriptionItems,
}

#[derive(Debug, Default, Deserialize)]
pub struct SubscriptionItems {
    #[serde(default)]
    pub data: Vec<SubscriptionItem>,
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionItem {
    #[serde(default)]
    pub price: Option<Price>,
}

#[derive(Debug, Deserialize)]
pub struct Price {
    pub id: String,
}

impl Subscription {
    pub fn user_id(&self) -> Option<&str> {
        self.metadata
            .get("userId")
            .map(String::as_str)
            .filter(|id| !id.is_empty())
    }

    pub fn first_price_id(&self) -> Option<&str> {
        self.items
            .data
            .first()
            .and_then(|item| item.price.as_ref())
            .map(|price| price.id.as_str())
    }
}

impl BillingEvent {
    pub fn parse(payload: &[u8]) -> Result<Self, BillingError> {
        serde_json::from_slice(payload).map_err(|e| BillingError::InvalidPayload(e.to_string()))
    }

    fn subscription(&self) -> Result<Subscription, BillingError> {
        Subscription::deserialize(&self.data.object)
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))
    }
}

/// What applying an event did.
#[derive(Debug)]
pub enum WebhookOutcome {
    Applied(Account),
    /// Acknowledged without changes.
    Ignored(String),
}

#[derive(Clone)]
pub struct BillingService {
    accounts: Arc<dyn AccountStore>,
    config: BillingConfig,
}

impl BillingService {
    pub fn new(accounts: Arc<dyn AccountStore>, config: BillingConfig) -> Self {
        Self { accounts, config }
    }

    pub async fn apply_event(&self, event: &BillingEvent) -> Result<WebhookOutcome, BillingError> {
        tracing::info!(event_id = ?event.id, event_type = %event.event_type, "Billing event received");

        match event.event_type.as_str() {
            "customer.subscription.created" => self.subscription_created(event.subscription()?).await,
            "customer.subscription.updated" => self.subscription_updated(event.subscription()?).await,
            "customer.subscription.deleted" => self.subscription_deleted(event.subscription()?).await,
            "checkout.session.completed" => {
                let mode = event.data.object.get("mode").and_then(Value::as_str).unwrap_or("");
                tracing::info!(mode = %mode, "Checkout completed; subscription events carry the account change");
                Ok(WebhookOutcome::Ignored("checkout.session.completed".to_string()))
            }
            other => {
                tracing::info!(event_type = %other, "Unhandled billing event type");
                Ok(WebhookOutcome::Ignored(other.to_string()))
            }
        }
    }

    async fn subscription_created(&self, subscription: Subscription) -> Result<WebhookOutcome, BillingError> {
        let user_id = subscription
            .user_id()
            .ok_or(BillingError::MissingField("Missing userId or customerId in subscription metadata"))?;
        let customer = subscription
            .customer
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or(BillingError::MissingField("Missing userId or customerId in subscription metadata"))?;
        let price_id = subscription
            .first_price_id()
            .ok_or(BillingError::MissingField("Price ID missing from subscription items"))?;

        let plan = self
            .config
            .plan_for_price(price_id)
            .ok_or_else(|| BillingError::UnknownPrice(price_id.to_string()))?;

        let account = self
            .accounts
            .activate_subscription(user_id, plan, customer)
            .await?;
        tracing::info!(user_id = %user_id, plan = %plan, "Subscription activated");
        Ok(WebhookOutcome::Applied(account))
    }

    async fn subscription_updated(&self, subscription: Subscription) -> Result<WebhookOutcome, BillingError> {
        let Some(user_id) = subscription.user_id() else {
            tracing::error!("userId missing from customer.subscription.updated event");
            return Ok(WebhookOutcome::Ignored("Missing userId in subscription metadata".to_string()));
        };

        let status = if subscription.cancel_at_period_end {
            AccountStatus::Cancelled
        } else {
            AccountStatus::Active
        };

        let account = self.accounts.set_status(user_id, status).await?;
        tracing::info!(
            user_id = %user_id,
            provider_status = ?subscription.status,
            status = %status,
            "Subscription updated"
        );
        Ok(WebhookOutcome::Applied(account))
    }

    async fn subscription_deleted(&self, subscription: Subscription) -> Result<WebhookOutcome, BillingError> {
        let Some(user_id) = subscription.user_id() else {
            tracing::error!("userId missing from customer.subscription.deleted event");
            return Ok(WebhookOutcome::Ignored("Missing userId in subscription metadata".to_string()));
        };

        let account = self.accounts.deactivate_subscription(user_id).await?;
        tracing::info!(user_id = %user_id, "Subscription deleted");
        Ok(WebhookOutcome::Applied(account))
    }
}

#[derive(Debug, Deserialize)]
struct CheckoutSession {
    url: Option<String>,
}

/// Creates hosted checkout sessions through the billing provider's REST API.
pub struct CheckoutClient {
    http_client: reqwest::Client,
    api_url: String,
    secret_key: String,
}

impl CheckoutClient {
    pub fn new(config: &BillingConfig) -> Result<Self, BillingError> {
        let secret_key = config.secret_key.clone().ok_or(BillingError::NotConfigured)?;

        Ok(Self {
            http_client: reqwest::Client::new(),
            api_url: config.api_url.trim_end_matches('/').to_string(),
            secret_key,
        })
    }

    /// Subscription checkout for one price. The user id rides along in the
    /// subscription metadata so the webhooks can find the account.
    pub async fn create_session(
        &self,
        user_id: &str,
        price_id: &str,
        public_base_url: &str,
    ) -> Result<String, BillingError> {
        let base = public_base_url.trim_end_matches('/');
        let form = [
            ("mode", "subscription".to_string()),
            ("line_items[0][price]", price_id.to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            ("success_url", format!("{}/upload", base)),
            ("cancel_url", format!("{}/packages", base)),
            ("subscription_data[metadata][userId]", user_id.to_string()),
        ];

        let response = self
            .http_client
            .post(format!("{}/checkout/sessions", self.api_url))
            .basic_auth(&self.secret_key, Some(""))
            .form(&form)
            .send()
            .await
            .map_err(|e| BillingError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| BillingError::Network(e.to_string()))?;
            return Err(BillingError::Api(status.as_u16(), error_text));
        }

        let session: CheckoutSession = response
            .json()
            .await
            .map_err(|e| BillingError::InvalidPayload(e.to_string()))?;

        session
            .url
            .ok_or_else(|| BillingError::InvalidPayload("checkout session has no url".to_string()))
    }
}
