pub mod auth;
pub mod config;
pub mod database;
pub mod errors;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod storage;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, Method},
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::{
    auth::JwtService,
    config::Config,
    handlers::{account, books, health, ingest, metrics, webhooks, AppState},
    middleware::metrics_middleware,
    services::{
        BillingService, CatalogSearch, CheckoutClient, Enricher, ImageIntake, IngestionPipeline,
        MetricsService, QuotaPolicy, VisionExtractor,
    },
    storage::{AccountStore, CatalogStore},
};

// Room for base64 expansion and the JSON envelope around the image.
const BODY_OVERHEAD_BYTES: usize = 64 * 1024;

/// Wires stores and external clients into the shared handler state.
pub fn build_state(
    config: Config,
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<dyn CatalogStore>,
    vision: Arc<dyn VisionExtractor>,
    catalog_search: Arc<dyn CatalogSearch>,
) -> anyhow::Result<AppState> {
    let metrics = Arc::new(MetricsService::new()?);
    let jwt = Arc::new(JwtService::from_config(&config.auth)?);

    let quota = QuotaPolicy::new(accounts.clone(), catalog.clone(), config.plan_limits.clone());
    let pipeline = IngestionPipeline::new(
        ImageIntake::new(config.allowed_media_types.clone(), config.max_image_bytes),
        quota,
        vision,
        Enricher::new(catalog_search, &config.enrichment),
        catalog.clone(),
        metrics.clone(),
    );

    let checkout = match CheckoutClient::new(&config.billing) {
        Ok(client) => Some(Arc::new(client)),
        Err(e) => {
            tracing::warn!("Checkout disabled: {}", e);
            None
        }
    };
    let billing = BillingService::new(accounts.clone(), config.billing.clone());

    Ok(AppState {
        config: Arc::new(config),
        accounts,
        catalog,
        pipeline: Arc::new(pipeline),
        billing: Arc::new(billing),
        checkout,
        jwt,
        metrics,
    })
}

pub fn create_app(state: AppState) -> Router {
    let body_limit = state.config.max_image_bytes / 3 * 4 + BODY_OVERHEAD_BYTES;

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Router::new()
        .route("/health", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .route("/metrics", get(metrics::metrics_handler))
        .route("/api/ingest", post(ingest::ingest))
        .route("/api/upload", post(ingest::upload))
        .route("/api/upload/limit", get(account::upload_limit))
        .route("/api/extract", post(ingest::extract))
        .route("/api/books", get(books::list_books).post(books::create_books))
        .route("/api/export", get(books::export_csv))
        .route("/api/account", get(account::get_account))
        .route("/api/checkout_sessions", post(account::create_checkout_session))
        .route("/api/webhooks/billing", post(webhooks::billing_webhook))
        .route("/api/webhooks/auth", post(webhooks::auth_webhook))
        .layer(axum_middleware::from_fn_with_state(state.clone(), metrics_middleware))
        .layer(DefaultBodyLimit::max(body_limit))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
