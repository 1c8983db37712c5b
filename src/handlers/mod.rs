use crate::{
    auth::JwtService,
    config::Config,
    services::{BillingService, CheckoutClient, IngestionPipeline, MetricsService},
    storage::{AccountStore, CatalogStore},
};
use std::sync::Arc;

pub mod account;
pub mod books;
pub mod health;
pub mod ingest;
pub mod metrics;
pub mod webhooks;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: Arc<dyn AccountStore>,
    pub catalog: Arc<dyn CatalogStore>,
    pub pipeline: Arc<IngestionPipeline>,
    pub billing: Arc<BillingService>,
    /// Absent when no billing secret key is configured.
    pub checkout: Option<Arc<CheckoutClient>>,
    pub jwt: Arc<JwtService>,
    pub metrics: Arc<MetricsService>,
}
