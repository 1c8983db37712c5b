pub mod billing;
pub mod catalog_search;
pub mod enrichment;
pub mod export;
pub mod image_intake;
pub mod metrics;
pub mod pipeline;
pub mod quota;
pub mod vision;

pub use billing::{BillingService, CheckoutClient};
pub use catalog_search::{CatalogSearch, GoogleBooksClient};
pub use enrichment::{Enricher, EnrichmentOutcome};
pub use image_intake::ImageIntake;
pub use metrics::MetricsService;
pub use pipeline::{IngestOutcome, IngestionPipeline};
pub use quota::{PlanLimits, QuotaPolicy, QuotaStatus};
pub use vision::{OpenAiVisionClient, VisionExtractor};
