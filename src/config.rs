use anyhow::{anyhow, Result};
use std::env;
use std::time::Duration;

use crate::services::quota::{PlanAllowance, PlanLimits};

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub port: u16,
    pub public_base_url: String,
    pub max_image_bytes: usize,
    pub allowed_media_types: Vec<String>,
    pub auth: AuthConfig,
    pub vision: VisionConfig,
    pub catalog: CatalogConfig,
    pub enrichment: EnrichmentConfig,
    pub billing: BillingConfig,
    pub plan_limits: PlanLimits,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HS256 shared secret. Ignored when `jwt_public_key` is set.
    pub jwt_secret: Option<String>,
    /// RS256 PEM public key of the identity provider.
    pub jwt_public_key: Option<String>,
    pub jwt_issuer: Option<String>,
    /// svix signing secret (`whsec_...`) for user lifecycle webhooks.
    pub webhook_secret: Option<String>,
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub api_key: String,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct CatalogConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct EnrichmentConfig {
    pub batch_size: usize,
    pub batch_pause: Duration,
}

#[derive(Debug, Clone)]
pub struct BillingConfig {
    pub secret_key: Option<String>,
    pub webhook_secret: Option<String>,
    pub api_url: String,
    pub starter_price_id: Option<String>,
    pub scholar_price_id: Option<String>,
    pub savant_price_id: Option<String>,
}

impl BillingConfig {
    /// Plan tier name for a billing price id.
    pub fn plan_for_price(&self, price_id: &str) -> Option<&'static str> {
        let matches = |candidate: &Option<String>| candidate.as_deref() == Some(price_id);

        if matches(&self.starter_price_id) {
            Some("Starter")
        } else if matches(&self.scholar_price_id) {
            Some("Scholar")
        } else if matches(&self.savant_price_id) {
            Some("Savant")
        } else {
            None
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            batch_size: 5,
            batch_pause: Duration::from_millis(1000),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Config {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "postgresql://localhost/shelf_catalog".to_string()),
            port: env::var("PORT")
                .unwrap_or_else(|_| "3000".to_string())
                .parse()?,
            public_base_url: env::var("PUBLIC_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:3000".to_string()),
            max_image_bytes: env::var("MAX_IMAGE_BYTES")
                .unwrap_or_else(|_| "10485760".to_string()) // 10MiB
                .parse()?,
            allowed_media_types: env::var("ALLOWED_MEDIA_TYPES")
                .unwrap_or_else(|_| "image/png,image/jpeg,image/jpg,image/gif,image/webp".to_string())
                .split(',')
                .map(|s| s.trim().to_ascii_lowercase())
                .filter(|s| !s.is_empty())
                .collect(),
            auth: AuthConfig {
                jwt_secret: env::var("AUTH_JWT_SECRET").ok(),
                jwt_public_key: env::var("AUTH_JWT_PUBLIC_KEY").ok(),
                jwt_issuer: env::var("AUTH_JWT_ISSUER").ok(),
                webhook_secret: env::var("AUTH_WEBHOOK_SECRET").ok(),
            },
            vision: VisionConfig {
                api_key: env::var("OPENAI_API_KEY").unwrap_or_default(),
                base_url: env::var("OPENAI_BASE_URL")
                    .unwrap_or_else(|_| "https://api.openai.com/v1".to_string()),
                model: env::var("VISION_MODEL").unwrap_or_else(|_| "gpt-4o".to_string()),
                timeout: Duration::from_secs(
                    env::var("VISION_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "120".to_string())
                        .parse()?,
                ),
            },
            catalog: CatalogConfig {
                base_url: env::var("GOOGLE_BOOKS_URL")
                    .unwrap_or_else(|_| "https://www.googleapis.com/books/v1/volumes".to_string()),
                api_key: env::var("GOOGLE_BOOKS_API_KEY").ok(),
                timeout: Duration::from_secs(
                    env::var("GOOGLE_BOOKS_TIMEOUT_SECS")
                        .unwrap_or_else(|_| "30".to_string())
                        .parse()?,
                ),
            },
            enrichment: EnrichmentConfig {
                batch_size: env::var("ENRICHMENT_BATCH_SIZE")
                    .unwrap_or_else(|_| "5".to_string())
                    .parse()?,
                batch_pause: Duration::from_millis(
                    env::var("ENRICHMENT_BATCH_PAUSE_MS")
                        .unwrap_or_else(|_| "1000".to_string())
                        .parse()?,
                ),
            },
            billing: BillingConfig {
                secret_key: env::var("STRIPE_SECRET_KEY").ok(),
                webhook_secret: env::var("STRIPE_WEBHOOK_SECRET").ok(),
                api_url: env::var("STRIPE_API_URL")
                    .unwrap_or_else(|_| "https://api.stripe.com/v1".to_string()),
                starter_price_id: env::var("STRIPE_STARTER_PRICE_ID").ok(),
                scholar_price_id: env::var("STRIPE_SCHOLAR_PRICE_ID").ok(),
                savant_price_id: env::var("STRIPE_SAVANT_PRICE_ID").ok(),
            },
            plan_limits: parse_plan_limits(
                &env::var("PLAN_LIMITS")
                    .unwrap_or_else(|_| "free=5,starter=5,scholar=10,savant=unlimited".to_string()),
            )?,
        })
    }
}

/// Parses `tier=count|unlimited` pairs. A `free` entry is required.
pub fn parse_plan_limits(raw: &str) -> Result<PlanLimits> {
    let mut free = None;
    let mut tiers = Vec::new();

    for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (name, value) = pair
            .split_once('=')
            .ok_or_else(|| anyhow!("invalid PLAN_LIMITS entry: {}", pair))?;

        let allowance = match value.trim() {
            "unlimited" | "unbounded" => PlanAllowance::Unbounded,
            n => PlanAllowance::Limited(n.parse()?),
        };

        if name.trim().eq_ignore_ascii_case("free") {
            free = Some(allowance);
        } else {
            tiers.push((name.trim().to_string(), allowance));
        }
    }

    let free = free.ok_or_else(|| anyhow!("PLAN_LIMITS must define a free tier"))?;
    Ok(PlanLimits::new(free, tiers))
}
