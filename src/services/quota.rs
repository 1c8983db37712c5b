use serde::Serialize;
use std::sync::Arc;

use crate::storage::{AccountStore, CatalogStore, StoreResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanAllowance {
    Limited(u64),
    Unbounded,
}

impl PlanAllowance {
    pub fn permits(&self, used: u64) -> bool {
        match self {
            PlanAllowance::Limited(limit) => used < *limit,
            PlanAllowance::Unbounded => true,
        }
    }

    pub fn limit(&self) -> Option<u64> {
        match self {
            PlanAllowance::Limited(limit) => Some(*limit),
            PlanAllowance::Unbounded => None,
        }
    }
}

/// Upload allowance per plan tier. Tier names match case-insensitively;
/// a missing or unknown tier gets the free allowance.
#[derive(Debug, Clone)]
pub struct PlanLimits {
    free: PlanAllowance,
    tiers: Vec<(String, PlanAllowance)>,
}

impl PlanLimits {
    pub fn new(free: PlanAllowance, tiers: Vec<(String, PlanAllowance)>) -> Self {
        Self { free, tiers }
    }

    pub fn allowance_for(&self, plan: Option<&str>) -> PlanAllowance {
        let Some(plan) = plan else {
            return self.free;
        };

        self.tiers
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(plan))
            .map(|(_, allowance)| *allowance)
            .unwrap_or_else(|| {
                tracing::warn!(plan = %plan, "Unknown plan tier, applying free allowance");
                self.free
            })
    }
}

impl Default for PlanLimits {
    fn default() -> Self {
        Self::new(
            PlanAllowance::Limited(5),
            vec![
                ("Starter".to_string(), PlanAllowance::Limited(5)),
                ("Scholar".to_string(), PlanAllowance::Limited(10)),
                ("Savant".to_string(), PlanAllowance::Unbounded),
            ],
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct QuotaStatus {
    pub used: u64,
    /// `None` when the plan is unbounded.
    pub limit: Option<u64>,
}

impl QuotaStatus {
    pub fn has_capacity(&self) -> bool {
        match self.limit {
            Some(limit) => self.used < limit,
            None => true,
        }
    }
}

/// Derives quota state from the stores on every call. There is no
/// reservation, so concurrent runs for one user may each pass the check.
#[derive(Clone)]
pub struct QuotaPolicy {
    accounts: Arc<dyn AccountStore>,
    catalog: Arc<dyn CatalogStore>,
    limits: PlanLimits,
}

impl QuotaPolicy {
    pub fn new(
        accounts: Arc<dyn AccountStore>,
        catalog: Arc<dyn CatalogStore>,
        limits: PlanLimits,
    ) -> Self {
        Self {
            accounts,
            catalog,
            limits,
        }
    }

    pub async fn allowance(&self, user_id: &str) -> StoreResult<PlanAllowance> {
        let account = self.accounts.find_account(user_id).await?;
        let plan = account.as_ref().and_then(|a| a.plan.as_deref());
        Ok(self.limits.allowance_for(plan))
    }

    pub async fn status(&self, user_id: &str) -> StoreResult<QuotaStatus> {
        let allowance = self.allowance(user_id).await?;
        let used = self.catalog.count_image_groups(user_id).await?;

        Ok(QuotaStatus {
            used,
            limit: allowance.limit(),
        })
    }

    pub async fn has_capacity(&self, user_id: &str) -> StoreResult<bool> {
        Ok(self.status(user_id).await?.has_capacity())
    }
}
