use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AccountStatus {
    Active,
    Cancelled,
    Inactive,
}

impl AccountStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ACTIVE",
            AccountStatus::Cancelled => "CANCELLED",
            AccountStatus::Inactive => "INACTIVE",
        }
    }
}

impl fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown account status: {0}")]
pub struct UnknownStatus(String);

impl FromStr for AccountStatus {
    type Err = UnknownStatus;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(AccountStatus::Active),
            "CANCELLED" => Ok(AccountStatus::Cancelled),
            "INACTIVE" => Ok(AccountStatus::Inactive),
            other => Err(UnknownStatus(other.to_string())),
        }
    }
}

impl TryFrom<String> for AccountStatus {
    type Error = UnknownStatus;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Account {
    pub user_id: String,
    #[sqlx(try_from = "String")]
    pub status: AccountStatus,
    pub plan: Option<String>,
    pub billing_customer_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// A first-seen account: active, but without a subscription yet.
    pub fn new(user_id: &str) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.to_string(),
            status: AccountStatus::Active,
            plan: None,
            billing_customer_id: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_subscribed(&self) -> bool {
        self.status != AccountStatus::Inactive
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AccountResponse {
    pub user_id: String,
    pub status: AccountStatus,
    pub plan: Option<String>,
    pub subscribed: bool,
}

impl From<Account> for AccountResponse {
    fn from(account: Account) -> Self {
        Self {
            subscribed: account.is_subscribed(),
            user_id: account.user_id,
            status: account.status,
            plan: account.plan,
        }
    }
}
