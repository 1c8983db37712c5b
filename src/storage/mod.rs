use async_trait::async_trait;

use crate::errors::StoreError;
use crate::models::{Account, AccountStatus, Book, NewBook};

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Subscription state per user. Written by the webhook handlers only.
#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn find_account(&self, user_id: &str) -> StoreResult<Option<Account>>;

    /// Creates a default account, or returns the existing one unchanged.
    async fn create_account(&self, user_id: &str) -> StoreResult<Account>;

    async fn activate_subscription(
        &self,
        user_id: &str,
        plan: &str,
        billing_customer_id: &str,
    ) -> StoreResult<Account>;

    async fn set_status(&self, user_id: &str, status: AccountStatus) -> StoreResult<Account>;

    /// Marks the account INACTIVE and clears plan and billing reference.
    async fn deactivate_subscription(&self, user_id: &str) -> StoreResult<Account>;
}

/// Per-user book collection.
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// Appends books for `user_id`. Books without their own image group are
    /// tagged with `image_id`. All-or-nothing.
    async fn insert_books(
        &self,
        user_id: &str,
        image_id: Option<&str>,
        books: &[NewBook],
    ) -> StoreResult<u64>;

    /// Newest upload first, extraction order within an upload.
    async fn list_books(&self, user_id: &str) -> StoreResult<Vec<Book>>;

    /// Distinct non-null image groups among the user's books.
    async fn count_image_groups(&self, user_id: &str) -> StoreResult<u64>;

    async fn ping(&self) -> StoreResult<()>;
}
