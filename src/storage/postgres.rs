use async_trait::async_trait;
use chrono::Utc;

use crate::{
    database::{
        queries::{AccountQueries, BookQueries},
        Database,
    },
    models::{Account, AccountStatus, Book, NewBook},
    storage::{AccountStore, CatalogStore, StoreResult},
};

#[async_trait]
impl AccountStore for Database {
    async fn find_account(&self, user_id: &str) -> StoreResult<Option<Account>> {
        AccountQueries::find_by_user_id(self.pool(), user_id).await
    }

    async fn create_account(&self, user_id: &str) -> StoreResult<Account> {
        AccountQueries::create_if_absent(self.pool(), user_id).await
    }

    async fn activate_subscription(
        &self,
        user_id: &str,
        plan: &str,
        billing_customer_id: &str,
    ) -> StoreResult<Account> {
        AccountQueries::activate_subscription(self.pool(), user_id, plan, billing_customer_id).await
    }

    async fn set_status(&self, user_id: &str, status: AccountStatus) -> StoreResult<Account> {
        AccountQueries::set_status(self.pool(), user_id, status).await
    }

    async fn deactivate_subscription(&self, user_id: &str) -> StoreResult<Account> {
        AccountQueries::deactivate(self.pool(), user_id).await
    }
}

#[async_trait]
impl CatalogStore for Database {
    async fn insert_books(
        &self,
        user_id: &str,
        image_id: Option<&str>,
        books: &[NewBook],
    ) -> StoreResult<u64> {
        BookQueries::insert_many(self.pool(), user_id, image_id, books, Utc::now()).await
    }

    async fn list_books(&self, user_id: &str) -> StoreResult<Vec<Book>> {
        BookQueries::list_by_owner(self.pool(), user_id).await
    }

    async fn count_image_groups(&self, user_id: &str) -> StoreResult<u64> {
        BookQueries::count_image_groups(self.pool(), user_id).await
    }

    async fn ping(&self) -> StoreResult<()> {
        sqlx::query("SELECT 1").execute(self.pool()).await?;
        Ok(())
    }
}
