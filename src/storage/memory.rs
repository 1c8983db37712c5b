use async_trait::async_trait;
use chrono::Utc;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use uuid::Uuid;

use crate::{
    errors::StoreError,
    models::{Account, AccountStatus, Book, NewBook},
    storage::{AccountStore, CatalogStore, StoreResult},
};

#[derive(Default)]
struct State {
    accounts: HashMap<String, Account>,
    // (insertion sequence, book)
    books: Vec<(u64, Book)>,
    next_seq: u64,
}

/// Process-local store backing both traits. Used by tests and local runs
/// without a database.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// When set, every operation fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn book_count(&self) -> usize {
        self.state.lock().map(|s| s.books.len()).unwrap_or(0)
    }

    fn lock(&self) -> StoreResult<MutexGuard<'_, State>> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store offline".to_string()));
        }
        self.state
            .lock()
            .map_err(|_| StoreError::Unavailable("memory store lock poisoned".to_string()))
    }
}

impl State {
    fn account_mut(&mut self, user_id: &str) -> &mut Account {
        self.accounts
            .entry(user_id.to_string())
            .or_insert_with(|| Account::new(user_id))
    }
}

#[async_trait]
impl AccountStore for MemoryStore {
    async fn find_account(&self, user_id: &str) -> StoreResult<Option<Account>> {
        Ok(self.lock()?.accounts.get(user_id).cloned())
    }

    async fn create_account(&self, user_id: &str) -> StoreResult<Account> {
        Ok(self.lock()?.account_mut(user_id).clone())
    }

    async fn activate_subscription(
        &self,
        user_id: &str,
        plan: &str,
        billing_customer_id: &str,
    ) -> StoreResult<Account> {
        let mut state = self.lock()?;
        let account = state.account_mut(user_id);
        account.status = AccountStatus::Active;
        account.plan = Some(plan.to_string());
        account.billing_customer_id = Some(billing_customer_id.to_string());
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn set_status(&self, user_id: &str, status: AccountStatus) -> StoreResult<Account> {
        let mut state = self.lock()?;
        let account = state.account_mut(user_id);
        account.status = status;
        if status == AccountStatus::Inactive {
            account.plan = None;
            account.billing_customer_id = None;
        }
        account.updated_at = Utc::now();
        Ok(account.clone())
    }

    async fn deactivate_subscription(&self, user_id: &str) -> StoreResult<Account> {
        self.set_status(user_id, AccountStatus::Inactive).await
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn insert_books(
        &self,
        user_id: &str,
        image_id: Option<&str>,
        books: &[NewBook],
    ) -> StoreResult<u64> {
        if books.is_empty() {
            return Ok(0);
        }

        let mut state = self.lock()?;
        if books.iter().any(|b| b.title.trim().is_empty()) {
            return Err(StoreError::Corrupt("book title must not be empty".to_string()));
        }

        state.account_mut(user_id);
        let added_at = Utc::now();

        for book in books {
            let seq = state.next_seq;
            state.next_seq += 1;
            state.books.push((
                seq,
                Book {
                    id: Uuid::new_v4(),
                    title: book.title.clone(),
                    author: book.author.clone(),
                    isbn10: book.isbn10.clone(),
                    isbn13: book.isbn13.clone(),
                    image_id: book.image_id.clone().or_else(|| image_id.map(str::to_string)),
                    user_id: user_id.to_string(),
                    added_at,
                },
            ));
        }

        Ok(books.len() as u64)
    }

    async fn list_books(&self, user_id: &str) -> StoreResult<Vec<Book>> {
        let state = self.lock()?;
        let mut owned: Vec<&(u64, Book)> =
            state.books.iter().filter(|(_, b)| b.user_id == user_id).collect();

        owned.sort_by(|(seq_a, a), (seq_b, b)| {
            b.added_at.cmp(&a.added_at).then(seq_a.cmp(seq_b))
        });

        Ok(owned.into_iter().map(|(_, b)| b.clone()).collect())
    }

    async fn count_image_groups(&self, user_id: &str) -> StoreResult<u64> {
        let state = self.lock()?;
        let groups: HashSet<&str> = state
            .books
            .iter()
            .filter(|(_, b)| b.user_id == user_id)
            .filter_map(|(_, b)| b.image_id.as_deref())
            .collect();

        Ok(groups.len() as u64)
    }

    async fn ping(&self) -> StoreResult<()> {
        self.lock().map(|_| ())
    }
}
