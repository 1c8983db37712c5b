use chrono::{DateTime, Utc};
use sqlx::{PgExecutor, PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::errors::StoreError;
use crate::models::{Account, AccountStatus, Book, NewBook};

type Result<T> = std::result::Result<T, StoreError>;

const ACCOUNT_COLUMNS: &str =
    "user_id, status, plan, billing_customer_id, created_at, updated_at";

// Postgres caps bind parameters at 65535 per statement.
const INSERT_CHUNK: usize = 1000;

pub struct AccountQueries;

impl AccountQueries {
    pub async fn find_by_user_id(pool: &PgPool, user_id: &str) -> Result<Option<Account>> {
        let account = sqlx::query_as::<_, Account>(&format!(
            "SELECT {} FROM accounts WHERE user_id = $1",
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

        Ok(account)
    }

    /// Inserts a default account unless one exists, returning the stored row.
    pub async fn create_if_absent<'e, E>(executor: E, user_id: &str) -> Result<Account>
    where
        E: PgExecutor<'e>,
    {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (user_id)
            VALUES ($1)
            ON CONFLICT (user_id) DO UPDATE SET user_id = EXCLUDED.user_id
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(executor)
        .await?;

        Ok(account)
    }

    pub async fn activate_subscription(
        pool: &PgPool,
        user_id: &str,
        plan: &str,
        billing_customer_id: &str,
    ) -> Result<Account> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (user_id, status, plan, billing_customer_id)
            VALUES ($1, 'ACTIVE', $2, $3)
            ON CONFLICT (user_id) DO UPDATE SET
                status = 'ACTIVE',
                plan = EXCLUDED.plan,
                billing_customer_id = EXCLUDED.billing_customer_id,
                updated_at = NOW()
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .bind(plan)
        .bind(billing_customer_id)
        .fetch_one(pool)
        .await?;

        Ok(account)
    }

    pub async fn set_status(
        pool: &PgPool,
        user_id: &str,
        status: AccountStatus,
    ) -> Result<Account> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (user_id, status)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET
                status = EXCLUDED.status,
                plan = CASE WHEN EXCLUDED.status = 'INACTIVE' THEN NULL ELSE accounts.plan END,
                billing_customer_id = CASE
                    WHEN EXCLUDED.status = 'INACTIVE' THEN NULL
                    ELSE accounts.billing_customer_id
                END,
                updated_at = NOW()
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .bind(status.as_str())
        .fetch_one(pool)
        .await?;

        Ok(account)
    }

    pub async fn deactivate(pool: &PgPool, user_id: &str) -> Result<Account> {
        let account = sqlx::query_as::<_, Account>(&format!(
            r#"
            INSERT INTO accounts (user_id, status)
            VALUES ($1, 'INACTIVE')
            ON CONFLICT (user_id) DO UPDATE SET
                status = 'INACTIVE',
                plan = NULL,
                billing_customer_id = NULL,
                updated_at = NOW()
            RETURNING {}
            "#,
            ACCOUNT_COLUMNS
        ))
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(account)
    }
}

pub struct BookQueries;

impl BookQueries {
    /// Inserts all rows in one transaction; either every book lands or none.
    pub async fn insert_many(
        pool: &PgPool,
        user_id: &str,
        image_id: Option<&str>,
        books: &[NewBook],
        added_at: DateTime<Utc>,
    ) -> Result<u64> {
        if books.is_empty() {
            return Ok(0);
        }

        let mut tx = pool.begin().await?;
        AccountQueries::create_if_absent(&mut *tx, user_id).await?;

        let mut inserted = 0u64;
        for chunk in books.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> = QueryBuilder::new(
                "INSERT INTO books (id, title, author, isbn10, isbn13, image_id, user_id, added_at) ",
            );

            builder.push_values(chunk, |mut row, book| {
                row.push_bind(Uuid::new_v4())
                    .push_bind(book.title.clone())
                    .push_bind(book.author.clone())
                    .push_bind(book.isbn10.clone())
                    .push_bind(book.isbn13.clone())
                    .push_bind(book.image_id.clone().or_else(|| image_id.map(str::to_string)))
                    .push_bind(user_id.to_string())
                    .push_bind(added_at);
            });

            inserted += builder.build().execute(&mut *tx).await?.rows_affected();
        }

        tx.commit().await?;
        Ok(inserted)
    }

    pub async fn list_by_owner(pool: &PgPool, user_id: &str) -> Result<Vec<Book>> {
        let books = sqlx::query_as::<_, Book>(
            r#"
            SELECT id, title, author, isbn10, isbn13, image_id, user_id, added_at
            FROM books
            WHERE user_id = $1
            ORDER BY added_at DESC, seq ASC
            "#,
        )
        .bind(user_id)
        .fetch_all(pool)
        .await?;

        Ok(books)
    }

    pub async fn count_image_groups(pool: &PgPool, user_id: &str) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(DISTINCT image_id) FROM books WHERE user_id = $1 AND image_id IS NOT NULL",
        )
        .bind(user_id)
        .fetch_one(pool)
        .await?;

        Ok(count.max(0) as u64)
    }
}
