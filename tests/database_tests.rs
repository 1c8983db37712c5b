use shelf_catalog_server::{
    database::Database,
    models::{AccountStatus, NewBook},
    storage::{AccountStore, CatalogStore},
};
use std::env;
use uuid::Uuid;

// Tests run concurrently against one database, so every test works on its
// own user ids instead of truncating shared tables.
async fn setup_test_db() -> Option<Database> {
    let Ok(database_url) = env::var("TEST_DATABASE_URL") else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return None;
    };

    let db = Database::new(&database_url).await.expect("Failed to connect to test database");
    db.migrate().await.expect("Failed to run migrations");
    Some(db)
}

fn unique_user() -> String {
    format!("user_{}", Uuid::new_v4().simple())
}

fn book(title: &str) -> NewBook {
    NewBook {
        title: title.to_string(),
        ..Default::default()
    }
}

#[tokio::test]
async fn test_create_account_is_idempotent() {
    let Some(db) = setup_test_db().await else { return };
    let user_id = unique_user();

    assert!(db.find_account(&user_id).await.unwrap().is_none());

    let created = db.create_account(&user_id).await.unwrap();
    assert_eq!(created.status, AccountStatus::Active);
    assert!(created.plan.is_none());

    db.activate_subscription(&user_id, "Scholar", "cus_1").await.unwrap();
    let again = db.create_account(&user_id).await.unwrap();
    assert_eq!(again.plan.as_deref(), Some("Scholar"));
}

#[tokio::test]
async fn test_subscription_lifecycle() {
    let Some(db) = setup_test_db().await else { return };
    let user_id = unique_user();

    let account = db.activate_subscription(&user_id, "Savant", "cus_2").await.unwrap();
    assert_eq!(account.status, AccountStatus::Active);
    assert_eq!(account.billing_customer_id.as_deref(), Some("cus_2"));

    let account = db.set_status(&user_id, AccountStatus::Cancelled).await.unwrap();
    assert_eq!(account.status, AccountStatus::Cancelled);
    assert_eq!(account.plan.as_deref(), Some("Savant"));

    let account = db.deactivate_subscription(&user_id).await.unwrap();
    assert_eq!(account.status, AccountStatus::Inactive);
    assert!(account.plan.is_none());
    assert!(account.billing_customer_id.is_none());

    let stored = db.find_account(&user_id).await.unwrap().unwrap();
    assert_eq!(stored.status, AccountStatus::Inactive);
}

#[tokio::test]
async fn test_insert_and_list_books() {
    let Some(db) = setup_test_db().await else { return };
    let user_id = unique_user();

    let dune = NewBook {
        title: "Dune".to_string(),
        author: Some("Frank Herbert".to_string()),
        isbn13: Some("9780441013593".to_string()),
        ..Default::default()
    };
    let inserted = db
        .insert_books(&user_id, Some("img-1"), &[dune, book("Emma")])
        .await
        .unwrap();
    assert_eq!(inserted, 2);

    tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    db.insert_books(&user_id, Some("img-2"), &[book("Ulysses")]).await.unwrap();

    let books = db.list_books(&user_id).await.unwrap();
    let titles: Vec<&str> = books.iter().map(|b| b.title.as_str()).collect();
    assert_eq!(titles, vec!["Ulysses", "Dune", "Emma"]);
    assert_eq!(books[1].isbn13.as_deref(), Some("9780441013593"));
    assert!(books[1].isbn10.is_none());
    assert_eq!(books[1].image_id.as_deref(), Some("img-1"));
    assert!(books.iter().all(|b| b.user_id == user_id));

    assert!(db.list_books(&unique_user()).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_count_image_groups() {
    let Some(db) = setup_test_db().await else { return };
    let user_id = unique_user();

    db.insert_books(&user_id, Some("img-1"), &[book("A"), book("B")]).await.unwrap();
    db.insert_books(&user_id, Some("img-2"), &[book("C")]).await.unwrap();
    db.insert_books(&user_id, None, &[book("Manual")]).await.unwrap();

    assert_eq!(db.count_image_groups(&user_id).await.unwrap(), 2);
    assert_eq!(db.count_image_groups(&unique_user()).await.unwrap(), 0);
}

#[tokio::test]
async fn test_rejected_batch_writes_nothing() {
    let Some(db) = setup_test_db().await else { return };
    let user_id = unique_user();

    let result = db
        .insert_books(&user_id, Some("img-1"), &[book("Dune"), book("")])
        .await;

    assert!(result.is_err());
    assert!(db.list_books(&user_id).await.unwrap().is_empty());
    assert_eq!(db.count_image_groups(&user_id).await.unwrap(), 0);
}

#[tokio::test]
async fn test_ping() {
    let Some(db) = setup_test_db().await else { return };
    db.ping().await.unwrap();
}
