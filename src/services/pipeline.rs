//! Upload-to-catalog ingestion.
//!
//! One run per upload, strictly sequential:
//! `Received -> Validated -> QuotaChecked -> Extracted -> Enriched -> Persisted`.
//! Any stage can fail the run with an [`IngestError`]; nothing is retried and
//! no state carries over between runs.

use std::fmt;
use std::sync::Arc;
use uuid::Uuid;

use crate::errors::IngestError;
use crate::models::NewBook;
use crate::services::enrichment::Enricher;
use crate::services::image_intake::{ImageIntake, ValidatedImage};
use crate::services::metrics::MetricsService;
use crate::services::quota::QuotaPolicy;
use crate::services::vision::{ExtractedBook, VisionExtractor};
use crate::storage::CatalogStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestStage {
    Received,
    Validated,
    QuotaChecked,
    Extracted,
    Enriched,
    Persisted,
}

impl IngestStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Received => "received",
            IngestStage::Validated => "validated",
            IngestStage::QuotaChecked => "quota_checked",
            IngestStage::Extracted => "extracted",
            IngestStage::Enriched => "enriched",
            IngestStage::Persisted => "persisted",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestOutcome {
    pub image_id: Uuid,
    pub created_count: u64,
    pub books: Vec<NewBook>,
}

/// Stage tracking for one run.
struct IngestRun<'a> {
    user_id: &'a str,
    stage: IngestStage,
}

impl<'a> IngestRun<'a> {
    fn new(user_id: &'a str) -> Self {
        Self {
            user_id,
            stage: IngestStage::Received,
        }
    }

    fn advance(&mut self, next: IngestStage) {
        tracing::debug!(user_id = %self.user_id, from = %self.stage, to = %next, "Ingestion advanced");
        self.stage = next;
    }

    fn fail(&self, error: IngestError) -> IngestError {
        tracing::warn!(
            user_id = %self.user_id,
            stage = %self.stage,
            kind = error.kind(),
            "Ingestion failed: {}",
            error
        );
        error
    }
}

#[derive(Clone)]
pub struct IngestionPipeline {
    intake: ImageIntake,
    quota: QuotaPolicy,
    vision: Arc<dyn VisionExtractor>,
    enricher: Enricher,
    catalog: Arc<dyn CatalogStore>,
    metrics: Arc<MetricsService>,
}

impl IngestionPipeline {
    pub fn new(
        intake: ImageIntake,
        quota: QuotaPolicy,
        vision: Arc<dyn VisionExtractor>,
        enricher: Enricher,
        catalog: Arc<dyn CatalogStore>,
        metrics: Arc<MetricsService>,
    ) -> Self {
        Self {
            intake,
            quota,
            vision,
            enricher,
            catalog,
            metrics,
        }
    }

    pub fn quota(&self) -> &QuotaPolicy {
        &self.quota
    }

    /// Runs the full pipeline for one upload and persists the result.
    pub async fn ingest(&self, user_id: &str, data_url: &str) -> Result<IngestOutcome, IngestError> {
        let result = self.run(user_id, data_url).await;

        match &result {
            Ok(outcome) => {
                self.metrics.record_ingestion("created");
                self.metrics.record_books_created(outcome.created_count);
            }
            Err(e) => self.metrics.record_ingestion(e.kind()),
        }
        result
    }

    async fn run(&self, user_id: &str, data_url: &str) -> Result<IngestOutcome, IngestError> {
        let mut run = IngestRun::new(user_id);

        let image = self.intake.validate(data_url).map_err(|e| run.fail(e))?;
        tracing::debug!(
            image_id = %image.image_id,
            media_type = %image.media_type,
            bytes = image.bytes.len(),
            "Image accepted"
        );
        run.advance(IngestStage::Validated);

        self.check_quota(user_id).await.map_err(|e| run.fail(e))?;
        run.advance(IngestStage::QuotaChecked);

        let extracted = self.extract(&image).await.map_err(|e| run.fail(e))?;
        run.advance(IngestStage::Extracted);

        if extracted.is_empty() {
            tracing::info!(user_id = %user_id, image_id = %image.image_id, "No books detected");
            return Ok(IngestOutcome {
                image_id: image.image_id,
                created_count: 0,
                books: Vec::new(),
            });
        }

        let image_id = image.image_id.to_string();
        let books = self.enrich(&extracted, &image_id).await;
        run.advance(IngestStage::Enriched);

        let created_count = self
            .catalog
            .insert_books(user_id, Some(&image_id), &books)
            .await
            .map_err(|e| run.fail(IngestError::PersistFailed(e.to_string())))?;
        run.advance(IngestStage::Persisted);

        tracing::info!(
            user_id = %user_id,
            image_id = %image_id,
            created_count,
            "Books added to catalog"
        );

        Ok(IngestOutcome {
            image_id: image.image_id,
            created_count,
            books,
        })
    }

    /// Intake and quota only. Nothing is extracted or written.
    pub async fn validate_upload(
        &self,
        user_id: &str,
        data_url: &str,
    ) -> Result<ValidatedImage, IngestError> {
        let image = self.intake.validate(data_url)?;
        self.check_quota(user_id).await?;
        Ok(image)
    }

    /// Extraction and enrichment without persisting. Books are tagged with
    /// `image_id` when given, else with a fresh id, and count against the
    /// quota only once saved.
    pub async fn preview(
        &self,
        data_url: &str,
        image_id: Option<&str>,
    ) -> Result<Vec<NewBook>, IngestError> {
        let image = self.intake.validate(data_url)?;
        let extracted = self.extract(&image).await?;
        let fresh_id = image.image_id.to_string();
        Ok(self.enrich(&extracted, image_id.unwrap_or(&fresh_id)).await)
    }

    async fn check_quota(&self, user_id: &str) -> Result<(), IngestError> {
        let status = self
            .quota
            .status(user_id)
            .await
            .map_err(|e| IngestError::PersistFailed(format!("quota lookup failed: {}", e)))?;

        match status.limit {
            Some(limit) if !status.has_capacity() => Err(IngestError::QuotaExceeded {
                used: status.used,
                limit,
            }),
            _ => Ok(()),
        }
    }

    async fn extract(&self, image: &ValidatedImage) -> Result<Vec<ExtractedBook>, IngestError> {
        self.vision
            .extract(&image.data_url)
            .await
            .map_err(|e| IngestError::ExtractionFailed(e.to_string()))
    }

    async fn enrich(&self, extracted: &[ExtractedBook], image_id: &str) -> Vec<NewBook> {
        let outcomes = self.enricher.enrich(extracted).await;

        let matched = outcomes.iter().filter(|o| o.is_matched()).count();
        self.metrics
            .record_enrichment(matched, outcomes.len() - matched);

        outcomes
            .into_iter()
            .map(|outcome| outcome.into_new_book(Some(image_id)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EnrichmentConfig;
    use crate::errors::StoreError;
    use crate::models::Book;
    use crate::services::catalog_search::{CatalogMatch, CatalogSearch, CatalogSearchError};
    use crate::services::quota::PlanLimits;
    use crate::services::vision::{MockVisionExtractor, VisionError};
    use crate::storage::{MemoryStore, StoreResult};
    use async_trait::async_trait;
    use base64::{engine::general_purpose, Engine as _};
    use std::time::Duration;

    struct DuneCatalog;

    #[async_trait]
    impl CatalogSearch for DuneCatalog {
        async fn search(
            &self,
            title: &str,
            _author: Option<&str>,
        ) -> Result<Option<CatalogMatch>, CatalogSearchError> {
            match title {
                "Dune" => Ok(Some(CatalogMatch {
                    title: "Dune".to_string(),
                    author: "Frank Herbert".to_string(),
                    isbn10: None,
                    isbn13: Some("9780441013593".to_string()),
                })),
                // A catalog record with no usable title.
                "Weird" => Ok(Some(CatalogMatch {
                    title: String::new(),
                    author: String::new(),
                    isbn10: None,
                    isbn13: None,
                })),
                _ => Ok(None),
            }
        }
    }

    /// Reads pass through, writes always fail.
    struct ReadOnlyCatalog(Arc<MemoryStore>);

    #[async_trait]
    impl CatalogStore for ReadOnlyCatalog {
        async fn insert_books(&self, _: &str, _: Option<&str>, _: &[NewBook]) -> StoreResult<u64> {
            Err(StoreError::Unavailable("write connection lost".to_string()))
        }

        async fn list_books(&self, user_id: &str) -> StoreResult<Vec<Book>> {
            self.0.list_books(user_id).await
        }

        async fn count_image_groups(&self, user_id: &str) -> StoreResult<u64> {
            self.0.count_image_groups(user_id).await
        }

        async fn ping(&self) -> StoreResult<()> {
            self.0.ping().await
        }
    }

    fn image() -> String {
        format!("data:image/jpeg;base64,{}", general_purpose::STANDARD.encode(b"shelf photo"))
    }

    fn pipeline_with(
        store: &Arc<MemoryStore>,
        catalog: Arc<dyn CatalogStore>,
        vision: MockVisionExtractor,
    ) -> IngestionPipeline {
        IngestionPipeline::new(
            ImageIntake::default(),
            QuotaPolicy::new(store.clone(), catalog.clone(), PlanLimits::default()),
            Arc::new(vision),
            Enricher::new(
                Arc::new(DuneCatalog),
                &EnrichmentConfig {
                    batch_size: 5,
                    batch_pause: Duration::ZERO,
                },
            ),
            catalog,
            Arc::new(MetricsService::new().unwrap()),
        )
    }

    fn pipeline(store: &Arc<MemoryStore>, vision: MockVisionExtractor) -> IngestionPipeline {
        pipeline_with(store, store.clone(), vision)
    }

    fn returning(books: Vec<ExtractedBook>) -> MockVisionExtractor {
        let mut vision = MockVisionExtractor::new();
        vision
            .expect_extract()
            .times(1)
            .returning(move |_| Ok(books.clone()));
        vision
    }

    async fn fill_quota(store: &MemoryStore, user_id: &str, groups: usize) {
        for i in 0..groups {
            let book = NewBook {
                title: format!("Old {}", i),
                ..Default::default()
            };
            store
                .insert_books(user_id, Some(&format!("old-{}", i)), &[book])
                .await
                .unwrap();
        }
    }

    #[tokio::test]
    async fn test_enriched_book_is_persisted_with_isbn13_only() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(&store, returning(vec![ExtractedBook::new("Dune", "Frank Herbert")]));

        let outcome = pipeline.ingest("alice", &image()).await.unwrap();
        assert_eq!(outcome.created_count, 1);

        let books = store.list_books("alice").await.unwrap();
        assert_eq!(books.len(), 1);
        assert_eq!(books[0].title, "Dune");
        assert_eq!(books[0].isbn13.as_deref(), Some("9780441013593"));
        assert_eq!(books[0].isbn10, None);
        assert_eq!(books[0].image_id, Some(outcome.image_id.to_string()));
    }

    #[tokio::test]
    async fn test_unmatched_books_are_still_saved() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(
            &store,
            returning(vec![
                ExtractedBook::new("Dune", "Frank Herbert"),
                ExtractedBook::new("Handwritten Notes", ""),
            ]),
        );

        let outcome = pipeline.ingest("alice", &image()).await.unwrap();

        assert_eq!(outcome.created_count, 2);
        assert_eq!(outcome.books[1].title, "Handwritten Notes");
        assert_eq!(outcome.books[1].author, None);
        assert_eq!(store.count_image_groups("alice").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_blank_catalog_record_does_not_sink_the_batch() {
        let store = Arc::new(MemoryStore::new());
        let pipeline = pipeline(
            &store,
            returning(vec![
                ExtractedBook::new("Dune", "Frank Herbert"),
                ExtractedBook::new("Weird", ""),
            ]),
        );

        let outcome = pipeline.ingest("alice", &image()).await.unwrap();

        assert_eq!(outcome.created_count, 2);
        let titles: Vec<String> = store
            .list_books("alice")
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.title)
            .collect();
        assert_eq!(titles, vec!["Dune", "Weird"]);
    }

    #[tokio::test]
    async fn test_quota_exceeded_skips_extraction() {
        let store = Arc::new(MemoryStore::new());
        fill_quota(&store, "alice", 5).await;

        let mut vision = MockVisionExtractor::new();
        vision.expect_extract().times(0);

        let result = pipeline(&store, vision).ingest("alice", &image()).await;

        assert_eq!(result, Err(IngestError::QuotaExceeded { used: 5, limit: 5 }));
        assert_eq!(store.book_count(), 5);
    }

    #[tokio::test]
    async fn test_invalid_image_fails_before_quota_and_extraction() {
        let store = Arc::new(MemoryStore::new());
        let mut vision = MockVisionExtractor::new();
        vision.expect_extract().times(0);

        let result = pipeline(&store, vision).ingest("alice", "data:text/plain;base64,aGk=").await;
        assert!(matches!(result, Err(IngestError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn test_empty_extraction_succeeds_without_writes() {
        let store = Arc::new(MemoryStore::new());
        let outcome = pipeline(&store, returning(Vec::new()))
            .ingest("alice", &image())
            .await
            .unwrap();

        assert_eq!(outcome.created_count, 0);
        assert!(outcome.books.is_empty());
        assert_eq!(store.book_count(), 0);
        assert_eq!(store.count_image_groups("alice").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_extraction_network_error_writes_nothing() {
        let store = Arc::new(MemoryStore::new());
        fill_quota(&store, "alice", 2).await;

        let mut vision = MockVisionExtractor::new();
        vision
            .expect_extract()
            .times(1)
            .returning(|_| Err(VisionError::Network("connection refused".to_string())));

        let pipeline = pipeline(&store, vision);
        let before = pipeline.quota().status("alice").await.unwrap();
        let result = pipeline.ingest("alice", &image()).await;

        assert!(matches!(result, Err(IngestError::ExtractionFailed(_))));
        assert_eq!(store.book_count(), 2);
        assert_eq!(pipeline.quota().status("alice").await.unwrap(), before);
    }

    #[tokio::test]
    async fn test_write_failure_is_persist_failed() {
        let store = Arc::new(MemoryStore::new());
        let catalog = Arc::new(ReadOnlyCatalog(store.clone()));
        let pipeline = pipeline_with(
            &store,
            catalog,
            returning(vec![ExtractedBook::new("Dune", "Frank Herbert")]),
        );

        let result = pipeline.ingest("alice", &image()).await;

        assert!(matches!(result, Err(IngestError::PersistFailed(_))));
        assert_eq!(store.book_count(), 0);
    }

    #[tokio::test]
    async fn test_preview_does_not_persist_or_check_quota() {
        let store = Arc::new(MemoryStore::new());
        fill_quota(&store, "alice", 5).await;

        let books = pipeline(&store, returning(vec![ExtractedBook::new("Dune", "Frank Herbert")]))
            .preview(&image(), Some("img-upload-1"))
            .await
            .unwrap();

        assert_eq!(books.len(), 1);
        assert_eq!(books[0].image_id.as_deref(), Some("img-upload-1"));
        assert_eq!(books[0].isbn13.as_deref(), Some("9780441013593"));
        assert_eq!(store.book_count(), 5);
    }

    #[tokio::test]
    async fn test_validate_upload_enforces_quota() {
        let store = Arc::new(MemoryStore::new());
        let mut vision = MockVisionExtractor::new();
        vision.expect_extract().times(0);
        let pipeline = pipeline(&store, vision);

        assert!(pipeline.validate_upload("alice", &image()).await.is_ok());

        fill_quota(&store, "alice", 5).await;
        assert!(matches!(
            pipeline.validate_upload("alice", &image()).await,
            Err(IngestError::QuotaExceeded { .. })
        ));
    }
}
