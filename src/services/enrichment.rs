use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;

use crate::config::EnrichmentConfig;
use crate::models::NewBook;
use crate::services::catalog_search::{CatalogMatch, CatalogSearch};
use crate::services::vision::ExtractedBook;

/// Result of looking one extracted book up in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EnrichmentOutcome {
    Matched {
        title: String,
        author: String,
        isbn10: Option<String>,
        isbn13: Option<String>,
    },
    Unmatched {
        title: String,
        author: String,
    },
}

impl EnrichmentOutcome {
    pub fn is_matched(&self) -> bool {
        matches!(self, EnrichmentOutcome::Matched { .. })
    }

    pub fn title(&self) -> &str {
        match self {
            EnrichmentOutcome::Matched { title, .. } | EnrichmentOutcome::Unmatched { title, .. } => {
                title
            }
        }
    }

    fn unmatched(book: &ExtractedBook) -> Self {
        EnrichmentOutcome::Unmatched {
            title: book.title.clone(),
            author: book.author.clone(),
        }
    }

    /// Blank catalog fields fall back to what was read off the spine.
    fn matched(book: &ExtractedBook, found: CatalogMatch) -> Self {
        let or_extracted = |value: String, extracted: &str| {
            if value.trim().is_empty() {
                extracted.to_string()
            } else {
                value
            }
        };

        EnrichmentOutcome::Matched {
            title: or_extracted(found.title, &book.title),
            author: or_extracted(found.author, &book.author),
            isbn10: found.isbn10,
            isbn13: found.isbn13,
        }
    }

    /// Row to persist, tagged with the image it came from.
    pub fn into_new_book(self, image_id: Option<&str>) -> NewBook {
        let (title, author, isbn10, isbn13) = match self {
            EnrichmentOutcome::Matched {
                title,
                author,
                isbn10,
                isbn13,
            } => (title, author, isbn10, isbn13),
            EnrichmentOutcome::Unmatched { title, author } => (title, author, None, None),
        };

        NewBook {
            title,
            author: Some(author),
            isbn10,
            isbn13,
            image_id: image_id.map(str::to_string),
        }
        .normalized()
    }
}

/// Looks extracted books up in fixed-size concurrent batches, pausing
/// between batches to stay under the catalog's rate limit.
#[derive(Clone)]
pub struct Enricher {
    search: Arc<dyn CatalogSearch>,
    batch_size: usize,
    batch_pause: Duration,
}

impl Enricher {
    pub fn new(search: Arc<dyn CatalogSearch>, config: &EnrichmentConfig) -> Self {
        Self {
            search,
            batch_size: config.batch_size.max(1),
            batch_pause: config.batch_pause,
        }
    }

    /// One outcome per input, in input order. Lookup failures become
    /// `Unmatched` for that item only.
    pub async fn enrich(&self, books: &[ExtractedBook]) -> Vec<EnrichmentOutcome> {
        let mut outcomes = Vec::with_capacity(books.len());
        let batches = books.chunks(self.batch_size);
        let batch_count = batches.len();

        for (index, batch) in batches.enumerate() {
            let lookups = batch.iter().map(|book| self.lookup(book));
            outcomes.extend(join_all(lookups).await);

            if index + 1 < batch_count && !self.batch_pause.is_zero() {
                tokio::time::sleep(self.batch_pause).await;
            }
        }

        let matched = outcomes.iter().filter(|o| o.is_matched()).count();
        tracing::info!(total = outcomes.len(), matched, "Enrichment finished");
        outcomes
    }

    async fn lookup(&self, book: &ExtractedBook) -> EnrichmentOutcome {
        let author = Some(book.author.as_str()).filter(|a| !a.trim().is_empty());

        match self.search.search(&book.title, author).await {
            Ok(Some(found)) => {
                tracing::debug!(
                    title = %found.title,
                    isbn10 = ?found.isbn10,
                    isbn13 = ?found.isbn13,
                    "Catalog match"
                );
                EnrichmentOutcome::matched(book, found)
            }
            Ok(None) => {
                tracing::debug!(title = %book.title, "No catalog match");
                EnrichmentOutcome::unmatched(book)
            }
            Err(e) => {
                tracing::warn!(title = %book.title, "Catalog lookup failed: {}", e);
                EnrichmentOutcome::unmatched(book)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog_search::CatalogSearchError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    /// Matches every title except "Missing"; fails on "Flaky"; returns a
    /// record without title or author for "Blank".
    #[derive(Default)]
    struct FakeSearch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogSearch for FakeSearch {
        async fn search(
            &self,
            title: &str,
            author: Option<&str>,
        ) -> Result<Option<CatalogMatch>, CatalogSearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match title {
                "Missing" => Ok(None),
                "Flaky" => Err(CatalogSearchError::Network("connection reset".to_string())),
                "Blank" => Ok(Some(CatalogMatch {
                    title: "  ".to_string(),
                    author: String::new(),
                    isbn10: Some("0000000000".to_string()),
                    isbn13: None,
                })),
                _ => Ok(Some(CatalogMatch {
                    title: title.to_uppercase(),
                    author: author.unwrap_or("Unknown").to_string(),
                    isbn10: None,
                    isbn13: Some(format!("978{}", title.len())),
                })),
            }
        }
    }

    fn enricher(search: Arc<FakeSearch>, batch_pause: Duration) -> Enricher {
        Enricher::new(
            search,
            &EnrichmentConfig {
                batch_size: 5,
                batch_pause,
            },
        )
    }

    fn extracted(titles: &[&str]) -> Vec<ExtractedBook> {
        titles.iter().map(|t| ExtractedBook::new(t, "")).collect()
    }

    #[tokio::test]
    async fn test_empty_input_makes_no_lookups() {
        let search = Arc::new(FakeSearch::default());
        let outcomes = enricher(search.clone(), Duration::ZERO).enrich(&[]).await;

        assert!(outcomes.is_empty());
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_outcomes_preserve_length_and_order() {
        let titles: Vec<String> = (0..12).map(|i| format!("Book {}", i)).collect();
        let refs: Vec<&str> = titles.iter().map(String::as_str).collect();
        let search = Arc::new(FakeSearch::default());

        let outcomes = enricher(search.clone(), Duration::ZERO).enrich(&extracted(&refs)).await;

        assert_eq!(outcomes.len(), 12);
        assert_eq!(search.calls.load(Ordering::SeqCst), 12);
        for (outcome, title) in outcomes.iter().zip(&titles) {
            assert_eq!(outcome.title(), title.to_uppercase());
        }
    }

    #[tokio::test]
    async fn test_lookup_failure_is_isolated_to_its_item() {
        let search = Arc::new(FakeSearch::default());
        let outcomes = enricher(search, Duration::ZERO)
            .enrich(&extracted(&["Dune", "Flaky", "Missing", "Emma"]))
            .await;

        assert!(outcomes[0].is_matched());
        assert_eq!(
            outcomes[1],
            EnrichmentOutcome::Unmatched { title: "Flaky".to_string(), author: String::new() }
        );
        assert!(!outcomes[2].is_matched());
        assert!(outcomes[3].is_matched());
    }

    #[tokio::test]
    async fn test_blank_catalog_fields_keep_extracted_values() {
        let search = Arc::new(FakeSearch::default());
        let books = vec![
            ExtractedBook::new("Blank", "Someone"),
            ExtractedBook::new("Dune", "Frank Herbert"),
        ];

        let outcomes = enricher(search, Duration::ZERO).enrich(&books).await;

        assert_eq!(
            outcomes[0],
            EnrichmentOutcome::Matched {
                title: "Blank".to_string(),
                author: "Someone".to_string(),
                isbn10: Some("0000000000".to_string()),
                isbn13: None,
            }
        );
        assert_eq!(outcomes[1].title(), "DUNE");

        let rows: Vec<NewBook> = outcomes.into_iter().map(|o| o.into_new_book(None)).collect();
        assert!(rows.iter().all(|book| !book.title.is_empty()));
    }

    #[tokio::test]
    async fn test_pauses_between_batches_only() {
        let search = Arc::new(FakeSearch::default());
        let pause = Duration::from_millis(50);

        let started = Instant::now();
        enricher(search.clone(), pause).enrich(&extracted(&["A", "B", "C", "D", "E"])).await;
        assert!(started.elapsed() < pause);

        let started = Instant::now();
        enricher(search, pause)
            .enrich(&extracted(&["A", "B", "C", "D", "E", "F", "G", "H", "I", "J", "K"]))
            .await;
        assert!(started.elapsed() >= pause * 2);
    }

    #[test]
    fn test_unmatched_outcome_persists_without_isbns() {
        let book = EnrichmentOutcome::Unmatched {
            title: "Emma".to_string(),
            author: String::new(),
        }
        .into_new_book(Some("img-1"));

        assert_eq!(book.title, "Emma");
        assert_eq!(book.author, None);
        assert_eq!(book.isbn10, None);
        assert_eq!(book.isbn13, None);
        assert_eq!(book.image_id.as_deref(), Some("img-1"));
    }
}
