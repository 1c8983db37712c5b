//! Google Books volume lookup.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::config::CatalogConfig;

#[derive(Debug, Error)]
pub enum CatalogSearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Catalog API error {0}: {1}")]
    Api(u16, String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

/// Canonical metadata for the best-ranked volume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogMatch {
    pub title: String,
    pub author: String,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
}

#[async_trait]
pub trait CatalogSearch: Send + Sync {
    /// `Ok(None)` means the catalog has no volume for this query.
    async fn search(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Option<CatalogMatch>, CatalogSearchError>;
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Volume {
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<String>,
    #[serde(default)]
    industry_identifiers: Vec<IndustryIdentifier>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

impl VolumeInfo {
    fn identifier(&self, kind: &str) -> Option<String> {
        self.industry_identifiers
            .iter()
            .find(|id| id.kind == kind)
            .map(|id| id.identifier.clone())
    }
}

pub struct GoogleBooksClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(config: &CatalogConfig) -> Result<Self, CatalogSearchError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| CatalogSearchError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
        })
    }
}

/// `intitle:<title>` plus `inauthor:<author>` when an author is known.
pub fn volume_query(title: &str, author: Option<&str>) -> String {
    match author.map(str::trim).filter(|a| !a.is_empty()) {
        Some(author) => format!("intitle:{} inauthor:{}", title.trim(), author),
        None => format!("intitle:{}", title.trim()),
    }
}

#[async_trait]
impl CatalogSearch for GoogleBooksClient {
    async fn search(
        &self,
        title: &str,
        author: Option<&str>,
    ) -> Result<Option<CatalogMatch>, CatalogSearchError> {
        let q = volume_query(title, author);
        tracing::debug!(query = %q, "Searching catalog");

        let mut params = vec![
            ("q", q),
            ("maxResults", "1".to_string()),
            ("printType", "books".to_string()),
        ];
        if let Some(key) = &self.api_key {
            params.push(("key", key.clone()));
        }

        let response = self
            .http_client
            .get(&self.base_url)
            .query(&params)
            .send()
            .await
            .map_err(|e| CatalogSearchError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| CatalogSearchError::Network(e.to_string()))?;
            return Err(CatalogSearchError::Api(status.as_u16(), error_text));
        }

        let volumes: VolumesResponse = response
            .json()
            .await
            .map_err(|e| CatalogSearchError::Parse(e.to_string()))?;

        let Some(volume) = volumes.items.into_iter().next() else {
            return Ok(None);
        };
        let info = volume.volume_info;

        let authors: Vec<&str> = info
            .authors
            .iter()
            .map(|a| a.trim())
            .filter(|a| !a.is_empty())
            .collect();
        let author = if authors.is_empty() {
            author.unwrap_or("").trim().to_string()
        } else {
            authors.join(", ")
        };

        Ok(Some(CatalogMatch {
            isbn10: info.identifier("ISBN_10"),
            isbn13: info.identifier("ISBN_13"),
            title: info
                .title
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .unwrap_or(title.trim())
                .to_string(),
            author,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use wiremock::matchers::{method, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer, api_key: Option<&str>) -> GoogleBooksClient {
        GoogleBooksClient::new(&CatalogConfig {
            base_url: format!("{}/books/v1/volumes", server.uri()),
            api_key: api_key.map(str::to_string),
            timeout: Duration::from_secs(5),
        })
        .unwrap()
    }

    #[test]
    fn test_volume_query_omits_unknown_author() {
        assert_eq!(volume_query("Dune", Some("Frank Herbert")), "intitle:Dune inauthor:Frank Herbert");
        assert_eq!(volume_query("Dune", Some("  ")), "intitle:Dune");
        assert_eq!(volume_query(" Dune ", None), "intitle:Dune");
    }

    #[tokio::test]
    async fn test_search_reads_first_volume() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(query_param("q", "intitle:Dune inauthor:Frank Herbert"))
            .and(query_param("maxResults", "1"))
            .and(query_param("printType", "books"))
            .and(query_param("key", "gb-key"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "totalItems": 1,
                "items": [{
                    "volumeInfo": {
                        "title": "Dune",
                        "authors": ["Frank Herbert"],
                        "industryIdentifiers": [
                            { "type": "ISBN_13", "identifier": "9780441013593" },
                            { "type": "OTHER", "identifier": "UOM:39015" }
                        ]
                    }
                }]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let found = client_for(&server, Some("gb-key"))
            .search("Dune", Some("Frank Herbert"))
            .await
            .unwrap();

        assert_eq!(
            found,
            Some(CatalogMatch {
                title: "Dune".to_string(),
                author: "Frank Herbert".to_string(),
                isbn10: None,
                isbn13: Some("9780441013593".to_string()),
            })
        );
    }

    #[tokio::test]
    async fn test_search_joins_multiple_authors() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{
                    "volumeInfo": {
                        "title": "Good Omens",
                        "authors": ["Terry Pratchett", "Neil Gaiman"],
                        "industryIdentifiers": [
                            { "type": "ISBN_10", "identifier": "0060853980" },
                            { "type": "ISBN_13", "identifier": "9780060853983" }
                        ]
                    }
                }]
            })))
            .mount(&server)
            .await;

        let found = client_for(&server, None)
            .search("good omens", None)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.author, "Terry Pratchett, Neil Gaiman");
        assert_eq!(found.isbn10.as_deref(), Some("0060853980"));
    }

    #[tokio::test]
    async fn test_blank_volume_fields_fall_back_to_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "items": [{ "volumeInfo": { "title": "  ", "authors": ["", " "] } }]
            })))
            .mount(&server)
            .await;

        let found = client_for(&server, None)
            .search("Weird", Some("Anon"))
            .await
            .unwrap()
            .unwrap();

        assert_eq!(found.title, "Weird");
        assert_eq!(found.author, "Anon");
        assert!(found.isbn10.is_none());
        assert!(found.isbn13.is_none());
    }

    #[tokio::test]
    async fn test_search_without_items_is_no_match() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "totalItems": 0 })))
            .mount(&server)
            .await;

        let found = client_for(&server, None).search("Nonexistent", None).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_search_rate_limited_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(429).set_body_string("rate limited"))
            .mount(&server)
            .await;

        let result = client_for(&server, None).search("Dune", None).await;
        assert!(matches!(result, Err(CatalogSearchError::Api(429, ref body)) if body == "rate limited"));
    }
}
