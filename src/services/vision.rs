//! Book detection through an OpenAI-compatible chat completions endpoint.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::VisionConfig;

const SYSTEM_PROMPT: &str = "You are a book identification expert. Given an image input, identify all \
visible book titles and authors. Respond in JSON format with an object containing a 'books' array, \
each entry containing 'title' and 'author' fields. If only the title or author is visible, include \
what's identifiable. If no books are identified or the image cannot be processed, return an empty array.";

const MAX_TOKENS: u32 = 4000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractedBook {
    pub title: String,
    /// Empty when the author could not be read.
    pub author: String,
}

impl ExtractedBook {
    pub fn new(title: &str, author: &str) -> Self {
        Self {
            title: title.to_string(),
            author: author.to_string(),
        }
    }
}

#[derive(Debug, Error)]
pub enum VisionError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Vision API error {0}: {1}")]
    Api(u16, String),

    #[error("Client configuration error: {0}")]
    Config(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VisionExtractor: Send + Sync {
    /// Reads (title, author) pairs off a shelf photo given as a data URL.
    async fn extract(&self, data_url: &str) -> Result<Vec<ExtractedBook>, VisionError>;
}

#[derive(Debug, Deserialize)]
struct ChatCompletion {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

pub struct OpenAiVisionClient {
    http_client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
}

impl OpenAiVisionClient {
    pub fn new(config: &VisionConfig) -> Result<Self, VisionError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| VisionError::Config(e.to_string()))?;

        Ok(Self {
            http_client,
            endpoint: format!("{}/chat/completions", config.base_url.trim_end_matches('/')),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
        })
    }

    fn request_body(&self, data_url: &str) -> Value {
        json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": SYSTEM_PROMPT },
                {
                    "role": "user",
                    "content": [
                        { "type": "image_url", "image_url": { "url": data_url } }
                    ]
                }
            ],
            "response_format": { "type": "json_object" },
            "max_tokens": MAX_TOKENS
        })
    }
}

#[async_trait]
impl VisionExtractor for OpenAiVisionClient {
    async fn extract(&self, data_url: &str) -> Result<Vec<ExtractedBook>, VisionError> {
        tracing::debug!(endpoint = %self.endpoint, model = %self.model, "Requesting book extraction");

        let response = self
            .http_client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&self.request_body(data_url))
            .send()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .map_err(|e| VisionError::Network(e.to_string()))?;
            return Err(VisionError::Api(status.as_u16(), error_text));
        }

        let body = response
            .text()
            .await
            .map_err(|e| VisionError::Network(e.to_string()))?;

        let completion: ChatCompletion = match serde_json::from_str(&body) {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!("Unexpected completion envelope, treating as no books: {}", e);
                return Ok(Vec::new());
            }
        };

        let content = completion
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .unwrap_or_default();

        let books = parse_books(&content);
        tracing::debug!(count = books.len(), "Vision model returned books");
        Ok(books)
    }
}

/// Accepts a bare array or an object with a `books` array. Anything else,
/// including invalid JSON, yields no books. Entries without a title are
/// dropped.
pub fn parse_books(content: &str) -> Vec<ExtractedBook> {
    let content = strip_code_fence(content.trim());

    let value: Value = match serde_json::from_str(content) {
        Ok(value) => value,
        Err(_) => {
            tracing::warn!("Vision response is not JSON, defaulting to empty list");
            return Vec::new();
        }
    };

    let items = match &value {
        Value::Array(items) => items,
        Value::Object(map) => match map.get("books") {
            Some(Value::Array(items)) => items,
            _ => {
                tracing::warn!("Vision response object has no books array");
                return Vec::new();
            }
        },
        _ => return Vec::new(),
    };

    items
        .iter()
        .filter_map(|item| {
            let field = |name: &str| {
                item.get(name)
                    .and_then(Value::as_str)
                    .map(str::trim)
                    .unwrap_or("")
                    .to_string()
            };

            let title = field("title");
            if title.is_empty() {
                return None;
            }
            Some(ExtractedBook {
                title,
                author: field("author"),
            })
        })
        .collect()
}

fn strip_code_fence(content: &str) -> &str {
    content
        .strip_prefix("```json")
        .or_else(|| content.strip_prefix("```"))
        .and_then(|inner| inner.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(content)
}
