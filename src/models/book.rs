use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Book {
    pub id: Uuid,
    pub title: String,
    pub author: Option<String>,
    pub isbn10: Option<String>,
    pub isbn13: Option<String>,
    pub image_id: Option<String>,
    pub user_id: String,
    pub added_at: DateTime<Utc>,
}

/// Book fields supplied by a caller; identity, owner and timestamp are
/// assigned by the store.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewBook {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub isbn10: Option<String>,
    #[serde(default)]
    pub isbn13: Option<String>,
    #[serde(default)]
    pub image_id: Option<String>,
}

impl NewBook {
    /// Trims every field and turns blank optionals into `None`.
    pub fn normalized(self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        }

        Self {
            title: self.title.trim().to_string(),
            author: clean(self.author),
            isbn10: clean(self.isbn10),
            isbn13: clean(self.isbn13),
            image_id: clean(self.image_id),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum CreateBooksRequest {
    Many { books: Vec<NewBook> },
    One(NewBook),
}

#[derive(Debug, Serialize)]
pub struct BookListResponse {
    pub books: Vec<Book>,
}
