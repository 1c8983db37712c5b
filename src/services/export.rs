use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::Book;

pub const CSV_FILENAME: &str = "books-export.csv";

#[derive(Debug, Error)]
pub enum ExportError {
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("CSV output is not UTF-8: {0}")]
    Encoding(#[from] std::string::FromUtf8Error),

    #[error("CSV writer error: {0}")]
    Writer(String),
}

/// One exported row. Absent values are written as empty cells.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CsvRecord {
    #[serde(rename = "Title")]
    pub title: String,
    #[serde(rename = "Author")]
    pub author: Option<String>,
    #[serde(rename = "ISBN10")]
    pub isbn10: Option<String>,
    #[serde(rename = "ISBN13")]
    pub isbn13: Option<String>,
    #[serde(rename = "Date Added")]
    pub date_added: NaiveDate,
}

impl From<&Book> for CsvRecord {
    fn from(book: &Book) -> Self {
        Self {
            title: book.title.clone(),
            author: book.author.clone(),
            isbn10: book.isbn10.clone(),
            isbn13: book.isbn13.clone(),
            date_added: book.added_at.date_naive(),
        }
    }
}

/// Header row first, then one row per book in the given order.
pub fn to_csv(books: &[Book]) -> Result<String, ExportError> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    if books.is_empty() {
        writer.write_record(["Title", "Author", "ISBN10", "ISBN13", "Date Added"])?;
    }
    for book in books {
        writer.serialize(CsvRecord::from(book))?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| ExportError::Writer(e.to_string()))?;
    Ok(String::from_utf8(bytes)?)
}

pub fn from_csv(data: &str) -> Result<Vec<CsvRecord>, ExportError> {
    let mut reader = csv::Reader::from_reader(data.as_bytes());
    let records = reader
        .deserialize()
        .collect::<Result<Vec<CsvRecord>, csv::Error>>()?;
    Ok(records)
}
