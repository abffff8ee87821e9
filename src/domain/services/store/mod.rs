//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Document store port used by every service for its own records. Listings are always
// newest first; pages are 1-based.
//--------------------------------------------------------------------------------------------------

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;

use crate::domain::models::types::{ContentRecord, MediaAsset, SearchDocument};

/// Errors returned by a document store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The backing store cannot be reached
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    /// A document could not be written
    #[error("Failed to write document {id}: {reason}")]
    WriteFailed { id: String, reason: String },
}

/// Selection applied by `DocumentStore::find`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentFilter {
    All,
    Owner(String),
    /// Case-insensitive match of any whitespace separated term against the document text
    Text(String),
}

/// A record that can live in a document store
pub trait Document: Clone + Send + Sync + Serialize + DeserializeOwned + 'static {
    fn id(&self) -> &str;

    fn owner_id(&self) -> &str;

    fn created_at(&self) -> DateTime<Utc>;

    /// Searchable text, if any
    fn text(&self) -> Option<&str> {
        None
    }

    fn matches(&self, filter: &DocumentFilter) -> bool {
        match filter {
            DocumentFilter::All => true,
            DocumentFilter::Owner(owner_id) => self.owner_id() == owner_id,
            DocumentFilter::Text(query) => self
                .text()
                .map(|text| text_matches(text, query))
                .unwrap_or(false),
        }
    }
}

/// True when any term of `query` appears as a word of `text`, ignoring case
pub fn text_matches(text: &str, query: &str) -> bool {
    let words: Vec<String> = text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|word| !word.is_empty())
        .map(str::to_lowercase)
        .collect();

    query
        .split_whitespace()
        .map(str::to_lowercase)
        .any(|term| words.contains(&term))
}

#[async_trait]
pub trait DocumentStore<T: Document>: Send + Sync {
    /// Inserts or replaces the document with the same id
    async fn save(&self, document: T) -> Result<(), StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Removes the document and returns it, or None if it did not exist
    async fn delete_by_id(&self, id: &str) -> Result<Option<T>, StoreError>;

    /// Newest-first page of matching documents; `page` starts at 1
    async fn find(
        &self,
        filter: &DocumentFilter,
        page: u32,
        limit: u32,
    ) -> Result<Vec<T>, StoreError>;

    async fn count(&self, filter: &DocumentFilter) -> Result<usize, StoreError>;
}

impl Document for ContentRecord {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn text(&self) -> Option<&str> {
        Some(&self.body)
    }
}

impl Document for MediaAsset {
    fn id(&self) -> &str {
        &self.id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl Document for SearchDocument {
    fn id(&self) -> &str {
        &self.content_id
    }

    fn owner_id(&self) -> &str {
        &self.owner_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn text(&self) -> Option<&str> {
        Some(&self.text)
    }
}
