use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Identifier of a content record
pub type ContentId = String;

/// Identifier of a media asset
pub type MediaAssetId = String;

/// A post, owned by the content service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub id: ContentId,
    pub owner_id: String,
    pub body: String,
    pub media_refs: BTreeSet<MediaAssetId>,
    pub created_at: DateTime<Utc>,
}

/// Metadata of an uploaded file, owned by the media service
///
/// `remote_asset_id` is the identifier used by the remote asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaAsset {
    pub id: MediaAssetId,
    pub remote_asset_id: String,
    pub owner_id: String,
    pub content_refs: BTreeSet<ContentId>,
    pub created_at: DateTime<Utc>,
}

/// Search projection of a post, derived only from events
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchDocument {
    pub content_id: ContentId,
    pub owner_id: String,
    pub text: String,
    pub created_at: DateTime<Utc>,
}

/// Page size whose listings are cached under `listing:<page>`
pub const DEFAULT_PAGE_SIZE: u32 = 10;

/// One page of a newest-first listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Listing<T> {
    pub items: Vec<T>,
    pub current_page: u32,
    pub total_pages: u32,
    pub total_items: usize,
}

impl<T> Listing<T> {
    pub fn new(items: Vec<T>, current_page: u32, limit: u32, total_items: usize) -> Self {
        let limit = limit.max(1) as usize;
        let total_pages = total_items.div_ceil(limit) as u32;

        Self {
            items,
            current_page,
            total_pages,
            total_items,
        }
    }
}
