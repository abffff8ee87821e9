pub mod types;

pub use types::{
    ContentId, ContentRecord, DEFAULT_PAGE_SIZE, Listing, MediaAsset, MediaAssetId, SearchDocument,
};
