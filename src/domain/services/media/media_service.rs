use std::{collections::BTreeSet, sync::Arc};

use tracing::{debug, info};
use uuid::Uuid;

use super::MediaServiceError;
use crate::clock::Clock;
use crate::domain::models::types::{DEFAULT_PAGE_SIZE, Listing, MediaAsset};
use crate::domain::services::cache::{CacheKey, ReadThroughCache};
use crate::domain::services::store::{DocumentFilter, DocumentStore};

/// Register and read path for media asset metadata
pub struct MediaService {
    assets: Arc<dyn DocumentStore<MediaAsset>>,
    cache: ReadThroughCache,
    clock: Arc<dyn Clock>,
}

impl MediaService {
    pub fn new(
        assets: Arc<dyn DocumentStore<MediaAsset>>,
        cache: ReadThroughCache,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            assets,
            cache,
            clock,
        }
    }

    /// Records an asset that was already uploaded to the remote store
    ///
    /// # Errors
    /// * `MediaServiceError::Validation` - empty owner or remote id
    /// * `MediaServiceError::Store` - the record could not be saved
    pub async fn register_asset(
        &self,
        owner_id: &str,
        remote_asset_id: &str,
        content_refs: Vec<String>,
    ) -> Result<MediaAsset, MediaServiceError> {
        if owner_id.trim().is_empty() {
            return Err(MediaServiceError::Validation(
                "ownerId is required".to_string(),
            ));
        }
        if remote_asset_id.trim().is_empty() {
            return Err(MediaServiceError::Validation(
                "remoteAssetId is required".to_string(),
            ));
        }

        let asset = MediaAsset {
            id: Uuid::new_v4().to_string(),
            remote_asset_id: remote_asset_id.to_string(),
            owner_id: owner_id.to_string(),
            content_refs: content_refs.into_iter().collect::<BTreeSet<_>>(),
            created_at: self.clock.now(),
        };

        self.assets.save(asset.clone()).await?;
        self.cache.invalidate_after_write(&asset.id).await;

        info!(asset_id = %asset.id, owner_id = %asset.owner_id, "media asset registered");
        Ok(asset)
    }

    pub async fn get_asset(&self, id: &str) -> Result<MediaAsset, MediaServiceError> {
        self.cache
            .get_or_load(&CacheKey::resource(id), || async move {
                self.assets
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| MediaServiceError::NotFound(id.to_string()))
            })
            .await
    }

    /// Newest-first page of assets; only `DEFAULT_PAGE_SIZE` pages are cached
    pub async fn list_assets(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Listing<MediaAsset>, MediaServiceError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let load = || async move {
            let items = self.assets.find(&DocumentFilter::All, page, limit).await?;
            let total = self.assets.count(&DocumentFilter::All).await?;
            Ok::<_, MediaServiceError>(Listing::new(items, page, limit, total))
        };

        if limit != DEFAULT_PAGE_SIZE {
            debug!(page, limit, "uncached page size");
            return load().await;
        }
        self.cache.get_or_load(&CacheKey::listing(page), load).await
    }
}
