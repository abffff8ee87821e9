use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::AssetStore;
use crate::domain::models::types::MediaAsset;
use crate::domain::services::cache::ReadThroughCache;
use crate::domain::services::events::{
    DomainEvent, EventHandler, EventPayload, HandlerError, PostDeleted,
};
use crate::domain::services::store::DocumentStore;

/// What happened to each asset of one `post.deleted` event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CascadeReport {
    /// Removed remotely and locally during this run
    pub deleted: Vec<String>,
    /// Not found locally, treated as already deleted
    pub already_absent: Vec<String>,
    /// Could not be fully removed; still visible or orphaned remotely
    pub failed: Vec<String>,
}

impl CascadeReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Removes the media assets of a deleted post
///
/// Every asset is processed independently, so one failure never blocks the others:
///
/// 1. resolve the local record; absent means already deleted
/// 2. delete the remote asset; on failure the asset is left in place and logged
/// 3. delete the local record
/// 4. invalidate `resource:<id>` and every listing
///
/// A failure between 2 and 3 leaves a remotely deleted asset with a local record. It is
/// logged and not compensated; the next delivery of the same event finishes the job
/// because the remote store treats a missing asset as deleted.
pub struct MediaCascadeHandler {
    assets: Arc<dyn DocumentStore<MediaAsset>>,
    remote: Arc<dyn AssetStore>,
    cache: ReadThroughCache,
}

impl MediaCascadeHandler {
    pub fn new(
        assets: Arc<dyn DocumentStore<MediaAsset>>,
        remote: Arc<dyn AssetStore>,
        cache: ReadThroughCache,
    ) -> Self {
        Self {
            assets,
            remote,
            cache,
        }
    }

    /// Runs the cascade for one event and reports the outcome per asset
    pub async fn cascade(&self, event: &PostDeleted) -> CascadeReport {
        let mut report = CascadeReport::default();

        for asset_id in &event.media_asset_ids {
            let asset = match self.assets.find_by_id(asset_id).await {
                Ok(Some(asset)) => asset,
                Ok(None) => {
                    debug!(asset_id = %asset_id, "media asset already deleted");
                    report.already_absent.push(asset_id.clone());
                    continue;
                }
                Err(err) => {
                    error!(asset_id = %asset_id, "failed to load media asset: {}", err);
                    report.failed.push(asset_id.clone());
                    continue;
                }
            };

            if let Err(err) = self.remote.delete_asset(&asset.remote_asset_id).await {
                error!(
                    content_id = %event.content_id,
                    asset_id = %asset.id,
                    remote_asset_id = %asset.remote_asset_id,
                    "remote delete failed, asset left orphaned: {}",
                    err
                );
                report.failed.push(asset_id.clone());
                continue;
            }

            if let Err(err) = self.assets.delete_by_id(&asset.id).await {
                error!(
                    asset_id = %asset.id,
                    remote_asset_id = %asset.remote_asset_id,
                    "remote asset deleted but local record remains: {}",
                    err
                );
                report.failed.push(asset_id.clone());
                continue;
            }

            self.cache.invalidate_resource(&asset.id).await;
            report.deleted.push(asset_id.clone());
        }

        if !report.deleted.is_empty() {
            self.cache.invalidate_listings().await;
        }

        report
    }
}

#[async_trait]
impl EventHandler for MediaCascadeHandler {
    fn name(&self) -> &'static str {
        "media-cascade"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let EventPayload::PostDeleted(payload) = &event.payload else {
            debug!(routing_key = event.routing_key(), "ignoring event");
            return Ok(());
        };

        let report = self.cascade(payload).await;

        if report.is_complete() {
            info!(
                content_id = %payload.content_id,
                deleted = report.deleted.len(),
                already_absent = report.already_absent.len(),
                "media cascade complete"
            );
            Ok(())
        } else {
            warn!(
                content_id = %payload.content_id,
                deleted = report.deleted.len(),
                failed = ?report.failed,
                "media cascade incomplete"
            );
            Err(HandlerError::CascadeIncomplete {
                failed: report.failed,
            })
        }
    }
}
