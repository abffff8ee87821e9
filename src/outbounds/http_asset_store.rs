use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::{debug, info};

use crate::domain::services::media::{AssetStore, AssetStoreError};

/// Remote asset store reached over HTTP
///
/// Deletion is `DELETE {base_url}/{remote_asset_id}`. A 404 means the asset is already
/// gone and counts as success, so repeated cascades stay idempotent.
#[derive(Debug, Clone)]
pub struct HttpAssetStore {
    client: Client,
    base_url: String,
}

impl HttpAssetStore {
    pub fn new(base_url: &str) -> Self {
        Self::with_client(Client::new(), base_url)
    }

    pub fn with_client(client: Client, base_url: &str) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// `remote_asset_id` becomes one percent-encoded path segment
    fn asset_url(&self, remote_asset_id: &str) -> Result<Url, AssetStoreError> {
        let mut url = Url::parse(&self.base_url).map_err(|err| {
            AssetStoreError::Transport(format!(
                "invalid asset store url {}: {}",
                self.base_url, err
            ))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                AssetStoreError::Transport(format!(
                    "asset store url {} cannot take a path",
                    self.base_url
                ))
            })?
            .pop_if_empty()
            .push(remote_asset_id);

        Ok(url)
    }
}

#[async_trait]
impl AssetStore for HttpAssetStore {
    async fn delete_asset(&self, remote_asset_id: &str) -> Result<(), AssetStoreError> {
        let url = self.asset_url(remote_asset_id)?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|err| AssetStoreError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() {
            info!(remote_asset_id, "remote asset deleted");
            Ok(())
        } else if status == StatusCode::NOT_FOUND {
            debug!(remote_asset_id, "remote asset already gone");
            Ok(())
        } else {
            Err(AssetStoreError::Rejected {
                remote_asset_id: remote_asset_id.to_string(),
                status: status.as_u16(),
            })
        }
    }
}

/// Asset store used when no remote store is configured; every deletion fails
#[derive(Debug, Clone, Copy, Default)]
pub struct UnconfiguredAssetStore;

#[async_trait]
impl AssetStore for UnconfiguredAssetStore {
    async fn delete_asset(&self, _remote_asset_id: &str) -> Result<(), AssetStoreError> {
        Err(AssetStoreError::NotConfigured)
    }
}
