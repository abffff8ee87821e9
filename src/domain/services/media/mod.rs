use async_trait::async_trait;
use thiserror::Error;

use crate::domain::services::store::StoreError;

pub mod cascade;
pub mod media_service;

pub use cascade::{CascadeReport, MediaCascadeHandler};
pub use media_service::MediaService;

/// Remote storage holding the bytes of media assets
///
/// Only deletion is needed here; uploads are handled elsewhere.
#[async_trait]
pub trait AssetStore: Send + Sync {
    /// Deletes the remote asset.
    ///
    /// # Arguments
    /// * `remote_asset_id` - Identifier of the asset in the remote store
    ///
    /// # Returns
    /// * `Ok(())` - The asset is gone (including when it was already gone)
    /// * `Err(AssetStoreError)` - The asset may still exist remotely
    async fn delete_asset(&self, remote_asset_id: &str) -> Result<(), AssetStoreError>;
}

/// Errors returned by the remote asset store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssetStoreError {
    /// The remote store could not be reached.
    #[error("Asset store request failed: {0}")]
    Transport(String),

    /// The remote store answered with a failure status.
    #[error("Asset store rejected deletion of {remote_asset_id} with status {status}")]
    Rejected { remote_asset_id: String, status: u16 },

    /// No remote store is configured for this process.
    #[error("No asset store configured")]
    NotConfigured,
}

/// Errors that can occur during media service operations.
#[derive(Debug, Error)]
pub enum MediaServiceError {
    /// A request argument is invalid.
    #[error("Invalid request: {0}")]
    Validation(String),

    /// The requested asset does not exist.
    #[error("Media asset not found: {0}")]
    NotFound(String),

    /// Error from the underlying document store.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module contains the media service: the read/register path for media asset metadata
// and the cascade coordinator that removes assets when their post is deleted.
//--------------------------------------------------------------------------------------------------

/// +----------------------------------------------------------+
/// | MODULES                                                  |
/// +----------+-------+-------+------------------------------+
/// | Exports:                                                 |
/// |   - AssetStore (trait)                                   |
/// |   - MediaService (struct)                                |
/// |   - MediaCascadeHandler (struct)                         |
/// |   - AssetStoreError, MediaServiceError (enums)           |
/// |   - MockAssetStore (for tests)                           |
/// +----------------------------------------------------------+

#[cfg(test)]
use mockall::*;

#[cfg(test)]
mock! {
    pub AssetStore {}

    #[async_trait]
    impl AssetStore for AssetStore {
        async fn delete_asset(&self, remote_asset_id: &str) -> Result<(), AssetStoreError>;
    }
}
