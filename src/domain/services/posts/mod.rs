//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// Write and read path of the content service. Every committed create/delete invalidates the
// cache synchronously and then emits exactly one domain event.
//--------------------------------------------------------------------------------------------------

use thiserror::Error;

use crate::domain::services::store::StoreError;

pub mod post_service;

pub use post_service::PostService;

/// Errors that can occur in the post service
#[derive(Error, Debug)]
pub enum PostServiceError {
    /// Request data failed validation
    #[error("Invalid post: {0}")]
    Validation(String),

    /// The post does not exist or is not owned by the caller
    #[error("Post not found: {0}")]
    NotFound(String),

    /// Error from the underlying document store
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}
