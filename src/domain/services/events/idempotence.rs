use async_trait::async_trait;

use super::event_types::IdempotencyKey;
use crate::domain::services::store::StoreError;

/// Ledger of events a consumer has already applied, keyed by `IdempotencyKey`
///
/// Handlers whose effects cannot be recognised from current state alone (a create that
/// must not come back after a delete) check and mark keys here.
#[async_trait]
pub trait ProcessedEvents: Send + Sync {
    async fn is_processed(&self, key: &IdempotencyKey) -> Result<bool, StoreError>;

    /// Marks `key` as applied.
    ///
    /// # Returns
    /// * `Ok(true)` - The key was recorded by this call
    /// * `Ok(false)` - The key was already recorded
    async fn try_mark_processed(&self, key: &IdempotencyKey) -> Result<bool, StoreError>;
}
