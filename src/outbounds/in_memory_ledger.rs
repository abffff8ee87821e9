//! In-process ledger of applied idempotency keys.

use async_trait::async_trait;
use dashmap::DashSet;

use crate::domain::services::events::{IdempotencyKey, ProcessedEvents};
use crate::domain::services::store::StoreError;

/// `ProcessedEvents` on a `DashSet`; entries are never evicted
#[derive(Debug, Default)]
pub struct InMemoryProcessedEvents {
    keys: DashSet<IdempotencyKey>,
}

impl InMemoryProcessedEvents {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[async_trait]
impl ProcessedEvents for InMemoryProcessedEvents {
    async fn is_processed(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        Ok(self.keys.contains(key))
    }

    async fn try_mark_processed(&self, key: &IdempotencyKey) -> Result<bool, StoreError> {
        Ok(self.keys.insert(key.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_key_is_marked_once() {
        let ledger = InMemoryProcessedEvents::new();
        let key = IdempotencyKey::new("post.deleted", "p1");

        assert!(!ledger.is_processed(&key).await.unwrap());
        assert!(ledger.try_mark_processed(&key).await.unwrap());
        assert!(!ledger.try_mark_processed(&key).await.unwrap());
        assert!(ledger.is_processed(&key).await.unwrap());

        let other = IdempotencyKey::new("post.created", "p1");
        assert!(!ledger.is_processed(&other).await.unwrap());
        assert_eq!(ledger.len(), 1);
    }
}
