use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::domain::models::types::SearchDocument;
use crate::domain::services::cache::{KeyFamily, ReadThroughCache};
use crate::domain::services::events::{
    DomainEvent, EventHandler, EventPayload, HandlerError, IdempotencyKey, POST_DELETED,
    ProcessedEvents,
};
use crate::domain::services::store::DocumentStore;

/// Maintains search documents from post events
///
/// A document is created once on `post.created` and removed on `post.deleted`; it is
/// never updated in place. Applied events are recorded in a `ProcessedEvents` ledger and
/// a `post.deleted` key doubles as a tombstone, so a redelivered `post.created` never
/// brings a deleted document back.
pub struct SearchProjection {
    documents: Arc<dyn DocumentStore<SearchDocument>>,
    processed: Arc<dyn ProcessedEvents>,
    cache: ReadThroughCache,
}

impl SearchProjection {
    pub fn new(
        documents: Arc<dyn DocumentStore<SearchDocument>>,
        processed: Arc<dyn ProcessedEvents>,
        cache: ReadThroughCache,
    ) -> Self {
        Self {
            documents,
            processed,
            cache,
        }
    }

    /// Returns true when the document was written
    async fn apply_created(&self, event: &DomainEvent) -> Result<bool, HandlerError> {
        let EventPayload::PostCreated(payload) = &event.payload else {
            return Ok(false);
        };

        let key = event.idempotency_key();
        if self.processed.is_processed(&key).await? {
            debug!(idempotency_key = %key, "post.created already applied");
            return Ok(false);
        }

        let tombstone = IdempotencyKey::new(POST_DELETED, &payload.content_id);
        if self.processed.is_processed(&tombstone).await? {
            debug!(content_id = %payload.content_id, "post already deleted, create ignored");
            self.processed.try_mark_processed(&key).await?;
            return Ok(false);
        }

        if self.documents.find_by_id(&payload.content_id).await?.is_some() {
            debug!(content_id = %payload.content_id, "search document already exists");
            self.processed.try_mark_processed(&key).await?;
            return Ok(false);
        }

        let document = SearchDocument {
            content_id: payload.content_id.clone(),
            owner_id: payload.owner_id.clone(),
            text: payload.body.clone().unwrap_or_default(),
            created_at: payload.created_at.unwrap_or(event.emitted_at),
        };
        self.documents.save(document).await?;
        self.processed.try_mark_processed(&key).await?;

        info!(content_id = %payload.content_id, "search document created");
        Ok(true)
    }

    async fn apply_deleted(&self, event: &DomainEvent) -> Result<bool, HandlerError> {
        let EventPayload::PostDeleted(payload) = &event.payload else {
            return Ok(false);
        };

        // Tombstone first: a failed delete below leaves the document, never a resurrection.
        self.processed
            .try_mark_processed(&event.idempotency_key())
            .await?;

        if self.documents.delete_by_id(&payload.content_id).await?.is_none() {
            debug!(content_id = %payload.content_id, "search document already removed");
            return Ok(false);
        }

        info!(content_id = %payload.content_id, "search document removed");
        Ok(true)
    }
}

#[async_trait]
impl EventHandler for SearchProjection {
    fn name(&self) -> &'static str {
        "search-projection"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        let changed = match &event.payload {
            EventPayload::PostCreated(_) => self.apply_created(event).await?,
            EventPayload::PostDeleted(_) => self.apply_deleted(event).await?,
        };

        if changed {
            self.cache.invalidate_family(KeyFamily::Search).await;
        }
        Ok(())
    }
}
