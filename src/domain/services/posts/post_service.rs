use std::{collections::BTreeSet, sync::Arc};

use tracing::{debug, error, info};
use uuid::Uuid;

use super::PostServiceError;
use crate::clock::Clock;
use crate::domain::models::types::{ContentRecord, DEFAULT_PAGE_SIZE, Listing};
use crate::domain::services::cache::{CacheKey, ReadThroughCache};
use crate::domain::services::events::{
    EventPayload, EventProducer, PostCreated, PostDeleted, RetryPolicy, publish_with_retry,
};
use crate::domain::services::store::{DocumentFilter, DocumentStore};

/// Content service: owns posts, invalidates caches and emits events on writes
///
/// Ordering on every write: commit to the store, invalidate the cache, publish.
/// A publish that still fails after retries is logged and never reaches the caller.
pub struct PostService {
    posts: Arc<dyn DocumentStore<ContentRecord>>,
    cache: ReadThroughCache,
    producer: EventProducer,
    retry: RetryPolicy,
    clock: Arc<dyn Clock>,
}

impl PostService {
    pub fn new(
        posts: Arc<dyn DocumentStore<ContentRecord>>,
        cache: ReadThroughCache,
        producer: EventProducer,
        retry: RetryPolicy,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            posts,
            cache,
            producer,
            retry,
            clock,
        }
    }

    /// Creates a post and emits `post.created`
    ///
    /// # Arguments
    /// * `owner_id` - Author of the post
    /// * `body` - Text content; must not be blank
    /// * `media_ids` - Media assets attached to the post
    ///
    /// # Errors
    /// * `PostServiceError::Validation` - blank owner or body
    /// * `PostServiceError::Store` - the post could not be saved
    pub async fn create_post(
        &self,
        owner_id: &str,
        body: &str,
        media_ids: Vec<String>,
    ) -> Result<ContentRecord, PostServiceError> {
        if owner_id.trim().is_empty() {
            return Err(PostServiceError::Validation(
                "ownerId is required".to_string(),
            ));
        }
        if body.trim().is_empty() {
            return Err(PostServiceError::Validation(
                "body must not be empty".to_string(),
            ));
        }

        let record = ContentRecord {
            id: Uuid::new_v4().to_string(),
            owner_id: owner_id.to_string(),
            body: body.to_string(),
            media_refs: media_ids.into_iter().collect::<BTreeSet<_>>(),
            created_at: self.clock.now(),
        };

        self.posts.save(record.clone()).await?;
        self.cache.invalidate_after_write(&record.id).await;

        self.emit(EventPayload::PostCreated(PostCreated {
            content_id: record.id.clone(),
            owner_id: record.owner_id.clone(),
            body: Some(record.body.clone()),
            created_at: Some(record.created_at),
        }))
        .await;

        info!(content_id = %record.id, owner_id = %record.owner_id, "post created");
        Ok(record)
    }

    /// Deletes a post owned by `owner_id` and emits `post.deleted` with its media ids
    ///
    /// # Errors
    /// * `PostServiceError::NotFound` - no such post, or owned by someone else
    /// * `PostServiceError::Store` - the store failed
    pub async fn delete_post(&self, id: &str, owner_id: &str) -> Result<(), PostServiceError> {
        let record = self
            .posts
            .find_by_id(id)
            .await?
            .filter(|record| record.owner_id == owner_id)
            .ok_or_else(|| PostServiceError::NotFound(id.to_string()))?;

        if self.posts.delete_by_id(&record.id).await?.is_none() {
            // Deleted concurrently; that request emitted the event.
            return Err(PostServiceError::NotFound(id.to_string()));
        }
        self.cache.invalidate_after_write(&record.id).await;

        self.emit(EventPayload::PostDeleted(PostDeleted {
            content_id: record.id.clone(),
            media_asset_ids: record.media_refs.iter().cloned().collect(),
        }))
        .await;

        info!(content_id = %record.id, "post deleted");
        Ok(())
    }

    pub async fn get_post(&self, id: &str) -> Result<ContentRecord, PostServiceError> {
        self.cache
            .get_or_load(&CacheKey::resource(id), || async move {
                self.posts
                    .find_by_id(id)
                    .await?
                    .ok_or_else(|| PostServiceError::NotFound(id.to_string()))
            })
            .await
    }

    /// Newest-first page of posts
    ///
    /// `listing:<page>` holds pages of `DEFAULT_PAGE_SIZE` only; any other `limit` reads
    /// the store directly so one page size never answers for another.
    pub async fn list_posts(
        &self,
        page: u32,
        limit: u32,
    ) -> Result<Listing<ContentRecord>, PostServiceError> {
        let page = page.max(1);
        let limit = limit.max(1);
        let load = || async move {
            let posts = self.posts.find(&DocumentFilter::All, page, limit).await?;
            let total = self.posts.count(&DocumentFilter::All).await?;
            Ok::<_, PostServiceError>(Listing::new(posts, page, limit, total))
        };

        if limit != DEFAULT_PAGE_SIZE {
            debug!(page, limit, "uncached page size");
            return load().await;
        }
        self.cache.get_or_load(&CacheKey::listing(page), load).await
    }

    async fn emit(&self, payload: EventPayload) {
        let routing_key = payload.routing_key();
        let entity_id = payload.entity_id().to_string();

        if let Err(err) = publish_with_retry(&self.producer, payload, &self.retry).await {
            error!(
                routing_key,
                entity_id = %entity_id,
                "event lost after retries: {}",
                err
            );
        }
    }
}
