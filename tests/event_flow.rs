use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use chrono::Utc;

use content_sync::{
    AssetStore, AssetStoreError, CacheStore, CacheTtls, Clock, ContentRecord, DocumentStore,
    DomainEvent, EventConsumer, EventHandler, EventPayload, EventProducer, EventTransport,
    HandlerError, ManualClock, MediaAsset, MediaCascadeHandler, MediaService, PostCreated,
    PostDeleted, PostService, ReadThroughCache, RetryPolicy, SearchDocument, SearchProjection,
    SearchService, SubscriptionHandle,
    domain::services::events::{POST_CREATED, POST_DELETED},
    outbounds::{
        in_memory_broker::InMemoryBroker, in_memory_cache::InMemoryCacheStore,
        in_memory_ledger::InMemoryProcessedEvents, in_memory_store::InMemoryDocumentStore,
    },
};

/// Remote store that fails for selected ids and records every call
#[derive(Default)]
struct ScriptedAssetStore {
    failing: Vec<String>,
    calls: Mutex<Vec<String>>,
}

impl ScriptedAssetStore {
    fn failing_on(ids: &[&str]) -> Self {
        Self {
            failing: ids.iter().map(|id| id.to_string()).collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AssetStore for ScriptedAssetStore {
    async fn delete_asset(&self, remote_asset_id: &str) -> Result<(), AssetStoreError> {
        self.calls.lock().unwrap().push(remote_asset_id.to_string());
        if self.failing.iter().any(|id| id == remote_asset_id) {
            return Err(AssetStoreError::Rejected {
                remote_asset_id: remote_asset_id.to_string(),
                status: 500,
            });
        }
        Ok(())
    }
}

/// Handler that records the entity id of every event it sees
#[derive(Default)]
struct Recorder {
    seen: Mutex<Vec<String>>,
}

#[async_trait]
impl EventHandler for Recorder {
    fn name(&self) -> &'static str {
        "recorder"
    }

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError> {
        self.seen
            .lock()
            .unwrap()
            .push(event.payload.entity_id().to_string());
        Ok(())
    }
}

struct Harness {
    broker: InMemoryBroker,
    clock: Arc<ManualClock>,
    producer: EventProducer,
    consumer: EventConsumer,
}

fn harness() -> Harness {
    let broker = InMemoryBroker::new();
    let clock = Arc::new(ManualClock::default());
    let transport: Arc<dyn EventTransport> = Arc::new(broker.clone());
    Harness {
        producer: EventProducer::new(transport.clone(), clock.clone()),
        consumer: EventConsumer::new(transport, clock.clone()),
        broker,
        clock,
    }
}

fn cache(clock: &Arc<ManualClock>) -> (ReadThroughCache, Arc<InMemoryCacheStore>) {
    let store = Arc::new(InMemoryCacheStore::new(clock.clone()));
    (
        ReadThroughCache::new(store.clone(), CacheTtls::default()),
        store,
    )
}

async fn settled(handle: &SubscriptionHandle, expected: u64) {
    for _ in 0..200 {
        let stats = handle.stats();
        if stats.acked() + stats.rejected() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "expected {} settled deliveries on {}",
        expected,
        handle.queue_name()
    );
}

fn asset(id: &str, remote: &str) -> MediaAsset {
    MediaAsset {
        id: id.to_string(),
        remote_asset_id: remote.to_string(),
        owner_id: "u1".to_string(),
        content_refs: ["p1".to_string()].into_iter().collect(),
        created_at: Utc::now(),
    }
}

#[tokio::test]
async fn test_duplicate_post_deleted_deletes_assets_once() {
    let hx = harness();
    let assets = Arc::new(InMemoryDocumentStore::<MediaAsset>::new());
    assets.save(asset("m1", "r1")).await.unwrap();
    let remote = Arc::new(ScriptedAssetStore::default());
    let (media_cache, _) = cache(&hx.clock);

    let handle = hx
        .consumer
        .subscribe(
            POST_DELETED,
            Arc::new(MediaCascadeHandler::new(
                assets.clone(),
                remote.clone(),
                media_cache,
            )),
        )
        .await
        .unwrap();

    let payload = EventPayload::PostDeleted(PostDeleted {
        content_id: "p1".to_string(),
        media_asset_ids: vec!["m1".to_string()],
    });
    hx.producer.publish(payload.clone()).await.unwrap();
    hx.producer.publish(payload).await.unwrap();
    settled(&handle, 2).await;

    assert_eq!(remote.calls(), vec!["r1"]);
    assert!(assets.is_empty());
    assert_eq!(handle.stats().acked(), 2);
    assert_eq!(hx.broker.unacked_count(), 0);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cascade_continues_past_a_failing_asset() {
    let hx = harness();
    let assets = Arc::new(InMemoryDocumentStore::<MediaAsset>::new());
    for (id, remote) in [("a1", "r1"), ("a2", "r2"), ("a3", "r3")] {
        assets.save(asset(id, remote)).await.unwrap();
    }
    let remote = Arc::new(ScriptedAssetStore::failing_on(&["r2"]));
    let (media_cache, _) = cache(&hx.clock);

    let handle = hx
        .consumer
        .subscribe(
            POST_DELETED,
            Arc::new(MediaCascadeHandler::new(
                assets.clone(),
                remote.clone(),
                media_cache,
            )),
        )
        .await
        .unwrap();

    hx.producer
        .publish(EventPayload::PostDeleted(PostDeleted {
            content_id: "p1".to_string(),
            media_asset_ids: vec!["a1".to_string(), "a2".to_string(), "a3".to_string()],
        }))
        .await
        .unwrap();
    settled(&handle, 1).await;

    assert_eq!(remote.calls(), vec!["r1", "r2", "r3"]);
    assert!(assets.find_by_id("a1").await.unwrap().is_none());
    assert!(assets.find_by_id("a2").await.unwrap().is_some());
    assert!(assets.find_by_id("a3").await.unwrap().is_none());
    // Incomplete cascades are rejected so they reach the dead-letter path.
    assert_eq!(handle.stats().rejected(), 1);
    assert_eq!(hx.broker.rejected().len(), 1);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_deliveries_arrive_in_publish_order() {
    let hx = harness();
    let recorder = Arc::new(Recorder::default());
    let handle = hx
        .consumer
        .subscribe("post.*", recorder.clone())
        .await
        .unwrap();

    for i in 0..20 {
        hx.producer
            .publish(EventPayload::PostCreated(PostCreated {
                content_id: format!("p{}", i),
                owner_id: "u1".to_string(),
                body: None,
                created_at: None,
            }))
            .await
            .unwrap();
    }
    settled(&handle, 20).await;

    let expected: Vec<String> = (0..20).map(|i| format!("p{}", i)).collect();
    assert_eq!(*recorder.seen.lock().unwrap(), expected);

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_search_forgets_deleted_post() {
    let hx = harness();
    let documents = Arc::new(InMemoryDocumentStore::<SearchDocument>::new());
    let (search_cache, search_store) = cache(&hx.clock);
    let search = SearchService::new(documents.clone(), search_cache.clone());

    let handle = hx
        .consumer
        .subscribe_many(
            &[POST_CREATED.to_string(), POST_DELETED.to_string()],
            Arc::new(SearchProjection::new(
                documents.clone(),
                Arc::new(InMemoryProcessedEvents::new()),
                search_cache,
            )),
        )
        .await
        .unwrap();

    hx.producer
        .publish(EventPayload::PostCreated(PostCreated {
            content_id: "p1".to_string(),
            owner_id: "u1".to_string(),
            body: Some("morning run by the river".to_string()),
            created_at: Some(hx.clock.now()),
        }))
        .await
        .unwrap();
    settled(&handle, 1).await;

    let hits = search.search("river", None).await.unwrap();
    assert_eq!(hits.len(), 1);
    assert_eq!(hits[0].content_id, "p1");
    assert!(search_store.contains("search:river"));

    hx.producer
        .publish(EventPayload::PostDeleted(PostDeleted {
            content_id: "p1".to_string(),
            media_asset_ids: vec![],
        }))
        .await
        .unwrap();
    settled(&handle, 2).await;

    assert!(!search_store.contains("search:river"));
    assert!(search.search("river", None).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_listing_reflects_create_without_waiting_for_ttl() {
    let hx = harness();
    let (post_cache, post_store) = cache(&hx.clock);
    let posts = PostService::new(
        Arc::new(InMemoryDocumentStore::<ContentRecord>::new()),
        post_cache,
        hx.producer.clone(),
        RetryPolicy::no_retry(),
        hx.clock.clone(),
    );

    posts.create_post("u1", "first", vec![]).await.unwrap();
    assert_eq!(posts.list_posts(1, 10).await.unwrap().total_items, 1);
    assert!(post_store.contains("listing:1"));

    hx.clock.advance(chrono::Duration::seconds(1));
    posts.create_post("u1", "second", vec![]).await.unwrap();

    let listing = posts.list_posts(1, 10).await.unwrap();
    assert_eq!(listing.total_items, 2);
    assert_eq!(listing.items[0].body, "second");
}

#[tokio::test]
async fn test_cached_entry_expires_after_its_ttl() {
    let clock = Arc::new(ManualClock::default());
    let store = Arc::new(InMemoryCacheStore::new(clock.clone()));

    store
        .set_ex("resource:m1", "{}".to_string(), Duration::from_secs(3600))
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(3599));
    assert!(store.get("resource:m1").await.unwrap().is_some());

    clock.advance(chrono::Duration::seconds(1));
    assert!(store.get("resource:m1").await.unwrap().is_none());
}

#[tokio::test]
async fn test_post_delete_flows_to_every_consumer() {
    let hx = harness();

    let (post_cache, _) = cache(&hx.clock);
    let posts = PostService::new(
        Arc::new(InMemoryDocumentStore::<ContentRecord>::new()),
        post_cache,
        hx.producer.clone(),
        RetryPolicy::no_retry(),
        hx.clock.clone(),
    );

    let media_assets = Arc::new(InMemoryDocumentStore::<MediaAsset>::new());
    let (media_cache, media_store) = cache(&hx.clock);
    let media = MediaService::new(media_assets.clone(), media_cache.clone(), hx.clock.clone());
    let remote = Arc::new(ScriptedAssetStore::default());
    let media_handle = hx
        .consumer
        .subscribe(
            POST_DELETED,
            Arc::new(MediaCascadeHandler::new(
                media_assets.clone(),
                remote.clone(),
                media_cache,
            )),
        )
        .await
        .unwrap();

    let documents = Arc::new(InMemoryDocumentStore::<SearchDocument>::new());
    let (search_cache, _) = cache(&hx.clock);
    let search = SearchService::new(documents.clone(), search_cache.clone());
    let search_handle = hx
        .consumer
        .subscribe(
            "post.#",
            Arc::new(SearchProjection::new(
                documents,
                Arc::new(InMemoryProcessedEvents::new()),
                search_cache,
            )),
        )
        .await
        .unwrap();

    let photo = media.register_asset("u1", "remote-1", vec![]).await.unwrap();
    let post = posts
        .create_post("u1", "harbour at dusk", vec![photo.id.clone()])
        .await
        .unwrap();
    settled(&search_handle, 1).await;

    assert_eq!(media.get_asset(&photo.id).await.unwrap(), photo);
    assert!(media_store.contains(&format!("resource:{}", photo.id)));
    assert_eq!(search.search("harbour", None).await.unwrap().len(), 1);

    posts.delete_post(&post.id, "u1").await.unwrap();
    settled(&search_handle, 2).await;
    settled(&media_handle, 1).await;

    assert_eq!(remote.calls(), vec!["remote-1"]);
    assert!(media_assets.is_empty());
    assert!(!media_store.contains(&format!("resource:{}", photo.id)));
    assert!(media.get_asset(&photo.id).await.is_err());
    assert!(search.search("harbour", None).await.unwrap().is_empty());
    assert_eq!(hx.broker.rejected().len(), 0);

    media_handle.shutdown().await.unwrap();
    search_handle.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_redelivered_create_does_not_revive_deleted_post() {
    let hx = harness();
    let documents = Arc::new(InMemoryDocumentStore::<SearchDocument>::new());
    let (search_cache, _) = cache(&hx.clock);
    let search = SearchService::new(documents.clone(), search_cache.clone());

    let handle = hx
        .consumer
        .subscribe(
            "post.*",
            Arc::new(SearchProjection::new(
                documents.clone(),
                Arc::new(InMemoryProcessedEvents::new()),
                search_cache,
            )),
        )
        .await
        .unwrap();

    let created = EventPayload::PostCreated(PostCreated {
        content_id: "p1".to_string(),
        owner_id: "u1".to_string(),
        body: Some("lighthouse at noon".to_string()),
        created_at: None,
    });
    hx.producer.publish(created.clone()).await.unwrap();
    hx.producer
        .publish(EventPayload::PostDeleted(PostDeleted {
            content_id: "p1".to_string(),
            media_asset_ids: vec![],
        }))
        .await
        .unwrap();
    hx.producer.publish(created).await.unwrap();
    settled(&handle, 3).await;

    assert_eq!(handle.stats().acked(), 3);
    assert!(documents.is_empty());
    assert!(search.search("lighthouse", None).await.unwrap().is_empty());

    handle.shutdown().await.unwrap();
}
