use std::{sync::Arc, time::Duration};

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use rabbitmq::BrokerConnection;
use tracing::{info, warn};

use content_sync::{
    AssetStore, AssetStoreError, CacheTtls, Clock, Config, ContentRecord, EventConsumer,
    EventProducer, EventTransport, MediaAsset, MediaCascadeHandler, MediaService, PostService,
    ReadThroughCache, SearchDocument, SearchProjection, SearchService, SubscriptionHandle,
    SystemClock,
    domain::services::events::{POST_CREATED, POST_DELETED},
    outbounds::{
        http_asset_store::{HttpAssetStore, UnconfiguredAssetStore},
        in_memory_broker::InMemoryBroker,
        in_memory_cache::InMemoryCacheStore,
        in_memory_ledger::InMemoryProcessedEvents,
        in_memory_store::InMemoryDocumentStore,
        rabbit_transport::RabbitTransport,
    },
};

#[derive(Parser, Debug)]
#[command(author, version, about = "Event propagation and cache consistency services")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Keep the search projection in sync with post events
    SearchConsumer,
    /// Remove media assets of deleted posts
    MediaConsumer,
    /// Run the whole flow against the in-memory broker
    Demo,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match args.command {
        Command::Demo => Config::try_from_env().unwrap_or_default(),
        _ => Config::try_from_env().context("failed to load configuration")?,
    };

    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .init();

    match args.command {
        Command::SearchConsumer => run_search_consumer(&config).await,
        Command::MediaConsumer => run_media_consumer(&config).await,
        Command::Demo => run_demo(&config).await,
    }
}

fn local_cache(config: &Config, clock: &Arc<dyn Clock>) -> ReadThroughCache {
    ReadThroughCache::new(
        Arc::new(InMemoryCacheStore::new(clock.clone())),
        config.cache_ttls(),
    )
}

/// Runs until ctrl-c or until the subscription loses its connection
///
/// A lost connection is returned as an error so the process exits non-zero and the
/// supervisor restarts it with a fresh queue.
async fn run_until_stopped(broker: &BrokerConnection, handle: SubscriptionHandle) -> Result<()> {
    let stop = handle.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("ctrl-c received, shutting down");
            stop.cancel();
        }
    });

    let result = handle.wait().await;
    if let Err(err) = broker.close().await {
        warn!("error while closing rabbitmq connection: {}", err);
    }
    result.context("subscription ended")
}

async fn run_search_consumer(config: &Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker = Arc::new(BrokerConnection::new(
        &config.rabbit_url,
        &config.app_id,
        &config.exchange,
    ));
    let transport = Arc::new(RabbitTransport::new(broker.clone()));

    let documents = Arc::new(InMemoryDocumentStore::<SearchDocument>::new());
    let projection = Arc::new(SearchProjection::new(
        documents,
        Arc::new(InMemoryProcessedEvents::new()),
        local_cache(config, &clock),
    ));

    let consumer = EventConsumer::new(transport, clock);
    let handle = consumer
        .subscribe_many(
            &[POST_CREATED.to_string(), POST_DELETED.to_string()],
            projection,
        )
        .await
        .context("failed to start search consumer")?;

    info!(queue = handle.queue_name(), "search consumer running");
    run_until_stopped(&broker, handle).await
}

async fn run_media_consumer(config: &Config) -> Result<()> {
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker = Arc::new(BrokerConnection::new(
        &config.rabbit_url,
        &config.app_id,
        &config.exchange,
    ));
    let transport = Arc::new(RabbitTransport::new(broker.clone()));

    let remote: Arc<dyn AssetStore> = match &config.asset_store_url {
        Some(url) => Arc::new(HttpAssetStore::new(url)),
        None => {
            warn!("ASSET_STORE_URL not set, every cascade will fail");
            Arc::new(UnconfiguredAssetStore)
        }
    };

    let assets = Arc::new(InMemoryDocumentStore::<MediaAsset>::new());
    let cascade = Arc::new(MediaCascadeHandler::new(
        assets,
        remote,
        local_cache(config, &clock),
    ));

    let consumer = EventConsumer::new(transport, clock);
    let handle = consumer
        .subscribe(POST_DELETED, cascade)
        .await
        .context("failed to start media consumer")?;

    info!(queue = handle.queue_name(), "media consumer running");
    run_until_stopped(&broker, handle).await
}

/// Asset store for the demo: records deletions instead of calling a remote service
#[derive(Debug, Default)]
struct DemoAssetStore;

#[async_trait]
impl AssetStore for DemoAssetStore {
    async fn delete_asset(&self, remote_asset_id: &str) -> Result<(), AssetStoreError> {
        info!(remote_asset_id, "demo asset store: asset deleted");
        Ok(())
    }
}

async fn wait_until_settled(handle: &SubscriptionHandle, expected: u64) {
    for _ in 0..100 {
        let stats = handle.stats();
        if stats.acked() + stats.rejected() >= expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    warn!(queue = handle.queue_name(), "gave up waiting for deliveries");
}

async fn run_demo(config: &Config) -> Result<()> {
    info!("Starting in-memory demo");

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let broker = InMemoryBroker::new();
    let transport: Arc<dyn EventTransport> = Arc::new(broker.clone());
    let ttls: CacheTtls = config.cache_ttls();

    // Content service
    let posts = PostService::new(
        Arc::new(InMemoryDocumentStore::<ContentRecord>::new()),
        local_cache(config, &clock),
        EventProducer::new(transport.clone(), clock.clone()),
        config.retry_policy(),
        clock.clone(),
    );

    // Media service; the cascade shares its store and cache
    let media_assets = Arc::new(InMemoryDocumentStore::<MediaAsset>::new());
    let media_cache = ReadThroughCache::new(
        Arc::new(InMemoryCacheStore::new(clock.clone())),
        ttls,
    );
    let media = MediaService::new(media_assets.clone(), media_cache.clone(), clock.clone());
    let cascade = Arc::new(MediaCascadeHandler::new(
        media_assets,
        Arc::new(DemoAssetStore),
        media_cache,
    ));

    // Search service; projection and queries share the store and cache
    let search_documents = Arc::new(InMemoryDocumentStore::<SearchDocument>::new());
    let search_cache = local_cache(config, &clock);
    let projection = Arc::new(SearchProjection::new(
        search_documents.clone(),
        Arc::new(InMemoryProcessedEvents::new()),
        search_cache.clone(),
    ));
    let search = SearchService::new(search_documents, search_cache);

    let consumer = EventConsumer::new(transport, clock);
    let search_handle = consumer
        .subscribe_many(
            &[POST_CREATED.to_string(), POST_DELETED.to_string()],
            projection,
        )
        .await?;
    let media_handle = consumer.subscribe(POST_DELETED, cascade).await?;

    let photo = media.register_asset("u1", "remote-photo-1", vec![]).await?;
    let post = posts
        .create_post("u1", "Sunset over the harbour", vec![photo.id.clone()])
        .await?;
    wait_until_settled(&search_handle, 1).await;

    let page = posts.list_posts(1, 10).await?;
    info!(total_posts = page.total_items, "listing after create");
    let hits = search.search("sunset", None).await?;
    info!(hits = hits.len(), "search for 'sunset' after create");

    posts.delete_post(&post.id, "u1").await?;
    wait_until_settled(&search_handle, 2).await;
    wait_until_settled(&media_handle, 1).await;

    let hits = search.search("sunset", None).await?;
    info!(hits = hits.len(), "search for 'sunset' after delete");
    let assets = media.list_assets(1, 10).await?;
    info!(total_assets = assets.total_items, "media assets after delete");

    info!(
        published = broker.published().len(),
        acked = broker.acked().len(),
        rejected = broker.rejected().len(),
        "demo finished"
    );

    search_handle.shutdown().await?;
    media_handle.shutdown().await?;
    Ok(())
}
