// Expose the modules
pub mod clock;
pub mod config;
pub mod domain;
pub mod outbounds;

// Re-export key types for easier usage
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, ConfigError};
pub use domain::models::types::{
    ContentRecord, DEFAULT_PAGE_SIZE, Listing, MediaAsset, SearchDocument,
};
pub use domain::services::cache::{CacheError, CacheKey, CacheStore, CacheTtls, ReadThroughCache};
pub use domain::services::events::{
    Delivery, DeliveryQueue, DomainEvent, EventConsumer, EventError, EventHandler, EventPayload,
    EventProducer, EventResult, EventTransport, HandlerError, IdempotencyKey, PostCreated,
    PostDeleted, ProcessedEvents, RetryPolicy, SubscriptionHandle,
};
pub use domain::services::media::{
    AssetStore, AssetStoreError, CascadeReport, MediaCascadeHandler, MediaService,
    MediaServiceError,
};
pub use domain::services::posts::{PostService, PostServiceError};
pub use domain::services::search::{SearchProjection, SearchService};
pub use domain::services::store::{DocumentFilter, DocumentStore, StoreError};
