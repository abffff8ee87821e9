//--------------------------------------------------------------------------------------------------
// MODULE OVERVIEW
//--------------------------------------------------------------------------------------------------
// This module implements asynchronous event propagation between services. Writes publish
// domain events to a single topic exchange; dependent services consume them idempotently
// from their own exclusive queues.
//
// | Component                | Description                                                |
// |--------------------------|------------------------------------------------------------|
// | DomainEvent              | Immutable event with a tagged-union payload                |
// | EventTransport           | Outbound port to the broker (publish, bind queue)          |
// | DeliveryQueue            | One bound queue: next delivery, ack, reject                |
// | EventProducer            | Publishes events after a local write committed             |
// | RetryPolicy              | Caller-side exponential backoff for transient failures     |
// | EventHandler             | Trait for components that can handle events                |
// | EventConsumer            | Runs one delivery loop per subscription                    |
// | ProcessedEvents          | Ledger of idempotency keys a consumer already applied      |
//--------------------------------------------------------------------------------------------------

mod consumer;
mod event_types;
mod idempotence;
mod producer;
mod transport;


// Re-exports
pub use consumer::{
    EventConsumer, EventHandler, HandlerError, SubscriptionHandle, SubscriptionStats,
};
pub use event_types::{
    DomainEvent, EventError, EventPayload, EventResult, IdempotencyKey, POST_CREATED,
    POST_DELETED, PostCreated, PostDeleted,
};
pub use idempotence::ProcessedEvents;
pub use producer::{EventProducer, RetryPolicy, publish_with_retry};
pub use transport::{Delivery, DeliveryQueue, EventTransport, PublishMetadata, topic_matches};
