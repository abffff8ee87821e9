use std::{
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use async_trait::async_trait;
use futures::FutureExt;
use thiserror::Error;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::event_types::{DomainEvent, EventError, EventResult};
use super::transport::{Delivery, DeliveryQueue, EventTransport};
use crate::clock::Clock;
use crate::domain::services::store::StoreError;

/// Failure reported by an event handler; the delivery is rejected without requeue
#[derive(Error, Debug)]
pub enum HandlerError {
    /// Business failure with a human readable reason
    #[error("{0}")]
    Failed(String),

    /// A local store operation failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Some media assets of a cascade could not be removed
    #[error("cascade incomplete, failed assets: {}", failed.join(", "))]
    CascadeIncomplete { failed: Vec<String> },
}

impl From<HandlerError> for EventError {
    fn from(err: HandlerError) -> Self {
        EventError::HandlerFailure(err.to_string())
    }
}

/// Trait for components that react to domain events
///
/// Implementations must be idempotent: the same event may be delivered more than once.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Name used in logs
    fn name(&self) -> &'static str;

    async fn handle(&self, event: &DomainEvent) -> Result<(), HandlerError>;
}

/// Settlement counters of one subscription; only acks/rejects the broker accepted count
#[derive(Debug, Default)]
pub struct SubscriptionStats {
    acked: AtomicU64,
    rejected: AtomicU64,
    settle_failures: AtomicU64,
}

impl SubscriptionStats {
    pub fn acked(&self) -> u64 {
        self.acked.load(Ordering::Relaxed)
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    /// Deliveries whose ack or reject failed; the broker redelivers or drops them
    pub fn settle_failures(&self) -> u64 {
        self.settle_failures.load(Ordering::Relaxed)
    }
}

/// Starts delivery loops for handlers on top of an `EventTransport`
#[derive(Clone)]
pub struct EventConsumer {
    transport: Arc<dyn EventTransport>,
    clock: Arc<dyn Clock>,
}

impl EventConsumer {
    pub fn new(transport: Arc<dyn EventTransport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Binds a fresh queue to `pattern` and starts a delivery loop for `handler`
    ///
    /// # Errors
    /// Returns `EventError::BrokerUnavailable` if the queue cannot be declared or bound
    pub async fn subscribe(
        &self,
        pattern: &str,
        handler: Arc<dyn EventHandler>,
    ) -> EventResult<SubscriptionHandle> {
        self.subscribe_many(&[pattern.to_string()], handler).await
    }

    /// Same as `subscribe` with one bind per pattern on a single queue
    pub async fn subscribe_many(
        &self,
        patterns: &[String],
        handler: Arc<dyn EventHandler>,
    ) -> EventResult<SubscriptionHandle> {
        self.transport.ensure_connected().await?;
        let queue = self.transport.bind_queue(patterns).await?;
        let queue_name = queue.name().to_string();

        info!(
            queue = %queue_name,
            patterns = ?patterns,
            handler = handler.name(),
            "subscription started"
        );

        let stats = Arc::new(SubscriptionStats::default());
        let cancel = CancellationToken::new();
        let delivery_loop = DeliveryLoop {
            queue,
            handler,
            stats: Arc::clone(&stats),
            clock: Arc::clone(&self.clock),
        };
        let join = tokio::spawn(delivery_loop.run(cancel.clone()));

        Ok(SubscriptionHandle {
            queue_name,
            stats,
            cancel,
            join,
        })
    }
}

/// Handle to a running subscription
pub struct SubscriptionHandle {
    queue_name: String,
    stats: Arc<SubscriptionStats>,
    cancel: CancellationToken,
    join: JoinHandle<EventResult<()>>,
}

impl SubscriptionHandle {
    pub fn queue_name(&self) -> &str {
        &self.queue_name
    }

    pub fn stats(&self) -> &SubscriptionStats {
        &self.stats
    }

    /// Token that stops the loop when cancelled, for use from other tasks
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Stops the loop after the delivery in progress, if any, was settled
    pub async fn shutdown(self) -> EventResult<()> {
        self.cancel.cancel();
        self.wait().await
    }

    /// Waits for the loop to end on its own
    ///
    /// # Errors
    /// Returns `EventError::SubscriptionClosed` when the delivery stream ended
    pub async fn wait(self) -> EventResult<()> {
        match self.join.await {
            Ok(result) => result,
            Err(err) => Err(EventError::SubscriptionClosed(format!(
                "{} ({})",
                self.queue_name, err
            ))),
        }
    }
}

struct DeliveryLoop {
    queue: Box<dyn DeliveryQueue>,
    handler: Arc<dyn EventHandler>,
    stats: Arc<SubscriptionStats>,
    clock: Arc<dyn Clock>,
}

impl DeliveryLoop {
    async fn run(mut self, cancel: CancellationToken) -> EventResult<()> {
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                delivery = self.queue.next() => Some(delivery),
            };

            match next {
                None => {
                    info!(queue = self.queue.name(), "subscription cancelled");
                    return Ok(());
                }
                Some(None) => {
                    warn!(queue = self.queue.name(), "delivery stream ended");
                    return Err(EventError::SubscriptionClosed(self.queue.name().to_string()));
                }
                Some(Some(delivery)) => {
                    self.process(delivery).await;
                }
            }
        }
    }

    async fn process(&mut self, delivery: Delivery) {
        let event = match DomainEvent::from_delivery(
            &delivery.routing_key,
            &delivery.body,
            delivery.timestamp,
            self.clock.now(),
        ) {
            Ok(event) => event,
            Err(err) => {
                warn!(
                    queue = self.queue.name(),
                    routing_key = %delivery.routing_key,
                    payload = %String::from_utf8_lossy(&delivery.body),
                    "rejecting undecodable message: {}",
                    err
                );
                return self.settle(&delivery, false).await;
            }
        };

        let outcome = AssertUnwindSafe(self.handler.handle(&event))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(())) => {
                debug!(
                    queue = self.queue.name(),
                    idempotency_key = %event.idempotency_key(),
                    redelivered = delivery.redelivered,
                    "event handled"
                );
                self.settle(&delivery, true).await
            }
            Ok(Err(err)) => {
                error!(
                    queue = self.queue.name(),
                    handler = self.handler.name(),
                    routing_key = %delivery.routing_key,
                    idempotency_key = %event.idempotency_key(),
                    payload = %String::from_utf8_lossy(&delivery.body),
                    "handler failed, rejecting message: {}",
                    err
                );
                self.settle(&delivery, false).await
            }
            Err(_) => {
                error!(
                    queue = self.queue.name(),
                    handler = self.handler.name(),
                    routing_key = %delivery.routing_key,
                    payload = %String::from_utf8_lossy(&delivery.body),
                    "handler panicked, rejecting message"
                );
                self.settle(&delivery, false).await
            }
        }
    }

    async fn settle(&mut self, delivery: &Delivery, success: bool) {
        let (result, counter) = if success {
            (self.queue.ack(delivery).await, &self.stats.acked)
        } else {
            (self.queue.reject(delivery).await, &self.stats.rejected)
        };

        match result {
            Ok(()) => {
                counter.fetch_add(1, Ordering::Relaxed);
            }
            // The stream ends right after if the channel is gone.
            Err(err) => {
                self.stats.settle_failures.fetch_add(1, Ordering::Relaxed);
                error!(
                    queue = self.queue.name(),
                    delivery_tag = delivery.delivery_tag,
                    ack = success,
                    "failed to settle delivery: {}",
                    err
                );
            }
        }
    }
}
