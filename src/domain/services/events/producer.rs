use std::{future::Future, sync::Arc, time::Duration};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::event_types::{DomainEvent, EventPayload, EventResult};
use super::transport::{EventTransport, PublishMetadata};
use crate::clock::Clock;

/// Emits domain events after a local write committed
///
/// The producer never retries: a `BrokerUnavailable` failure is returned to the
/// caller, which decides whether to retry (see `RetryPolicy`).
#[derive(Clone)]
pub struct EventProducer {
    transport: Arc<dyn EventTransport>,
    clock: Arc<dyn Clock>,
}

impl EventProducer {
    pub fn new(transport: Arc<dyn EventTransport>, clock: Arc<dyn Clock>) -> Self {
        Self { transport, clock }
    }

    /// Publishes `payload` under its routing key
    ///
    /// Returns once the broker accepted the message; there is no consumer confirmation.
    ///
    /// # Errors
    /// * `EventError::BrokerUnavailable` - no connection could be established
    /// * `EventError::Encode` - the payload could not be serialized
    pub async fn publish(&self, payload: EventPayload) -> EventResult<DomainEvent> {
        self.publish_event(DomainEvent::new(payload, self.clock.now()))
            .await
    }

    /// Publishes an already stamped event
    pub async fn publish_event(&self, event: DomainEvent) -> EventResult<DomainEvent> {
        let body = event.payload.encode()?;
        let metadata = PublishMetadata {
            message_id: Uuid::new_v4().to_string(),
            request_id: Uuid::new_v4().to_string(),
            timestamp: u64::try_from(event.emitted_at.timestamp()).unwrap_or_default(),
        };
        let message_id = metadata.message_id.clone();

        self.transport
            .publish(event.routing_key(), body, metadata)
            .await?;

        debug!(
            routing_key = event.routing_key(),
            idempotency_key = %event.idempotency_key(),
            message_id = %message_id,
            "event published"
        );

        Ok(event)
    }
}

/// Caller-side retry with exponential backoff for transient broker failures
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    /// `attempts` counts the first try; zero is treated as one
    pub fn new(attempts: u32, base_delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            base_delay,
        }
    }

    pub fn no_retry() -> Self {
        Self::new(1, Duration::ZERO)
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Delay before retry number `retry` (1-based): base, 2*base, 4*base...
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry.saturating_sub(1));
        self.base_delay.saturating_mul(factor)
    }

    /// Runs `op` until it succeeds, fails permanently or attempts run out
    pub async fn run<T, F, Fut>(&self, mut op: F) -> EventResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = EventResult<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_transient() && attempt < self.attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        "transient broker failure, retrying: {}",
                        err
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new(3, Duration::from_millis(200))
    }
}

/// Publishes through `producer`, retrying transient failures according to `policy`
pub async fn publish_with_retry(
    producer: &EventProducer,
    payload: EventPayload,
    policy: &RetryPolicy,
) -> EventResult<DomainEvent> {
    let event = DomainEvent::new(payload, producer.clock.now());
    let published = policy
        .run(|| producer.publish_event(event.clone()))
        .await?;

    info!(
        routing_key = published.routing_key(),
        entity_id = published.payload.entity_id(),
        "event emitted"
    );

    Ok(published)
}
