//--------------------------------------------------------------------------------------------------
// STRUCTS & ENUMS
//--------------------------------------------------------------------------------------------------
// | Name                    | Description                                       | Key Methods       |
// |-------------------------|---------------------------------------------------|-------------------|
// | DomainEvent             | Immutable event: payload plus emission time       | routing_key       |
// | EventPayload            | Tagged union of every payload the system emits    | decode, encode    |
// | PostCreated             | `post.created` payload                            |                   |
// | PostDeleted             | `post.deleted` payload                            |                   |
// | IdempotencyKey          | (routing key, entity id) pair used by consumers   | display           |
// | EventError              | Error types for event propagation                 | is_transient      |
//--------------------------------------------------------------------------------------------------

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::services::cache::CacheError;

/// Routing key emitted after a post was created
pub const POST_CREATED: &str = "post.created";

/// Routing key emitted after a post was deleted
pub const POST_DELETED: &str = "post.deleted";

/// Errors that can occur while propagating events
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// The broker connection or channel cannot be established
    #[error("Broker unavailable: {0}")]
    BrokerUnavailable(String),

    /// A payload does not match the shape of its routing key
    #[error("Failed to decode {routing_key} payload: {reason}")]
    Decode { routing_key: String, reason: String },

    /// A handler reported a business failure
    #[error("Handler failure: {0}")]
    HandlerFailure(String),

    /// The cache store is unreachable
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(String),

    /// A payload could not be serialized
    #[error("Failed to encode event: {0}")]
    Encode(String),

    /// A subscription was requested without any routing pattern
    #[error("Invalid routing pattern: {0}")]
    InvalidPattern(String),

    /// Acknowledging or rejecting a delivery failed
    #[error("Failed to settle delivery: {0}")]
    Settle(String),

    /// The delivery stream of a subscription ended
    #[error("Subscription on queue {0} was closed")]
    SubscriptionClosed(String),
}

impl EventError {
    /// True when retrying the same operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, EventError::BrokerUnavailable(_))
    }
}

impl From<CacheError> for EventError {
    fn from(err: CacheError) -> Self {
        EventError::CacheUnavailable(err.to_string())
    }
}

impl From<rabbitmq::RabbitMQError> for EventError {
    fn from(err: rabbitmq::RabbitMQError) -> Self {
        use rabbitmq::RabbitMQError;

        match err {
            RabbitMQError::MissingTopic => EventError::InvalidPattern(err.to_string()),
            RabbitMQError::AckMessageError(_)
            | RabbitMQError::RejectMessageError(_)
            | RabbitMQError::NotDeliveryTag => EventError::Settle(err.to_string()),
            other => EventError::BrokerUnavailable(other.to_string()),
        }
    }
}

/// Type alias for Result with EventError
pub type EventResult<T> = Result<T, EventError>;

/// Payload of `post.created`
///
/// `body` and `createdAt` are optional extras used by the search projection;
/// consumers that only need identifiers ignore them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostCreated {
    pub content_id: String,
    pub owner_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
}

/// Payload of `post.deleted`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PostDeleted {
    pub content_id: String,
    pub media_asset_ids: Vec<String>,
}

/// Every payload the system emits, keyed by routing key
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    PostCreated(PostCreated),
    PostDeleted(PostDeleted),
}

impl EventPayload {
    pub fn routing_key(&self) -> &'static str {
        match self {
            EventPayload::PostCreated(_) => POST_CREATED,
            EventPayload::PostDeleted(_) => POST_DELETED,
        }
    }

    /// Id of the entity the event is about
    pub fn entity_id(&self) -> &str {
        match self {
            EventPayload::PostCreated(payload) => &payload.content_id,
            EventPayload::PostDeleted(payload) => &payload.content_id,
        }
    }

    /// Serializes the payload into a UTF-8 JSON object
    pub fn encode(&self) -> EventResult<Vec<u8>> {
        let encoded = match self {
            EventPayload::PostCreated(payload) => serde_json::to_vec(payload),
            EventPayload::PostDeleted(payload) => serde_json::to_vec(payload),
        };

        encoded.map_err(|err| EventError::Encode(err.to_string()))
    }

    /// Parses and validates a payload against the shape of its routing key
    ///
    /// # Arguments
    /// * `routing_key` - Transport routing key the payload arrived with
    /// * `body` - Raw message content
    ///
    /// # Errors
    /// Returns `EventError::Decode` for unknown routing keys, malformed JSON,
    /// missing required fields and empty identifiers
    pub fn decode(routing_key: &str, body: &[u8]) -> EventResult<EventPayload> {
        let decode_err = |reason: String| EventError::Decode {
            routing_key: routing_key.to_string(),
            reason,
        };

        let payload = match routing_key {
            POST_CREATED => {
                let payload: PostCreated =
                    serde_json::from_slice(body).map_err(|err| decode_err(err.to_string()))?;
                if payload.owner_id.trim().is_empty() {
                    return Err(decode_err("ownerId must not be empty".to_string()));
                }
                EventPayload::PostCreated(payload)
            }
            POST_DELETED => {
                let payload: PostDeleted =
                    serde_json::from_slice(body).map_err(|err| decode_err(err.to_string()))?;
                if payload.media_asset_ids.iter().any(|id| id.trim().is_empty()) {
                    return Err(decode_err("mediaAssetIds must not contain empty ids".to_string()));
                }
                EventPayload::PostDeleted(payload)
            }
            other => return Err(decode_err(format!("unknown routing key {}", other))),
        };

        if payload.entity_id().trim().is_empty() {
            return Err(decode_err("contentId must not be empty".to_string()));
        }

        Ok(payload)
    }
}

/// An immutable domain event
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DomainEvent {
    pub payload: EventPayload,
    pub emitted_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(payload: EventPayload, emitted_at: DateTime<Utc>) -> Self {
        Self {
            payload,
            emitted_at,
        }
    }

    pub fn routing_key(&self) -> &'static str {
        self.payload.routing_key()
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        IdempotencyKey::new(self.routing_key(), self.payload.entity_id())
    }

    /// Rebuilds an event from a delivery; a missing timestamp falls back to `received_at`
    pub fn from_delivery(
        routing_key: &str,
        body: &[u8],
        timestamp: Option<u64>,
        received_at: DateTime<Utc>,
    ) -> EventResult<DomainEvent> {
        let payload = EventPayload::decode(routing_key, body)?;
        let emitted_at = timestamp
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(|secs| Utc.timestamp_opt(secs, 0).single())
            .unwrap_or(received_at);

        Ok(DomainEvent::new(payload, emitted_at))
    }
}

/// Key under which consumers treat repeated deliveries as the same event
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdempotencyKey {
    pub routing_key: String,
    pub entity_id: String,
}

impl IdempotencyKey {
    pub fn new(routing_key: &str, entity_id: &str) -> Self {
        Self {
            routing_key: routing_key.to_string(),
            entity_id: entity_id.to_string(),
        }
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.routing_key, self.entity_id)
    }
}
