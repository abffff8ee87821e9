use async_trait::async_trait;

use super::event_types::EventResult;

/// Metadata attached to every published message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishMetadata {
    pub message_id: String,
    pub request_id: String,
    /// Seconds since the unix epoch
    pub timestamp: u64,
}

/// A message handed to a consumer, pending ack or reject
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub delivery_tag: u64,
    pub routing_key: String,
    pub body: Vec<u8>,
    pub redelivered: bool,
    pub message_id: Option<String>,
    pub timestamp: Option<u64>,
}

/// Outbound port to the message broker
///
/// Implementations share one connection per process. Any operation that cannot reach
/// the broker fails with `EventError::BrokerUnavailable`.
#[async_trait]
pub trait EventTransport: Send + Sync {
    /// Establishes the connection if needed; idempotent
    async fn ensure_connected(&self) -> EventResult<()>;

    /// Publishes raw bytes to the topic exchange under `routing_key`
    async fn publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        metadata: PublishMetadata,
    ) -> EventResult<()>;

    /// Declares an exclusive, auto-deleting queue bound once per pattern
    async fn bind_queue(&self, patterns: &[String]) -> EventResult<Box<dyn DeliveryQueue>>;
}

/// Consumer side of one bound queue
#[async_trait]
pub trait DeliveryQueue: Send {
    fn name(&self) -> &str;

    /// Next delivery in FIFO order, or None once the queue is gone
    async fn next(&mut self) -> Option<Delivery>;

    async fn ack(&mut self, delivery: &Delivery) -> EventResult<()>;

    /// Rejects without requeue; the broker discards the message
    async fn reject(&mut self, delivery: &Delivery) -> EventResult<()>;
}

/// AMQP topic matching: `*` matches exactly one word, `#` matches zero or more words
pub fn topic_matches(pattern: &str, routing_key: &str) -> bool {
    let pattern: Vec<&str> = pattern.split('.').collect();
    let key: Vec<&str> = routing_key.split('.').collect();
    match_words(&pattern, &key)
}

fn match_words(pattern: &[&str], key: &[&str]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some((&"#", rest)) => (0..=key.len()).any(|skip| match_words(rest, &key[skip..])),
        Some((&word, rest)) => match key.split_first() {
            Some((first, key_rest)) if word == "*" || word == *first => match_words(rest, key_rest),
            _ => false,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::topic_matches;

    #[test]
    fn test_exact_keys_match() {
        assert!(topic_matches("post.deleted", "post.deleted"));
        assert!(!topic_matches("post.deleted", "post.created"));
        assert!(!topic_matches("post", "post.created"));
    }

    #[test]
    fn test_star_matches_exactly_one_word() {
        assert!(topic_matches("post.*", "post.created"));
        assert!(topic_matches("*.deleted", "post.deleted"));
        assert!(!topic_matches("post.*", "post"));
        assert!(!topic_matches("post.*", "post.media.deleted"));
    }

    #[test]
    fn test_hash_matches_zero_or_more_words() {
        assert!(topic_matches("#", "post.created"));
        assert!(topic_matches("post.#", "post"));
        assert!(topic_matches("post.#", "post.media.deleted"));
        assert!(topic_matches("#.deleted", "post.deleted"));
        assert!(topic_matches("post.#.deleted", "post.deleted"));
        assert!(!topic_matches("media.#", "post.deleted"));
    }
}
