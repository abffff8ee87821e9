use std::sync::Arc;

use async_trait::async_trait;
use rabbitmq::{BrokerConnection, Message, Publisher, PublisherContext, Subscription};
use tracing::{debug, warn};

use crate::domain::services::events::{
    Delivery, DeliveryQueue, EventResult, EventTransport, PublishMetadata,
};

/// `EventTransport` over the process-wide RabbitMQ connection
pub struct RabbitTransport {
    broker: Arc<BrokerConnection>,
    publisher: Publisher,
}

impl RabbitTransport {
    pub fn new(broker: Arc<BrokerConnection>) -> Self {
        let publisher = broker.publisher();
        Self { broker, publisher }
    }

    pub fn connection(&self) -> &Arc<BrokerConnection> {
        &self.broker
    }
}

#[async_trait]
impl EventTransport for RabbitTransport {
    async fn ensure_connected(&self) -> EventResult<()> {
        self.broker.ensure_connected().await?;
        Ok(())
    }

    async fn publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        metadata: PublishMetadata,
    ) -> EventResult<()> {
        let ctx = PublisherContext::new(&metadata.request_id, Some(metadata.message_id))
            .with_timestamp(metadata.timestamp);
        let message = Message::new(body, Some(routing_key.to_string()));

        self.publisher.publish(message, ctx).await?;
        Ok(())
    }

    async fn bind_queue(&self, patterns: &[String]) -> EventResult<Box<dyn DeliveryQueue>> {
        let subscription = self.broker.subscribe(patterns).await?;
        Ok(Box::new(RabbitQueue { subscription }))
    }
}

/// Exclusive RabbitMQ queue consumed with manual acknowledgements
pub struct RabbitQueue {
    subscription: Subscription,
}

#[async_trait]
impl DeliveryQueue for RabbitQueue {
    fn name(&self) -> &str {
        self.subscription.queue_name()
    }

    async fn next(&mut self) -> Option<Delivery> {
        loop {
            let mut message = self.subscription.receive().await?;

            let Some(deliver) = message.deliver.as_ref() else {
                warn!(
                    queue = self.subscription.queue_name(),
                    "skipping consumer message without delivery information"
                );
                continue;
            };

            let (message_id, timestamp) = match message.basic_properties.as_ref() {
                Some(props) => (props.message_id().cloned(), props.timestamp()),
                None => (None, None),
            };

            debug!(
                queue = self.subscription.queue_name(),
                delivery_tag = deliver.delivery_tag(),
                routing_key = %deliver.routing_key(),
                "message received"
            );

            let delivery_tag = deliver.delivery_tag();
            let routing_key = deliver.routing_key().to_string();
            let redelivered = deliver.redelivered();

            return Some(Delivery {
                delivery_tag,
                routing_key,
                body: message.content.take().unwrap_or_default(),
                redelivered,
                message_id,
                timestamp,
            });
        }
    }

    async fn ack(&mut self, delivery: &Delivery) -> EventResult<()> {
        self.subscription.ack_tag(delivery.delivery_tag).await?;
        Ok(())
    }

    async fn reject(&mut self, delivery: &Delivery) -> EventResult<()> {
        self.subscription.reject_tag(delivery.delivery_tag).await?;
        Ok(())
    }
}
