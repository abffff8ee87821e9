//! In-process topic exchange implementing the transport ports.
//!
//! Mirrors what the services rely on from RabbitMQ: topic routing, one copy per queue,
//! FIFO per queue, exclusive auto-deleting queues and explicit ack/reject. Used by the
//! `demo` command and by tests.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tracing::{debug, info, warn};

use crate::domain::services::events::{
    Delivery, DeliveryQueue, EventError, EventResult, EventTransport, PublishMetadata,
    topic_matches,
};

/// A message as it was handed to the exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PublishedMessage {
    pub routing_key: String,
    pub body: Vec<u8>,
    pub metadata: PublishMetadata,
}

#[derive(Debug)]
struct QueueState {
    patterns: Vec<String>,
    sender: UnboundedSender<Delivery>,
    unacked: HashMap<u64, Delivery>,
}

#[derive(Debug, Default)]
struct BrokerState {
    connection_open: bool,
    connections_opened: usize,
    next_queue_id: u64,
    next_delivery_tag: u64,
    queues: HashMap<String, QueueState>,
    published: Vec<PublishedMessage>,
    acked: Vec<Delivery>,
    rejected: Vec<Delivery>,
}

#[derive(Debug)]
struct Shared {
    reachable: AtomicBool,
    state: Mutex<BrokerState>,
}

/// Topic exchange living in process memory
#[derive(Debug, Clone)]
pub struct InMemoryBroker {
    shared: Arc<Shared>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                reachable: AtomicBool::new(true),
                state: Mutex::new(BrokerState::default()),
            }),
        }
    }

    /// Drops the connection and every queue; operations fail until `reconnect()`
    pub fn disconnect(&self) {
        self.shared.reachable.store(false, Ordering::SeqCst);
        let mut state = self.shared.state.lock();
        state.connection_open = false;
        // Exclusive queues die with their connection; dropping the senders ends every stream.
        state.queues.clear();
        warn!("in-memory broker disconnected");
    }

    /// Makes the broker reachable again; the next `ensure_connected()` opens a new connection
    pub fn reconnect(&self) {
        self.shared.reachable.store(true, Ordering::SeqCst);
        info!("in-memory broker reachable again");
    }

    pub fn is_connected(&self) -> bool {
        self.shared.state.lock().connection_open
    }

    pub fn connections_opened(&self) -> usize {
        self.shared.state.lock().connections_opened
    }

    pub fn queue_count(&self) -> usize {
        self.shared.state.lock().queues.len()
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.shared.state.lock().published.clone()
    }

    pub fn acked(&self) -> Vec<Delivery> {
        self.shared.state.lock().acked.clone()
    }

    /// Deliveries rejected without requeue, in rejection order
    pub fn rejected(&self) -> Vec<Delivery> {
        self.shared.state.lock().rejected.clone()
    }

    /// Deliveries handed out and not yet settled, across all queues
    pub fn unacked_count(&self) -> usize {
        self.shared
            .state
            .lock()
            .queues
            .values()
            .map(|queue| queue.unacked.len())
            .sum()
    }

    fn check_reachable(&self) -> EventResult<()> {
        if self.shared.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(EventError::BrokerUnavailable(
                "in-memory broker is disconnected".to_string(),
            ))
        }
    }

    fn open_connection(&self, state: &mut BrokerState) -> EventResult<()> {
        self.check_reachable()?;
        if !state.connection_open {
            state.connection_open = true;
            state.connections_opened += 1;
            debug!(
                connections_opened = state.connections_opened,
                "in-memory broker connection opened"
            );
        }
        Ok(())
    }
}

impl Default for InMemoryBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EventTransport for InMemoryBroker {
    async fn ensure_connected(&self) -> EventResult<()> {
        let mut state = self.shared.state.lock();
        self.open_connection(&mut state)
    }

    async fn publish(
        &self,
        routing_key: &str,
        body: Vec<u8>,
        metadata: PublishMetadata,
    ) -> EventResult<()> {
        let mut state = self.shared.state.lock();
        self.open_connection(&mut state)?;

        let BrokerState {
            queues,
            next_delivery_tag,
            published,
            ..
        } = &mut *state;

        for (queue_name, queue) in queues.iter_mut() {
            if !queue
                .patterns
                .iter()
                .any(|pattern| topic_matches(pattern, routing_key))
            {
                continue;
            }

            *next_delivery_tag += 1;
            let delivery = Delivery {
                delivery_tag: *next_delivery_tag,
                routing_key: routing_key.to_string(),
                body: body.clone(),
                redelivered: false,
                message_id: Some(metadata.message_id.clone()),
                timestamp: Some(metadata.timestamp),
            };

            if queue.sender.send(delivery.clone()).is_ok() {
                queue.unacked.insert(delivery.delivery_tag, delivery);
            } else {
                debug!(queue = %queue_name, "consumer gone, message dropped");
            }
        }

        published.push(PublishedMessage {
            routing_key: routing_key.to_string(),
            body,
            metadata,
        });

        Ok(())
    }

    async fn bind_queue(&self, patterns: &[String]) -> EventResult<Box<dyn DeliveryQueue>> {
        if patterns.is_empty() {
            return Err(EventError::InvalidPattern(
                "at least one routing pattern is required".to_string(),
            ));
        }

        let mut state = self.shared.state.lock();
        self.open_connection(&mut state)?;

        state.next_queue_id += 1;
        let name = format!("amq.gen-{}", state.next_queue_id);
        let (sender, receiver) = unbounded_channel();

        state.queues.insert(
            name.clone(),
            QueueState {
                patterns: patterns.to_vec(),
                sender,
                unacked: HashMap::new(),
            },
        );

        debug!(queue = %name, patterns = ?patterns, "in-memory queue bound");

        Ok(Box::new(InMemoryQueue {
            name,
            receiver,
            shared: Arc::clone(&self.shared),
        }))
    }
}

/// Consumer end of an in-memory queue; the queue is deleted when this is dropped
pub struct InMemoryQueue {
    name: String,
    receiver: UnboundedReceiver<Delivery>,
    shared: Arc<Shared>,
}

impl InMemoryQueue {
    fn settle(&self, delivery: &Delivery, ack: bool) -> EventResult<()> {
        let mut state = self.shared.state.lock();
        let Some(queue) = state.queues.get_mut(&self.name) else {
            return Err(EventError::BrokerUnavailable(format!(
                "queue {} no longer exists",
                self.name
            )));
        };

        let Some(settled) = queue.unacked.remove(&delivery.delivery_tag) else {
            return Err(EventError::Settle(format!(
                "unknown delivery tag {} on queue {}",
                delivery.delivery_tag, self.name
            )));
        };

        if ack {
            state.acked.push(settled);
        } else {
            state.rejected.push(settled);
        }
        Ok(())
    }
}

#[async_trait]
impl DeliveryQueue for InMemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    async fn next(&mut self) -> Option<Delivery> {
        if !self.shared.reachable.load(Ordering::SeqCst) {
            return None;
        }
        self.receiver.recv().await
    }

    async fn ack(&mut self, delivery: &Delivery) -> EventResult<()> {
        self.settle(delivery, true)
    }

    async fn reject(&mut self, delivery: &Delivery) -> EventResult<()> {
        self.settle(delivery, false)
    }
}

impl Drop for InMemoryQueue {
    fn drop(&mut self) {
        self.shared.state.lock().queues.remove(&self.name);
    }
}
