//! In-process `MessageBus`, used for unit and integration tests of the
//! worker pipeline without a broker. Publish-by-routing-key is modeled
//! directly with a `tokio::mpsc` channel keyed by queue name.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use dn_common::DnError;
use tokio::sync::{mpsc, Mutex};

use crate::{BusConsumer, Delivery, DeliveryInner, MessageBus, PublishOptions, Result};

type Channel = (mpsc::UnboundedSender<Vec<u8>>, Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>);

/// Maps a routing key to the queue name this system binds it to.
fn queue_for_routing_key(routing_key: &str) -> String {
    format!("{routing_key}.queue")
}

#[derive(Default)]
pub struct InMemoryBus {
    queues: DashMap<String, Channel>,
}

impl InMemoryBus {
    pub fn new() -> Self {
        Self::default()
    }

    fn channel_for(&self, queue: &str) -> Channel {
        self.queues
            .entry(queue.to_string())
            .or_insert_with(|| {
                let (tx, rx) = mpsc::unbounded_channel();
                (tx, Arc::new(Mutex::new(rx)))
            })
            .clone()
    }
}

#[async_trait]
impl MessageBus for InMemoryBus {
    async fn publish(&self, routing_key: &str, payload: Vec<u8>, _options: PublishOptions) -> Result<()> {
        let queue = queue_for_routing_key(routing_key);
        let (tx, _) = self.channel_for(&queue);
        tx.send(payload)
            .map_err(|_| DnError::Infrastructure("in-memory bus receiver dropped".to_string()))
    }

    async fn consume(&self, queue: &str) -> Result<Box<dyn BusConsumer>> {
        let (tx, rx) = self.channel_for(queue);
        Ok(Box::new(InMemoryConsumer { tx, rx }))
    }
}

struct InMemoryConsumer {
    tx: mpsc::UnboundedSender<Vec<u8>>,
    rx: Arc<Mutex<mpsc::UnboundedReceiver<Vec<u8>>>>,
}

#[async_trait]
impl BusConsumer for InMemoryConsumer {
    async fn next_delivery(&mut self) -> Result<Option<Delivery>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            None => Ok(None),
            Some(payload) => Ok(Some(Delivery {
                payload,
                inner: DeliveryInner::Memory {
                    requeue: self.tx.clone(),
                },
            })),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_then_consume_round_trips() {
        let bus = InMemoryBus::new();
        bus.publish("email", b"hello".to_vec(), PublishOptions::default())
            .await
            .unwrap();
        let mut consumer = bus.consume("email.queue").await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(delivery.payload, b"hello".to_vec());
        delivery.ack().await.unwrap();
    }

    #[tokio::test]
    async fn nack_with_requeue_redelivers() {
        let bus = InMemoryBus::new();
        bus.publish("push", b"payload".to_vec(), PublishOptions::default())
            .await
            .unwrap();
        let mut consumer = bus.consume("push.queue").await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        delivery.nack(true).await.unwrap();

        let redelivered = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(redelivered.payload, b"payload".to_vec());
    }

    #[tokio::test]
    async fn nack_without_requeue_drops_message() {
        let bus = InMemoryBus::new();
        bus.publish("push", b"payload".to_vec(), PublishOptions::default())
            .await
            .unwrap();
        let mut consumer = bus.consume("push.queue").await.unwrap();
        let delivery = consumer.next_delivery().await.unwrap().unwrap();
        delivery.nack(false).await.unwrap();

        bus.publish("push", b"next".to_vec(), PublishOptions::default())
            .await
            .unwrap();
        let next = consumer.next_delivery().await.unwrap().unwrap();
        assert_eq!(next.payload, b"next".to_vec());
    }
}
