//! Message bus client: durable publish to a named direct-routing exchange,
//! durable consumption with manual acknowledgement, republish for retry and
//! dead-lettering.

pub mod amqp;
pub mod memory;

use async_trait::async_trait;
use dn_common::DnError;

pub type Result<T> = std::result::Result<T, DnError>;

/// Options accompanying a publish.
#[derive(Debug, Clone)]
pub struct PublishOptions {
    /// Forwarded unchanged as a transport hint; has no local scheduling
    /// effect.
    pub priority: u8,
    /// Whether the publish should be marked persistent. Always `true` in
    /// this system, but kept explicit since `delivery_mode` is how AMQP
    /// expresses it.
    pub persistent: bool,
}

impl Default for PublishOptions {
    fn default() -> Self {
        Self {
            priority: 0,
            persistent: true,
        }
    }
}

/// A message handed to a consumer, bundled with its ack/nack handle.
pub struct Delivery {
    pub payload: Vec<u8>,
    inner: DeliveryInner,
}

enum DeliveryInner {
    Amqp(lapin::message::Delivery),
    Memory {
        requeue: tokio::sync::mpsc::UnboundedSender<Vec<u8>>,
    },
}

impl Delivery {
    /// Acknowledge the delivery. Consumes `self`: a delivery can only be
    /// ack'd or nack'd once.
    pub async fn ack(self) -> Result<()> {
        match self.inner {
            DeliveryInner::Amqp(delivery) => delivery
                .ack(lapin::options::BasicAckOptions::default())
                .await
                .map_err(|e| DnError::Infrastructure(format!("amqp ack failed: {e}"))),
            DeliveryInner::Memory { .. } => Ok(()),
        }
    }

    /// Negatively acknowledge the delivery. `requeue` controls whether the
    /// broker makes the message visible again (used for redelivery on
    /// channel loss, not for this system's own retry ladder, which
    /// republishes a brand-new delivery instead).
    pub async fn nack(self, requeue: bool) -> Result<()> {
        match self.inner {
            DeliveryInner::Amqp(delivery) => delivery
                .nack(lapin::options::BasicNackOptions {
                    requeue,
                    ..Default::default()
                })
                .await
                .map_err(|e| DnError::Infrastructure(format!("amqp nack failed: {e}"))),
            DeliveryInner::Memory { requeue: tx } => {
                if requeue {
                    let _ = tx.send(self.payload);
                }
                Ok(())
            }
        }
    }
}

/// One open consumption stream bound to a queue.
#[async_trait]
pub trait BusConsumer: Send {
    /// Await the next delivery. Returns `None` when the consumer has been
    /// closed and will not yield further messages.
    async fn next_delivery(&mut self) -> Result<Option<Delivery>>;
}

/// Durable topic-exchange client: publish by routing key, consume by queue
/// name with manual ack.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, routing_key: &str, payload: Vec<u8>, options: PublishOptions) -> Result<()>;

    async fn consume(&self, queue: &str) -> Result<Box<dyn BusConsumer>>;
}

pub use amqp::{AmqpBus, AmqpBusConfig};
pub use memory::InMemoryBus;
