pub mod envelope;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod local;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::info;

use crate::config::{BusBackend, BusConfig};
pub use envelope::BusEnvelope;

/// Logical bus channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// Chat messages on their way to downstream processing
    Inbound,
    /// Replies on their way back to the chat
    Outbound,
}

impl std::fmt::Display for Channel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Channel::Inbound => write!(f, "inbound"),
            Channel::Outbound => write!(f, "outbound"),
        }
    }
}

/// A raw payload received from the bus
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BusDelivery {
    pub channel: Channel,
    pub payload: String,
}

#[derive(Debug, Error)]
pub enum BusError {
    #[error("bus unavailable: {0}")]
    Unavailable(String),
    #[error("failed to encode envelope: {0}")]
    Encode(#[from] serde_json::Error),
    #[cfg(feature = "kafka")]
    #[error("delivery failed: {0}")]
    Delivery(String),
}

/// Best-effort publisher. A returned error means the envelope was not
/// handed to the bus and the caller should fall back.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(&self, channel: Channel, envelope: &BusEnvelope) -> Result<(), BusError>;

    async fn publish_inbound(&self, chat_id: &str, text: &str) -> Result<(), BusError> {
        self.publish(Channel::Inbound, &BusEnvelope::new(chat_id, text))
            .await
    }

    async fn publish_outbound(&self, chat_id: &str, text: &str) -> Result<(), BusError> {
        self.publish(Channel::Outbound, &BusEnvelope::new(chat_id, text))
            .await
    }
}

/// A configured bus: the publisher plus the stream of deliveries to consume
pub struct BusHandle {
    pub backend: BusBackend,
    pub bus: Arc<dyn MessageBus>,
    pub deliveries: mpsc::Receiver<BusDelivery>,
}

pub async fn build(config: &BusConfig) -> Result<BusHandle> {
    let handle = match config.backend {
        BusBackend::Local => {
            let (bus, deliveries) = local::LocalBus::new(config.capacity);
            BusHandle {
                backend: BusBackend::Local,
                bus: Arc::new(bus),
                deliveries,
            }
        }
        BusBackend::Kafka => build_kafka(config).await?,
    };
    info!("Message bus ready (backend: {})", handle.backend);
    Ok(handle)
}

#[cfg(feature = "kafka")]
async fn build_kafka(config: &BusConfig) -> Result<BusHandle> {
    let (bus, deliveries) = kafka::KafkaBus::connect(config)?;
    Ok(BusHandle {
        backend: BusBackend::Kafka,
        bus: Arc::new(bus),
        deliveries,
    })
}

#[cfg(not(feature = "kafka"))]
async fn build_kafka(_config: &BusConfig) -> Result<BusHandle> {
    anyhow::bail!("bus backend 'kafka' requires building with the 'kafka' feature")
}
