use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use super::{BusDelivery, BusEnvelope, BusError, Channel, MessageBus};

/// In-process bus backed by a bounded channel. A full or closed channel is
/// reported as a publish failure rather than waited on.
#[derive(Clone)]
pub struct LocalBus {
    tx: mpsc::Sender<BusDelivery>,
}

impl LocalBus {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<BusDelivery>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl MessageBus for LocalBus {
    async fn publish(&self, channel: Channel, envelope: &BusEnvelope) -> Result<(), BusError> {
        let payload = envelope.to_json()?;
        self.tx
            .try_send(BusDelivery { channel, payload })
            .map_err(|e| match e {
                TrySendError::Full(_) => BusError::Unavailable("local bus is full".to_string()),
                TrySendError::Closed(_) => {
                    BusError::Unavailable("local bus is closed".to_string())
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_serializes_envelope() {
        let (bus, mut rx) = LocalBus::new(4);
        bus.publish_inbound("42", "/start").await.unwrap();

        let delivery = rx.recv().await.unwrap();
        assert_eq!(delivery.channel, Channel::Inbound);
        assert_eq!(delivery.payload, r#"{"chatId":"42","message":"/start"}"#);
    }

    #[tokio::test]
    async fn test_full_bus_fails_fast() {
        let (bus, _rx) = LocalBus::new(1);
        bus.publish_inbound("1", "a").await.unwrap();
        let err = bus.publish_inbound("1", "b").await.unwrap_err();
        assert!(matches!(err, BusError::Unavailable(_)));
    }

    #[tokio::test]
    async fn test_closed_bus_fails() {
        let (bus, rx) = LocalBus::new(4);
        drop(rx);
        assert!(bus.publish_outbound("1", "x").await.is_err());
    }
}
