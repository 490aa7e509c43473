use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::Message;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{BusDelivery, BusEnvelope, BusError, Channel, MessageBus};
use crate::config::BusConfig;

/// Kafka-backed bus: one topic per logical channel
pub struct KafkaBus {
    producer: FutureProducer,
    inbound_topic: String,
    outbound_topic: String,
    timeout: Duration,
}

impl KafkaBus {
    /// Create the producer and spawn a consumer that forwards records from
    /// the subscribed topics into the returned receiver.
    pub fn connect(config: &BusConfig) -> Result<(Self, mpsc::Receiver<BusDelivery>)> {
        let kafka = config
            .kafka
            .as_ref()
            .context("[bus.kafka] section is required for the kafka backend")?;
        if kafka.brokers.is_empty() {
            anyhow::bail!("bus.kafka.brokers must not be empty");
        }
        let brokers = kafka.brokers.join(",");

        let producer: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("message.timeout.ms", kafka.delivery_timeout_ms.to_string())
            .create()
            .context("Failed to create Kafka producer")?;

        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", &brokers)
            .set("group.id", &kafka.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .create()
            .context("Failed to create Kafka consumer")?;

        let mut topics = vec![config.outbound_topic.as_str()];
        if kafka.consume_inbound {
            topics.push(config.inbound_topic.as_str());
        }
        consumer
            .subscribe(&topics)
            .context("Failed to subscribe to Kafka topics")?;
        info!("Subscribed to Kafka topics: {:?}", topics);

        let (tx, rx) = mpsc::channel(config.capacity.max(1));
        tokio::spawn(forward_records(
            consumer,
            config.inbound_topic.clone(),
            tx,
        ));

        let bus = Self {
            producer,
            inbound_topic: config.inbound_topic.clone(),
            outbound_topic: config.outbound_topic.clone(),
            timeout: Duration::from_millis(kafka.delivery_timeout_ms.max(1)),
        };
        Ok((bus, rx))
    }

    fn topic(&self, channel: Channel) -> &str {
        match channel {
            Channel::Inbound => &self.inbound_topic,
            Channel::Outbound => &self.outbound_topic,
        }
    }
}

#[async_trait]
impl MessageBus for KafkaBus {
    async fn publish(&self, channel: Channel, envelope: &BusEnvelope) -> Result<(), BusError> {
        let payload = envelope.to_json()?;
        let topic = self.topic(channel);
        let record = FutureRecord::to(topic)
            .key(&envelope.chat_id)
            .payload(&payload);
        self.producer
            .send(record, self.timeout)
            .await
            .map_err(|(err, _)| {
                BusError::Delivery(format!("kafka send to {topic} failed: {err}"))
            })?;
        debug!("Published to {} ({})", topic, channel);
        Ok(())
    }
}

async fn forward_records(
    consumer: StreamConsumer,
    inbound_topic: String,
    tx: mpsc::Sender<BusDelivery>,
) {
    loop {
        // The borrowed record must be released before the next await
        let delivery = {
            let message = match consumer.recv().await {
                Ok(m) => m,
                Err(e) => {
                    error!("Kafka consumer error: {}", e);
                    continue;
                }
            };

            let payload = match message.payload_view::<str>() {
                Some(Ok(p)) => p.to_string(),
                Some(Err(e)) => {
                    warn!("Skipping non-UTF-8 record on {}: {}", message.topic(), e);
                    continue;
                }
                None => continue,
            };

            let channel = if message.topic() == inbound_topic {
                Channel::Inbound
            } else {
                Channel::Outbound
            };
            BusDelivery { channel, payload }
        };

        if tx.send(delivery).await.is_err() {
            info!("Delivery receiver dropped, stopping Kafka consumer");
            break;
        }
    }
}
