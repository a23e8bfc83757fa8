//! Kafka producer, enabled with the `kafka` cargo feature.

use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use serde_json::Value;
use tracing::info;

use crate::{BrokerProducer, BusError, BusResult};

const SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// [`BrokerProducer`] backed by a Kafka cluster.
pub struct KafkaProducer {
    producer: FutureProducer,
}

impl KafkaProducer {
    /// Creates a producer for the given bootstrap brokers.
    ///
    /// # Errors
    ///
    /// Returns [`BusError::Broker`] when the producer cannot be built.
    pub fn new(brokers: &[String]) -> BusResult<Self> {
        if brokers.is_empty() {
            return Err(BusError::broker("no kafka brokers configured"));
        }
        let producer = ClientConfig::new()
            .set("bootstrap.servers", brokers.join(","))
            .set("message.timeout.ms", "5000")
            .create()
            .map_err(|err| BusError::broker(format!("failed to create kafka producer: {err}")))?;
        info!(brokers = %brokers.join(","), "kafka producer created");
        Ok(Self { producer })
    }
}

#[async_trait]
impl BrokerProducer for KafkaProducer {
    async fn send(&self, topic: &str, payload: &Value) -> BusResult<()> {
        let body = serde_json::to_vec(payload)
            .map_err(|err| BusError::broker(format!("failed to encode kafka payload: {err}")))?;
        let record = FutureRecord::<(), _>::to(topic).payload(&body);
        self.producer
            .send(record, Timeout::After(SEND_TIMEOUT))
            .await
            .map_err(|(err, _)| BusError::broker(format!("kafka send failed: {err}")))?;
        Ok(())
    }
}
