//! Kafka transport backed by `rdkafka`
//!
//! **Note on Windows Support:**
//! `rdkafka` builds the native `librdkafka` library. On Windows use WSL or a
//! vcpkg-installed librdkafka, or leave the `kafka` feature off.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, Consumer};
use rdkafka::producer::{FutureProducer, FutureRecord, Producer as _};

use crate::broker::Broker;
use crate::error::{Error, Result};

/// [`Broker`] that talks to a Kafka cluster.
#[derive(Debug, Clone)]
pub struct KafkaBroker {
    /// Acknowledgments required per message
    pub acks: String,
    /// Deadline for topic metadata requests
    pub metadata_timeout: Duration,
    /// Deadline for flushing buffered messages on disconnect
    pub flush_timeout: Duration,
    /// Additional librdkafka producer settings
    pub extra_config: HashMap<String, String>,
}

impl Default for KafkaBroker {
    fn default() -> Self {
        Self {
            acks: "1".to_string(),
            metadata_timeout: Duration::from_secs(5),
            flush_timeout: Duration::from_secs(5),
            extra_config: HashMap::new(),
        }
    }
}

impl KafkaBroker {
    /// Add a librdkafka setting applied to every producer.
    pub fn with_config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extra_config.insert(key.into(), value.into());
        self
    }

    fn client_config(&self, address: &str) -> ClientConfig {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", address)
            .set("acks", &self.acks);
        for (key, value) in &self.extra_config {
            client_config.set(key, value);
        }
        client_config
    }
}

/// One Kafka producer bound to a topic.
pub struct KafkaConnection {
    producer: FutureProducer,
    brokers: String,
    topic: String,
}

impl KafkaConnection {
    /// The topic this producer writes to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// The underlying rdkafka producer.
    pub fn producer(&self) -> &FutureProducer {
        &self.producer
    }

    /// Send one message to the bound topic and wait for delivery.
    pub async fn send(&self, key: Option<&[u8]>, payload: &[u8]) -> Result<()> {
        let mut record = FutureRecord::to(&self.topic).payload(payload);
        if let Some(key) = key {
            record = record.key(key);
        }

        self.producer
            .send(record, Duration::from_secs(0))
            .await
            .map(|_| ())
            .map_err(|(e, _)| {
                Error::broker(self.brokers.as_str(), "failed to send message").with_source(e)
            })
    }
}

impl std::fmt::Debug for KafkaConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KafkaConnection")
            .field("brokers", &self.brokers)
            .field("topic", &self.topic)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl Broker for KafkaBroker {
    type Connection = KafkaConnection;

    async fn topics(&self, address: &str) -> Result<HashSet<String>> {
        let consumer: BaseConsumer = self.client_config(address).create().map_err(|e| {
            Error::broker(address, "failed to create metadata client").with_source(e)
        })?;
        let timeout = self.metadata_timeout;

        // librdkafka metadata calls block the calling thread.
        tokio::task::spawn_blocking(move || {
            consumer.fetch_metadata(None, timeout).map(|metadata| {
                metadata
                    .topics()
                    .iter()
                    .map(|topic| topic.name().to_string())
                    .collect::<HashSet<_>>()
            })
        })
        .await
        .map_err(|e| Error::broker(address, "metadata task failed").with_source(e))?
        .map_err(|e| Error::broker(address, "failed to fetch metadata").with_source(e))
    }

    async fn connect(&self, address: &str, topic: &str) -> Result<KafkaConnection> {
        let producer: FutureProducer = self
            .client_config(address)
            .create()
            .map_err(|e| Error::creation(topic, "failed to create Kafka producer").with_source(e))?;

        Ok(KafkaConnection {
            producer,
            brokers: address.to_string(),
            topic: topic.to_string(),
        })
    }

    async fn disconnect(&self, connection: KafkaConnection) -> Result<()> {
        let timeout = self.flush_timeout;
        let brokers = connection.brokers.clone();

        tokio::task::spawn_blocking(move || connection.producer.flush(timeout))
            .await
            .map_err(|e| Error::broker(brokers.as_str(), "flush task failed").with_source(e))?
            .map_err(|e| Error::broker(brokers.as_str(), "failed to flush producer").with_source(e))
    }
}
