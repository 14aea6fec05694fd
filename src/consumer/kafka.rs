//! Kafka/Redpanda binding of [`DeliveryChannel`]
//!
//! Kafka has no per-message nack, so:
//! - ack commits the next offset of the delivery's partition,
//! - requeue republishes the message to the inbound topic with the retry
//!   counter header bumped, then commits,
//! - dead-letter publishes to the dead-letter topic, then commits.
//!
//! The publish always happens before the commit, so a crash in between leads
//! to a duplicate, never a loss.

use crate::consumer::channel::{Delivery, DeliveryChannel, DeliveryPosition};
use crate::consumer::config::ConsumerConfig;
use crate::consumer::dlq::{owned_headers, DlqProducer};
use crate::consumer::error::{ConsumerError, ConsumerResult};
use async_trait::async_trait;
use rdkafka::admin::{AdminClient, AdminOptions, NewTopic, TopicReplication};
use rdkafka::client::DefaultClientContext;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::{Headers, OwnedMessage};
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use std::time::Duration;
use tracing::{debug, info};

/// Kafka properties callers may override
const ALLOWED_KAFKA_PROPS: &[&str] = &[
    // Fetch settings
    "fetch.min.bytes",
    "fetch.max.wait.ms",
    "fetch.max.bytes",
    "max.partition.fetch.bytes",
    // Request settings
    "request.timeout.ms",
    "metadata.max.age.ms",
    // Connection settings
    "reconnect.backoff.ms",
    "reconnect.backoff.max.ms",
    "socket.keepalive.enable",
    // Security
    "security.protocol",
    "sasl.mechanisms",
    "sasl.username",
    "sasl.password",
    "ssl.ca.location",
    // Monitoring
    "client.id",
    "statistics.interval.ms",
];

fn base_client_config(config: &ConsumerConfig) -> ConsumerResult<ClientConfig> {
    let mut client_config = ClientConfig::new();
    client_config.set("bootstrap.servers", &config.brokers);

    for (key, value) in &config.kafka_properties {
        if !ALLOWED_KAFKA_PROPS.contains(&key.as_str()) {
            return Err(ConsumerError::ConfigError(format!(
                "Disallowed Kafka property '{}'. Allowed properties: {:?}",
                key, ALLOWED_KAFKA_PROPS
            )));
        }
        client_config.set(key, value);
    }

    Ok(client_config)
}

/// Create the inbound and dead-letter topics if they do not exist
pub async fn declare_topics(config: &ConsumerConfig) -> ConsumerResult<()> {
    let admin: AdminClient<DefaultClientContext> = base_client_config(config)?
        .create()
        .map_err(|e| ConsumerError::ConnectionError(format!("Failed to create admin client: {}", e)))?;

    let topics = [
        NewTopic::new(
            &config.queue_name,
            config.topic_partitions,
            TopicReplication::Fixed(config.topic_replication),
        ),
        NewTopic::new(
            &config.dead_letter_queue_name,
            config.topic_partitions,
            TopicReplication::Fixed(config.topic_replication),
        ),
    ];
    let options = AdminOptions::new().operation_timeout(Some(config.connection_timeout));

    let results = tokio::time::timeout(
        config.connection_timeout,
        admin.create_topics(&topics, &options),
    )
    .await
    .map_err(|_| ConsumerError::ConnectionError("Topic declaration timeout".to_string()))?
    .map_err(|e| ConsumerError::ConnectionError(format!("Failed to declare topics: {}", e)))?;

    for result in results {
        match result {
            Ok(topic) => info!(topic = %topic, "Created topic"),
            Err((topic, RDKafkaErrorCode::TopicAlreadyExists)) => {
                debug!(topic = %topic, "Topic already exists")
            }
            Err((topic, code)) => {
                return Err(ConsumerError::ConnectionError(format!(
                    "Failed to declare topic {}: {}",
                    topic, code
                )))
            }
        }
    }

    Ok(())
}

/// Connect to the broker, declare the topics and subscribe.
///
/// Connection failures are returned as-is; reconnecting is up to the host.
pub async fn connect(config: &ConsumerConfig) -> ConsumerResult<KafkaChannel> {
    config.validate().map_err(ConsumerError::ConfigError)?;

    declare_topics(config).await?;

    let consumer: StreamConsumer = base_client_config(config)?
        .set("group.id", &config.group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .set("session.timeout.ms", config.session_timeout_ms.to_string())
        .create()
        .map_err(|e| ConsumerError::ConnectionError(format!("Failed to create consumer: {}", e)))?;

    consumer
        .subscribe(&[config.queue_name.as_str()])
        .map_err(|e| ConsumerError::ConnectionError(format!("Failed to subscribe: {}", e)))?;
    info!(queue = %config.queue_name, "Subscribed to queue");

    let producer: FutureProducer = base_client_config(config)?
        .set("message.timeout.ms", config.send_timeout.as_millis().to_string())
        .create()
        .map_err(|e| ConsumerError::ConnectionError(format!("Failed to create producer: {}", e)))?;

    let dlq = DlqProducer::new(producer.clone(), config.dead_letter_queue_name.clone())
        .with_timeout(config.send_timeout);
    info!(topic = %dlq.topic(), "Created DLQ producer");

    Ok(KafkaChannel {
        consumer,
        producer,
        dlq,
        queue_name: config.queue_name.clone(),
        send_timeout: config.send_timeout,
    })
}

/// Subscription to the inbound topic plus the producers used to settle
pub struct KafkaChannel {
    consumer: StreamConsumer,
    producer: FutureProducer,
    dlq: DlqProducer,
    queue_name: String,
    send_timeout: Duration,
}

impl KafkaChannel {
    fn commit(&self, delivery: &Delivery) -> ConsumerResult<()> {
        let position = &delivery.position;
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &position.queue,
            position.partition,
            Offset::Offset(position.offset + 1),
        )?;
        self.consumer.commit(&tpl, CommitMode::Async)?;
        debug!(
            "Committed offset {} for topic {} partition {}",
            position.offset, position.queue, position.partition
        );
        Ok(())
    }
}

fn into_delivery(message: OwnedMessage) -> Delivery {
    let headers = message
        .headers()
        .map(|headers| {
            headers
                .iter()
                .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec).unwrap_or_default()))
                .collect()
        })
        .unwrap_or_default();

    Delivery::new(
        message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        message.key().map(<[u8]>::to_vec),
        headers,
        DeliveryPosition {
            queue: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        },
    )
}

#[async_trait]
impl DeliveryChannel for KafkaChannel {
    async fn next_delivery(&self) -> Option<ConsumerResult<Delivery>> {
        match self.consumer.recv().await {
            Ok(message) => Some(Ok(into_delivery(message.detach()))),
            Err(e) => Some(Err(ConsumerError::KafkaError(e))),
        }
    }

    async fn ack(&self, delivery: &Delivery) -> ConsumerResult<()> {
        self.commit(delivery)
    }

    async fn requeue(&self, delivery: &Delivery, retry_count: u32) -> ConsumerResult<()> {
        let headers = owned_headers(&delivery.redelivery_headers(retry_count));
        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&self.queue_name)
            .payload(delivery.payload.as_slice())
            .headers(headers);
        if let Some(key) = &delivery.key {
            record = record.key(key.as_slice());
        }

        self.producer
            .send(record, self.send_timeout)
            .await
            .map_err(|(e, _)| ConsumerError::ChannelError(format!("Requeue publish failed: {}", e)))?;

        self.commit(delivery)
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> ConsumerResult<()> {
        self.dlq.send(delivery, reason).await?;
        self.commit(delivery)
    }
}
