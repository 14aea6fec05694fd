//! Dead-letter publishing for Kafka/Redpanda

use crate::consumer::channel::{Delivery, RETRY_COUNT_HEADER};
use crate::consumer::error::{ConsumerError, ConsumerResult};
use rdkafka::message::{Header, OwnedHeaders};
use rdkafka::producer::{FutureProducer, FutureRecord};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, error};

/// Header naming why the message was dead-lettered
pub const DLQ_REASON_HEADER: &str = "x-dead-letter-reason";
/// Header naming the queue the message was consumed from
pub const DLQ_ORIGINAL_QUEUE_HEADER: &str = "x-dead-letter-original-queue";
/// Header with the original partition
pub const DLQ_ORIGINAL_PARTITION_HEADER: &str = "x-dead-letter-original-partition";
/// Header with the original offset
pub const DLQ_ORIGINAL_OFFSET_HEADER: &str = "x-dead-letter-original-offset";
/// Header with the unix time of dead-lettering
pub const DLQ_TIMESTAMP_HEADER: &str = "x-dead-letter-timestamp";

/// Build Kafka headers from name/value pairs
pub(crate) fn owned_headers(headers: &[(String, Vec<u8>)]) -> OwnedHeaders {
    headers
        .iter()
        .fold(OwnedHeaders::new_with_capacity(headers.len()), |acc, (key, value)| {
            acc.insert(Header {
                key: key.as_str(),
                value: Some(value.as_slice()),
            })
        })
}

/// Producer for the dead-letter topic
#[derive(Clone)]
pub struct DlqProducer {
    producer: FutureProducer,
    topic: String,
    timeout: Duration,
}

impl DlqProducer {
    /// Create a DLQ producer
    pub fn new(producer: FutureProducer, topic: String) -> Self {
        Self {
            producer,
            topic,
            timeout: Duration::from_secs(30),
        }
    }

    /// Set the send timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Dead-letter topic name
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Publish `delivery` to the dead-letter topic with failure metadata
    pub async fn send(&self, delivery: &Delivery, reason: &str) -> ConsumerResult<()> {
        let headers = owned_headers(&dlq_headers(delivery, reason));
        let mut record: FutureRecord<'_, [u8], [u8]> = FutureRecord::to(&self.topic)
            .payload(delivery.payload.as_slice())
            .headers(headers);
        if let Some(key) = &delivery.key {
            record = record.key(key.as_slice());
        }

        match self.producer.send(record, self.timeout).await {
            Ok((partition, offset)) => {
                debug!(
                    "Message sent to DLQ topic: {}, partition: {}, offset: {}",
                    self.topic, partition, offset
                );
                Ok(())
            }
            Err((e, _)) => {
                error!("Failed to send message to DLQ: {}", e);
                Err(ConsumerError::DlqError(format!("DLQ send failed: {}", e)))
            }
        }
    }
}

/// Original headers plus the dead-letter metadata
pub(crate) fn dlq_headers(delivery: &Delivery, reason: &str) -> Vec<(String, Vec<u8>)> {
    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);

    let mut headers: Vec<(String, Vec<u8>)> = delivery
        .headers
        .iter()
        .filter(|(key, _)| !key.starts_with("x-dead-letter-"))
        .cloned()
        .collect();

    headers.extend([
        (
            RETRY_COUNT_HEADER.to_string(),
            delivery.retry_count.to_string().into_bytes(),
        ),
        (DLQ_REASON_HEADER.to_string(), reason.as_bytes().to_vec()),
        (
            DLQ_ORIGINAL_QUEUE_HEADER.to_string(),
            delivery.position.queue.as_bytes().to_vec(),
        ),
        (
            DLQ_ORIGINAL_PARTITION_HEADER.to_string(),
            delivery.position.partition.to_string().into_bytes(),
        ),
        (
            DLQ_ORIGINAL_OFFSET_HEADER.to_string(),
            delivery.position.offset.to_string().into_bytes(),
        ),
        (DLQ_TIMESTAMP_HEADER.to_string(), timestamp.to_string().into_bytes()),
    ]);
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::channel::DeliveryPosition;

    #[test]
    fn test_dlq_headers_carry_origin_and_reason() {
        let delivery = Delivery::new(
            b"{}".to_vec(),
            None,
            vec![
                ("trace-id".to_string(), b"t-1".to_vec()),
                (RETRY_COUNT_HEADER.to_string(), b"2".to_vec()),
            ],
            DeliveryPosition {
                queue: "alert-created".to_string(),
                partition: 3,
                offset: 99,
            },
        );

        let headers = dlq_headers(&delivery, "store failed");
        let get = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key == name)
                .map(|(_, value)| String::from_utf8(value.clone()).unwrap())
        };

        assert_eq!(get("trace-id").as_deref(), Some("t-1"));
        assert_eq!(get(RETRY_COUNT_HEADER).as_deref(), Some("2"));
        assert_eq!(get(DLQ_REASON_HEADER).as_deref(), Some("store failed"));
        assert_eq!(get(DLQ_ORIGINAL_QUEUE_HEADER).as_deref(), Some("alert-created"));
        assert_eq!(get(DLQ_ORIGINAL_PARTITION_HEADER).as_deref(), Some("3"));
        assert_eq!(get(DLQ_ORIGINAL_OFFSET_HEADER).as_deref(), Some("99"));
        assert!(get(DLQ_TIMESTAMP_HEADER).is_some());
    }
}
