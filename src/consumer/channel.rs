//! Broker-neutral view of a subscription
//!
//! The consumer loop only talks to a [`DeliveryChannel`]. Each broker binding
//! decides how ack, requeue and dead-letter map onto its own primitives.

use crate::consumer::error::ConsumerResult;
use async_trait::async_trait;

/// Header carrying the number of times a message has been requeued
pub const RETRY_COUNT_HEADER: &str = "x-retry-count";

/// Where a delivery came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryPosition {
    /// Queue or topic name
    pub queue: String,
    /// Partition (0 for brokers without partitions)
    pub partition: i32,
    /// Offset or delivery tag
    pub offset: i64,
}

/// One message handed to the consumer
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    /// Raw payload
    pub payload: Vec<u8>,
    /// Message key, if any
    pub key: Option<Vec<u8>>,
    /// Headers other than the retry counter
    pub headers: Vec<(String, Vec<u8>)>,
    /// Requeues so far; 0 on first delivery
    pub retry_count: u32,
    /// Broker coordinates
    pub position: DeliveryPosition,
}

impl Delivery {
    /// Build a delivery, pulling the retry counter out of `headers`
    pub fn new(
        payload: Vec<u8>,
        key: Option<Vec<u8>>,
        headers: Vec<(String, Vec<u8>)>,
        position: DeliveryPosition,
    ) -> Self {
        let mut retry_count = 0;
        let mut rest = Vec::with_capacity(headers.len());
        for (name, value) in headers {
            if name.eq_ignore_ascii_case(RETRY_COUNT_HEADER) {
                retry_count = parse_retry_count(&value);
            } else {
                rest.push((name, value));
            }
        }
        Self {
            payload,
            key,
            headers: rest,
            retry_count,
            position,
        }
    }

    /// Headers for the next delivery of this message
    pub fn redelivery_headers(&self, retry_count: u32) -> Vec<(String, Vec<u8>)> {
        let mut headers = self.headers.clone();
        headers.push((
            RETRY_COUNT_HEADER.to_string(),
            retry_count.to_string().into_bytes(),
        ));
        headers
    }
}

/// Read a retry counter header value.
///
/// Accepts a decimal string or a 4-byte big-endian integer. Anything else
/// counts as absent.
pub fn parse_retry_count(value: &[u8]) -> u32 {
    if let Some(count) = std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok())
    {
        return count;
    }
    match <[u8; 4]>::try_from(value) {
        Ok(bytes) => u32::try_from(i32::from_be_bytes(bytes)).unwrap_or(0),
        Err(_) => 0,
    }
}

/// A subscription to the inbound queue
#[async_trait]
pub trait DeliveryChannel: Send + Sync + 'static {
    /// Wait for the next delivery. `None` means the subscription ended.
    /// Must be cancel safe: dropping the future never loses a message.
    async fn next_delivery(&self) -> Option<ConsumerResult<Delivery>>;

    /// Settle as done
    async fn ack(&self, delivery: &Delivery) -> ConsumerResult<()>;

    /// Hand back for another attempt carrying `retry_count`
    async fn requeue(&self, delivery: &Delivery, retry_count: u32) -> ConsumerResult<()>;

    /// Route to the dead-letter queue
    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> ConsumerResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> DeliveryPosition {
        DeliveryPosition {
            queue: "alert-created".to_string(),
            partition: 0,
            offset: 7,
        }
    }

    #[test]
    fn test_retry_count_absent_is_zero() {
        let delivery = Delivery::new(b"{}".to_vec(), None, vec![], position());
        assert_eq!(delivery.retry_count, 0);
    }

    #[test]
    fn test_retry_count_header_is_extracted() {
        let delivery = Delivery::new(
            b"{}".to_vec(),
            None,
            vec![
                ("trace-id".to_string(), b"abc".to_vec()),
                ("X-Retry-Count".to_string(), b"2".to_vec()),
            ],
            position(),
        );
        assert_eq!(delivery.retry_count, 2);
        assert_eq!(delivery.headers, vec![("trace-id".to_string(), b"abc".to_vec())]);

        let headers = delivery.redelivery_headers(3);
        assert_eq!(
            headers.last(),
            Some(&(RETRY_COUNT_HEADER.to_string(), b"3".to_vec()))
        );
    }

    #[test]
    fn test_parse_retry_count_encodings() {
        assert_eq!(parse_retry_count(b"4"), 4);
        assert_eq!(parse_retry_count(&2i32.to_be_bytes()), 2);
        assert_eq!(parse_retry_count(&(-1i32).to_be_bytes()), 0);
        assert_eq!(parse_retry_count(b"several"), 0);
        assert_eq!(parse_retry_count(b""), 0);
    }
}
