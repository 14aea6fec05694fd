//! In-process [`DeliveryChannel`] for tests and dry runs
//!
//! Requeue puts the message back at the tail of the queue with the bumped
//! counter, the way a broker redelivers. Dead-lettered messages are kept in a
//! list that can be inspected.

use crate::consumer::channel::{Delivery, DeliveryChannel, DeliveryPosition};
use crate::consumer::error::{ConsumerError, ConsumerResult};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

/// How a delivery was settled
#[derive(Debug, Clone, PartialEq)]
pub enum Settlement {
    /// Acknowledged
    Acked,
    /// Requeued with this counter
    Requeued(u32),
    /// Dead-lettered with this reason
    DeadLettered(String),
}

/// Record of one settle call
#[derive(Debug, Clone, PartialEq)]
pub struct SettledDelivery {
    /// The delivery as the consumer saw it
    pub delivery: Delivery,
    /// What happened to it
    pub settlement: Settlement,
}

/// In-memory queue with a dead-letter list
pub struct MemoryChannel {
    queue_name: String,
    tx: mpsc::UnboundedSender<Delivery>,
    rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Delivery>>,
    next_offset: AtomicI64,
    settled: Mutex<Vec<SettledDelivery>>,
    dead_letters: Mutex<Vec<Delivery>>,
    settled_notify: Notify,
}

impl MemoryChannel {
    /// Empty channel for `queue_name`
    pub fn new(queue_name: impl Into<String>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            queue_name: queue_name.into(),
            tx,
            rx: tokio::sync::Mutex::new(rx),
            next_offset: AtomicI64::new(0),
            settled: Mutex::new(Vec::new()),
            dead_letters: Mutex::new(Vec::new()),
            settled_notify: Notify::new(),
        }
    }

    /// Enqueue a first delivery of `payload`
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> ConsumerResult<()> {
        self.publish_with_headers(payload, Vec::new())
    }

    /// Enqueue a payload with headers (a retry counter header is honored)
    pub fn publish_with_headers(
        &self,
        payload: impl Into<Vec<u8>>,
        headers: Vec<(String, Vec<u8>)>,
    ) -> ConsumerResult<()> {
        let delivery = Delivery::new(payload.into(), None, headers, self.next_position());
        self.enqueue(delivery)
    }

    /// Every settle call so far, in order
    pub fn settled(&self) -> Vec<SettledDelivery> {
        self.settled.lock().clone()
    }

    /// Messages routed to the dead-letter list
    pub fn dead_letters(&self) -> Vec<Delivery> {
        self.dead_letters.lock().clone()
    }

    /// Wait until at least `count` settle calls were made, or `timeout` passes.
    /// Returns whether the count was reached.
    pub async fn wait_for_settled(&self, count: usize, timeout: Duration) -> bool {
        let wait = async {
            loop {
                let notified = self.settled_notify.notified();
                if self.settled.lock().len() >= count {
                    return;
                }
                notified.await;
            }
        };
        tokio::time::timeout(timeout, wait).await.is_ok()
    }

    fn next_position(&self) -> DeliveryPosition {
        DeliveryPosition {
            queue: self.queue_name.clone(),
            partition: 0,
            offset: self.next_offset.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn enqueue(&self, delivery: Delivery) -> ConsumerResult<()> {
        self.tx
            .send(delivery)
            .map_err(|_| ConsumerError::ChannelError("memory queue closed".to_string()))
    }

    fn record(&self, delivery: &Delivery, settlement: Settlement) {
        self.settled.lock().push(SettledDelivery {
            delivery: delivery.clone(),
            settlement,
        });
        self.settled_notify.notify_waiters();
    }
}

#[async_trait]
impl DeliveryChannel for MemoryChannel {
    async fn next_delivery(&self) -> Option<ConsumerResult<Delivery>> {
        let mut rx = self.rx.lock().await;
        rx.recv().await.map(Ok)
    }

    async fn ack(&self, delivery: &Delivery) -> ConsumerResult<()> {
        self.record(delivery, Settlement::Acked);
        Ok(())
    }

    async fn requeue(&self, delivery: &Delivery, retry_count: u32) -> ConsumerResult<()> {
        let redelivery = Delivery::new(
            delivery.payload.clone(),
            delivery.key.clone(),
            delivery.redelivery_headers(retry_count),
            self.next_position(),
        );
        self.enqueue(redelivery)?;
        self.record(delivery, Settlement::Requeued(retry_count));
        Ok(())
    }

    async fn dead_letter(&self, delivery: &Delivery, reason: &str) -> ConsumerResult<()> {
        self.dead_letters.lock().push(delivery.clone());
        self.record(delivery, Settlement::DeadLettered(reason.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_requeue_redelivers_with_counter() {
        let channel = MemoryChannel::new("alerts");
        channel.publish(b"payload".to_vec()).unwrap();

        let first = channel.next_delivery().await.unwrap().unwrap();
        assert_eq!(first.retry_count, 0);
        assert_eq!(first.position.offset, 0);

        channel.requeue(&first, 1).await.unwrap();
        let second = channel.next_delivery().await.unwrap().unwrap();
        assert_eq!(second.retry_count, 1);
        assert_eq!(second.payload, b"payload".to_vec());
        assert_eq!(second.position.offset, 1);

        channel.dead_letter(&second, "exhausted").await.unwrap();
        assert_eq!(channel.dead_letters().len(), 1);
        assert_eq!(
            channel.settled().iter().map(|s| s.settlement.clone()).collect::<Vec<_>>(),
            vec![Settlement::Requeued(1), Settlement::DeadLettered("exhausted".to_string())]
        );
    }

    #[tokio::test]
    async fn test_wait_for_settled_times_out() {
        let channel = MemoryChannel::new("alerts");
        assert!(!channel.wait_for_settled(1, Duration::from_millis(20)).await);
    }
}
