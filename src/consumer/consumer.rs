//! The alert consumer loop: receive, process, settle

use crate::consumer::channel::{Delivery, DeliveryChannel};
use crate::consumer::config::ConsumerConfig;
use crate::consumer::error::{ConsumerError, ConsumerResult, ProcessingError};
use crate::consumer::metrics::ConsumerMetrics;
use crate::consumer::processor::MessageProcessor;
use crate::consumer::retry::{RetryDecision, RetryExecutor, RetryPolicy, RetryResult};
use crate::consumer::shutdown::ShutdownState;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Retries of a failing ack/requeue/dead-letter call before the loop gives up
const SETTLE_RETRIES: u32 = 3;
/// Initial wait between settle retries
const SETTLE_BACKOFF: Duration = Duration::from_millis(200);
/// Pause after a receive error so a broken connection does not spin the loop
const RECEIVE_ERROR_PAUSE: Duration = Duration::from_millis(100);

/// How a delivery was settled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Acknowledged, after success or a non-retryable failure
    Acked,
    /// Handed back with this retry counter
    Requeued(u32),
    /// Sent to the dead-letter queue after this many attempts
    DeadLettered(u32),
}

/// Consumes alert-created deliveries one at a time and settles each exactly
/// once.
pub struct AlertConsumer<C, P> {
    channel: Arc<C>,
    processor: Arc<P>,
    retry_policy: RetryPolicy,
    metrics: Arc<ConsumerMetrics>,
    shutdown_state: Arc<ShutdownState>,
    metrics_interval: Duration,
    shutdown_timeout: Duration,
}

impl<C: DeliveryChannel, P: MessageProcessor> AlertConsumer<C, P> {
    /// Create a consumer over an already connected channel
    pub fn new(config: &ConsumerConfig, channel: C, processor: P) -> Self {
        Self {
            channel: Arc::new(channel),
            processor: Arc::new(processor),
            retry_policy: config.retry_policy.clone(),
            metrics: Arc::new(ConsumerMetrics::new()),
            shutdown_state: Arc::new(ShutdownState::new()),
            metrics_interval: config.metrics_interval,
            shutdown_timeout: config.shutdown_timeout,
        }
    }

    /// Shared metrics
    pub fn metrics(&self) -> Arc<ConsumerMetrics> {
        self.metrics.clone()
    }

    /// Shared shutdown state
    pub fn shutdown_state(&self) -> Arc<ShutdownState> {
        self.shutdown_state.clone()
    }

    /// The channel being consumed
    pub fn channel(&self) -> Arc<C> {
        self.channel.clone()
    }

    /// Run on a background task. The returned handle stops it.
    pub fn spawn(self) -> ConsumerHandle {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let metrics = self.metrics.clone();
        let shutdown_state = self.shutdown_state.clone();
        let shutdown_timeout = self.shutdown_timeout;
        let task = tokio::spawn(self.run(shutdown_rx));

        ConsumerHandle {
            shutdown_tx,
            task,
            metrics,
            shutdown_state,
            shutdown_timeout,
        }
    }

    /// Run until `shutdown_rx` flips to true (or its sender goes away), the
    /// channel ends, or settling a delivery fails for good.
    ///
    /// A shutdown signal never interrupts a delivery being processed; it is
    /// settled before the loop returns.
    pub async fn run(self, mut shutdown_rx: watch::Receiver<bool>) -> ConsumerResult<()> {
        info!(processor = self.processor.name(), "Starting alert consumer");
        let reporter = self.spawn_metrics_reporter(shutdown_rx.clone());

        let result = self.consume(&mut shutdown_rx).await;

        if let Some(reporter) = reporter {
            reporter.abort();
        }
        let snapshot = self.metrics.snapshot();
        info!(
            "Consumer stopped - received: {}, acked: {}, requeued: {}, dead-lettered: {}",
            snapshot.received, snapshot.acked, snapshot.requeued, snapshot.dead_lettered
        );
        self.shutdown_state.complete_shutdown();
        result
    }

    async fn consume(&self, shutdown_rx: &mut watch::Receiver<bool>) -> ConsumerResult<()> {
        while !*shutdown_rx.borrow() {
            let next = tokio::select! {
                biased;
                changed = shutdown_rx.changed() => {
                    if changed.is_err() {
                        info!("Shutdown sender dropped, stopping consumer");
                        break;
                    }
                    continue;
                }
                next = self.channel.next_delivery() => next,
            };

            match next {
                Some(Ok(delivery)) => {
                    self.shutdown_state.add_inflight_message();
                    let result = self.handle_delivery(&delivery, shutdown_rx).await;
                    self.shutdown_state.remove_inflight_message();
                    result?;
                }
                Some(Err(e)) => {
                    error!("Failed to receive delivery: {}", e);
                    self.metrics.increment_channel_errors();
                    tokio::time::sleep(RECEIVE_ERROR_PAUSE).await;
                }
                None => {
                    info!("Delivery channel closed");
                    break;
                }
            }
        }

        info!("Consumer loop received shutdown signal");
        self.shutdown_state.begin_shutdown();
        Ok(())
    }

    /// Process one delivery and settle it
    pub async fn handle_delivery(
        &self,
        delivery: &Delivery,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> ConsumerResult<DeliveryOutcome> {
        self.metrics.increment_received();
        let start = Instant::now();
        let position = &delivery.position;
        debug!(
            queue = %position.queue,
            partition = position.partition,
            offset = position.offset,
            retry_count = delivery.retry_count,
            "Received delivery"
        );

        let result = AssertUnwindSafe(self.processor.process(delivery))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ProcessingError::Unexpected(format!(
                    "panic during processing: {}",
                    panic_message(&*panic)
                )))
            });

        let outcome = match result {
            Ok(()) => {
                self.settle(|channel| channel.ack(delivery)).await?;
                debug!("Delivery processed in {:?}", start.elapsed());
                DeliveryOutcome::Acked
            }
            Err(e) if !e.is_retryable() => {
                self.metrics.record_failure(e.kind());
                warn!(
                    offset = position.offset,
                    kind = e.kind(),
                    "Discarding delivery: {}",
                    e
                );
                self.settle(|channel| channel.ack(delivery)).await?;
                DeliveryOutcome::Acked
            }
            Err(e) => {
                self.metrics.record_failure(e.kind());
                self.settle_failure(delivery, &e, shutdown_rx).await?
            }
        };

        debug!(
            offset = position.offset,
            retry_count = delivery.retry_count,
            outcome = ?outcome,
            "Delivery settled"
        );
        match outcome {
            DeliveryOutcome::Acked => self.metrics.increment_acked(),
            DeliveryOutcome::Requeued(_) => self.metrics.increment_requeued(),
            DeliveryOutcome::DeadLettered(_) => self.metrics.increment_dead_lettered(),
        }
        Ok(outcome)
    }

    async fn settle_failure(
        &self,
        delivery: &Delivery,
        error: &ProcessingError,
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> ConsumerResult<DeliveryOutcome> {
        let attempt = delivery.retry_count.saturating_add(1);
        let max_attempts = self.retry_policy.max_attempts;
        error!(
            offset = delivery.position.offset,
            kind = error.kind(),
            "Failed to process delivery, attempt {}/{}: {}",
            attempt,
            max_attempts,
            error
        );

        match self.retry_policy.decide(delivery.retry_count) {
            RetryDecision::Requeue {
                next_retry_count,
                delay,
            } => {
                if !delay.is_zero() && !*shutdown_rx.borrow() {
                    debug!("Requeueing in {:?}", delay);
                    tokio::select! {
                        _ = tokio::time::sleep(delay) => {}
                        _ = shutdown_rx.changed() => {
                            debug!("Shutdown during requeue delay, requeueing now");
                        }
                    }
                }
                self.settle(|channel| channel.requeue(delivery, next_retry_count))
                    .await?;
                Ok(DeliveryOutcome::Requeued(next_retry_count))
            }
            RetryDecision::DeadLetter { attempts } => {
                let reason = format!("{} after {} attempts", error, attempts);
                self.settle(|channel| channel.dead_letter(delivery, &reason))
                    .await?;
                error!(
                    offset = delivery.position.offset,
                    "Delivery dead-lettered after {}/{} attempts: {}",
                    attempts,
                    max_attempts,
                    error
                );
                Ok(DeliveryOutcome::DeadLettered(attempts))
            }
        }
    }

    async fn settle<'a, F, Fut>(&'a self, mut operation: F) -> ConsumerResult<()>
    where
        F: FnMut(&'a C) -> Fut,
        Fut: Future<Output = ConsumerResult<()>>,
    {
        let channel = self.channel.as_ref();
        let executor = RetryExecutor::new(SETTLE_RETRIES, SETTLE_BACKOFF);
        match executor
            .execute_with_predicate(move || operation(channel), ConsumerError::is_retryable)
            .await
        {
            RetryResult::Success { .. } => Ok(()),
            RetryResult::Failed { error, attempts } => {
                error!("Settling delivery failed after {} retries: {}", attempts, error);
                Err(error)
            }
        }
    }

    fn spawn_metrics_reporter(&self, mut shutdown_rx: watch::Receiver<bool>) -> Option<JoinHandle<()>> {
        if self.metrics_interval.is_zero() {
            return None;
        }
        let metrics = self.metrics.clone();
        let interval = self.metrics_interval;

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let snapshot = metrics.snapshot();
                        info!(
                            "Consumer stats - Settled/sec: {:.2}, received: {}, requeued: {}, dead-lettered: {}, store failures: {}",
                            metrics.settled_per_second(),
                            snapshot.received,
                            snapshot.requeued,
                            snapshot.dead_lettered,
                            snapshot.store_failures
                        );
                    }
                    changed = shutdown_rx.changed() => {
                        if changed.is_err() || *shutdown_rx.borrow() {
                            break;
                        }
                    }
                }
            }
        }))
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Handle to a consumer running on a background task
pub struct ConsumerHandle {
    shutdown_tx: watch::Sender<bool>,
    task: JoinHandle<ConsumerResult<()>>,
    metrics: Arc<ConsumerMetrics>,
    shutdown_state: Arc<ShutdownState>,
    shutdown_timeout: Duration,
}

impl ConsumerHandle {
    /// Metrics of the running consumer
    pub fn metrics(&self) -> &Arc<ConsumerMetrics> {
        &self.metrics
    }

    /// Whether the consumer task already stopped
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the loop to settle its in-flight delivery,
    /// at most `shutdown_timeout`. On timeout the task is aborted.
    pub async fn shutdown(mut self) -> ConsumerResult<()> {
        info!("Initiating consumer shutdown");
        self.shutdown_state.begin_shutdown();
        self.shutdown_tx.send(true).ok();

        match tokio::time::timeout(self.shutdown_timeout, &mut self.task).await {
            Ok(joined) => flatten(joined),
            Err(_) => {
                let inflight = self.shutdown_state.inflight_count();
                self.task.abort();
                error!(
                    "Shutdown timeout reached with {} deliveries still in flight",
                    inflight
                );
                Err(ConsumerError::ShutdownError(format!(
                    "consumer did not stop within {:?} ({} in flight)",
                    self.shutdown_timeout, inflight
                )))
            }
        }
    }

    /// Run until `signal` resolves, then shut down. Returns early if the
    /// consumer stops on its own.
    pub async fn run_until<F>(mut self, signal: F) -> ConsumerResult<()>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            joined = &mut self.task => return flatten(joined),
            _ = signal => {}
        }
        self.shutdown().await
    }
}

fn flatten(joined: Result<ConsumerResult<()>, tokio::task::JoinError>) -> ConsumerResult<()> {
    joined.map_err(|e| ConsumerError::ShutdownError(format!("consumer task failed: {}", e)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::memory::{MemoryChannel, Settlement};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingProcessor {
        calls: AtomicU32,
    }

    #[async_trait]
    impl MessageProcessor for FailingProcessor {
        async fn process(&self, _delivery: &Delivery) -> Result<(), ProcessingError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(ProcessingError::Unexpected("boom".to_string()))
        }
    }

    fn config(max_attempts: u32) -> ConsumerConfig {
        ConsumerConfig::builder()
            .retry_policy(RetryPolicy::immediate(max_attempts))
            .metrics_interval(Duration::ZERO)
            .build()
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(&*boxed), "boom");
        let boxed: Box<dyn Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(&*boxed), "bang");
        let boxed: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(&*boxed), "unknown panic");
    }

    #[tokio::test]
    async fn test_handle_delivery_walks_retry_ladder() {
        let channel = MemoryChannel::new("alert-created");
        channel.publish(b"{}".to_vec()).unwrap();
        let consumer = AlertConsumer::new(
            &config(2),
            channel,
            FailingProcessor {
                calls: AtomicU32::new(0),
            },
        );
        let (_tx, mut rx) = watch::channel(false);

        let first = consumer.channel.next_delivery().await.unwrap().unwrap();
        let outcome = consumer.handle_delivery(&first, &mut rx).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::Requeued(1));

        let second = consumer.channel.next_delivery().await.unwrap().unwrap();
        let outcome = consumer.handle_delivery(&second, &mut rx).await.unwrap();
        assert_eq!(outcome, DeliveryOutcome::DeadLettered(2));

        let settled = consumer.channel.settled();
        assert_eq!(settled[0].settlement, Settlement::Requeued(1));
        assert!(matches!(settled[1].settlement, Settlement::DeadLettered(_)));
        assert_eq!(consumer.processor.calls.load(Ordering::SeqCst), 2);

        let snapshot = consumer.metrics.snapshot();
        assert_eq!(snapshot.received, 2);
        assert_eq!(snapshot.requeued, 1);
        assert_eq!(snapshot.dead_lettered, 1);
        assert_eq!(snapshot.unexpected_failures, 2);
    }
}
