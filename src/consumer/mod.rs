//! Alert-created consumer
//!
//! This module keeps plot statuses in sync with the alert stream:
//! - a broker-neutral [`DeliveryChannel`] with Kafka and in-memory bindings
//! - requeue with a carried retry counter, dead-letter once attempts run out
//! - decode failures and unknown plots are acknowledged and dropped
//! - graceful shutdown that settles the in-flight delivery
//!
//! # Example
//!
//! ```no_run
//! use plot_alert_sync::consumer::{AlertConsumer, AlertStatusProcessor, ConsumerConfig, MemoryChannel};
//! use plot_alert_sync::plot::{InMemoryPlotStore, StatusUpdater};
//! use std::sync::Arc;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = ConsumerConfig::default();
//! let store = Arc::new(InMemoryPlotStore::new());
//! let processor = AlertStatusProcessor::new(StatusUpdater::new(store, config.store_timeout));
//!
//! let channel = MemoryChannel::new(config.queue_name.clone());
//! channel.publish(br#"{"plotId": "P1", "alertKind": "soil_moisture", "severity": "high"}"#.to_vec())?;
//!
//! let handle = AlertConsumer::new(&config, channel, processor).spawn();
//! handle.shutdown().await?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod consumer;
#[cfg(feature = "kafka")]
pub mod dlq;
pub mod error;
#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;
pub mod metrics;
pub mod processor;
pub mod retry;
pub mod shutdown;

pub use channel::{Delivery, DeliveryChannel, DeliveryPosition, RETRY_COUNT_HEADER};
pub use config::{ConsumerConfig, ConsumerConfigBuilder};
pub use consumer::{AlertConsumer, ConsumerHandle, DeliveryOutcome};
#[cfg(feature = "kafka")]
pub use dlq::DlqProducer;
pub use error::{ConsumerError, ConsumerResult, ProcessingError};
#[cfg(feature = "kafka")]
pub use kafka::{connect, KafkaChannel};
pub use memory::{MemoryChannel, Settlement, SettledDelivery};
pub use metrics::{ConsumerMetrics, MetricsSnapshot};
pub use processor::{AlertStatusProcessor, MessageProcessor};
pub use retry::{RetryDecision, RetryExecutor, RetryPolicy, RetryResult};
pub use shutdown::ShutdownState;

#[cfg(feature = "kafka")]
use crate::plot::{PlotStore, StatusUpdater};
#[cfg(feature = "kafka")]
use tracing::info;

/// Connect to Kafka and wire an alert consumer writing to `store`
#[cfg(feature = "kafka")]
pub async fn create_alert_consumer<S: PlotStore>(
    config: &ConsumerConfig,
    store: S,
) -> ConsumerResult<AlertConsumer<KafkaChannel, AlertStatusProcessor<S>>> {
    info!(
        brokers = %config.brokers,
        group_id = %config.group_id,
        queue = %config.queue_name,
        "Creating alert consumer"
    );
    let channel = connect(config).await?;
    let processor = AlertStatusProcessor::new(StatusUpdater::new(store, config.store_timeout));
    Ok(AlertConsumer::new(config, channel, processor))
}
