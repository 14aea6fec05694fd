//! Consumer configuration structures

use crate::consumer::error::{ConsumerError, ConsumerResult};
use crate::consumer::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Alert consumer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsumerConfig {
    /// Start the consumer at all
    pub enabled: bool,

    /// Kafka broker addresses (comma-separated)
    pub brokers: String,

    /// Consumer group ID
    pub group_id: String,

    /// Inbound queue (topic) carrying alert-created events
    pub queue_name: String,

    /// Queue receiving deliveries that exhausted their attempts
    pub dead_letter_queue_name: String,

    /// Requeue and dead-letter policy
    pub retry_policy: RetryPolicy,

    /// Bound on each plot store call
    pub store_timeout: Duration,

    /// Timeout for connecting and declaring topics
    pub connection_timeout: Duration,

    /// Timeout for publishing requeued or dead-lettered messages
    pub send_timeout: Duration,

    /// How long shutdown waits for the in-flight delivery
    pub shutdown_timeout: Duration,

    /// Interval of the metrics log line; zero disables it
    pub metrics_interval: Duration,

    /// Partitions used when the topics have to be created
    pub topic_partitions: i32,

    /// Replication factor used when the topics have to be created
    pub topic_replication: i32,

    /// Session timeout in milliseconds
    pub session_timeout_ms: u32,

    /// Additional Kafka properties
    pub kafka_properties: HashMap<String, String>,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            brokers: "localhost:9092".to_string(),
            group_id: "plot-alert-sync".to_string(),
            queue_name: "alert-created".to_string(),
            dead_letter_queue_name: "alert-created-dlq".to_string(),
            retry_policy: RetryPolicy::default(),
            store_timeout: Duration::from_secs(5),
            connection_timeout: Duration::from_secs(30),
            send_timeout: Duration::from_secs(10),
            shutdown_timeout: Duration::from_secs(30),
            metrics_interval: Duration::from_secs(60),
            topic_partitions: 1,
            topic_replication: 1,
            session_timeout_ms: 30000,
            kafka_properties: HashMap::new(),
        }
    }
}

/// Builder for ConsumerConfig
pub struct ConsumerConfigBuilder {
    config: ConsumerConfig,
}

impl ConsumerConfigBuilder {
    /// Create a new consumer config builder
    pub fn new() -> Self {
        Self {
            config: ConsumerConfig::default(),
        }
    }

    /// Enable or disable the consumer
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.config.enabled = enabled;
        self
    }

    /// Set the broker addresses
    pub fn brokers(mut self, brokers: impl Into<String>) -> Self {
        self.config.brokers = brokers.into();
        self
    }

    /// Set the consumer group ID
    pub fn group_id(mut self, group_id: impl Into<String>) -> Self {
        self.config.group_id = group_id.into();
        self
    }

    /// Set the inbound queue
    pub fn queue_name(mut self, name: impl Into<String>) -> Self {
        self.config.queue_name = name.into();
        self
    }

    /// Set the dead-letter queue
    pub fn dead_letter_queue_name(mut self, name: impl Into<String>) -> Self {
        self.config.dead_letter_queue_name = name.into();
        self
    }

    /// Set total attempts per message
    pub fn max_retry_attempts(mut self, attempts: u32) -> Self {
        self.config.retry_policy.max_attempts = attempts;
        self
    }

    /// Set the retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.config.retry_policy = policy;
        self
    }

    /// Set the plot store call bound
    pub fn store_timeout(mut self, timeout: Duration) -> Self {
        self.config.store_timeout = timeout;
        self
    }

    /// Set the shutdown wait bound
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.config.shutdown_timeout = timeout;
        self
    }

    /// Set the metrics reporting interval
    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.config.metrics_interval = interval;
        self
    }

    /// Add a custom Kafka property
    pub fn kafka_property(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.kafka_properties.insert(key.into(), value.into());
        self
    }

    /// Build the consumer configuration
    pub fn build(self) -> ConsumerConfig {
        self.config
    }
}

impl Default for ConsumerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsumerConfig {
    /// Create a new consumer config builder
    pub fn builder() -> ConsumerConfigBuilder {
        ConsumerConfigBuilder::new()
    }

    /// Load from a YAML file; missing keys take their defaults
    pub fn from_yaml_file(path: impl AsRef<Path>) -> ConsumerResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&raw)
    }

    /// Parse from YAML text
    pub fn from_yaml_str(raw: &str) -> ConsumerResult<Self> {
        let config: ConsumerConfig = serde_yaml::from_str(raw)?;
        config.validate().map_err(ConsumerError::ConfigError)?;
        Ok(config)
    }

    /// Total attempts per message
    pub fn max_retry_attempts(&self) -> u32 {
        self.retry_policy.max_attempts
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.brokers.trim().is_empty() {
            return Err("Brokers cannot be empty".to_string());
        }

        if self.group_id.trim().is_empty() {
            return Err("Group ID cannot be empty".to_string());
        }

        if self.queue_name.trim().is_empty() {
            return Err("Queue name cannot be empty".to_string());
        }

        if self.dead_letter_queue_name.trim().is_empty() {
            return Err("Dead-letter queue name cannot be empty".to_string());
        }

        if self.queue_name == self.dead_letter_queue_name {
            return Err("Dead-letter queue must differ from the inbound queue".to_string());
        }

        if self.retry_policy.max_attempts == 0 {
            return Err("Max retry attempts must be at least 1".to_string());
        }

        if self.store_timeout.is_zero() {
            return Err("Store timeout must be greater than 0".to_string());
        }

        if self.connection_timeout.is_zero() || self.send_timeout.is_zero() {
            return Err("Broker timeouts must be greater than 0".to_string());
        }

        if self.shutdown_timeout.is_zero() {
            return Err("Shutdown timeout must be greater than 0".to_string());
        }

        if self.topic_partitions < 1 || self.topic_replication < 1 {
            return Err("Topic partitions and replication must be at least 1".to_string());
        }

        Ok(())
    }
}
