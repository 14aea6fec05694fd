//! Consumer error types

use crate::event::DecodeError;
use crate::plot::{StoreError, UpdateError};
use std::io;
use thiserror::Error;

/// Result type for consumer operations
pub type ConsumerResult<T> = Result<T, ConsumerError>;

/// Failures of the consumer itself, as opposed to a single delivery
#[derive(Error, Debug)]
pub enum ConsumerError {
    /// Kafka client errors
    #[cfg(feature = "kafka")]
    #[error("Kafka error: {0}")]
    KafkaError(#[from] rdkafka::error::KafkaError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Broker unreachable or topology could not be declared
    #[error("Connection error: {0}")]
    ConnectionError(String),

    /// Ack, requeue or dead-letter call failed
    #[error("Channel error: {0}")]
    ChannelError(String),

    /// Dead-letter publish failed
    #[error("DLQ error: {0}")]
    DlqError(String),

    /// Shutdown errors
    #[error("Shutdown error: {0}")]
    ShutdownError(String),

    /// IO errors
    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    /// Configuration file could not be parsed
    #[error("Config parse error: {0}")]
    YamlError(#[from] serde_yaml::Error),
}

impl ConsumerError {
    /// Whether the host should treat this as a startup/connection failure and
    /// decide on restart itself
    pub fn is_connection_failure(&self) -> bool {
        match self {
            ConsumerError::ConnectionError(_) => true,
            #[cfg(feature = "kafka")]
            ConsumerError::KafkaError(_) => true,
            _ => false,
        }
    }

    /// Process exit code for a consumer that stopped with this error. A
    /// broker that cannot be reached exits with 2 so supervisors can tell it
    /// apart from other failures.
    pub fn exit_code(&self) -> i32 {
        if self.is_connection_failure() {
            2
        } else {
            1
        }
    }

    /// Whether a settle call that failed this way is worth repeating
    pub fn is_retryable(&self) -> bool {
        match self {
            #[cfg(feature = "kafka")]
            ConsumerError::KafkaError(_) => true,
            ConsumerError::ConnectionError(_) => true,
            ConsumerError::ChannelError(_) => true,
            ConsumerError::DlqError(_) => true,
            ConsumerError::IoError(_) => true,
            ConsumerError::ConfigError(_) => false,
            ConsumerError::ShutdownError(_) => false,
            ConsumerError::YamlError(_) => false,
        }
    }
}

/// Failure while processing one delivery
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// Payload can never decode
    #[error("decode failed: {0}")]
    Decode(#[from] DecodeError),

    /// Target plot is gone
    #[error("{0}")]
    NotFound(String),

    /// Plot store failed or timed out
    #[error("store failed: {0}")]
    Store(#[from] StoreError),

    /// Anything else, including a panic inside processing
    #[error("unexpected failure: {0}")]
    Unexpected(String),
}

impl ProcessingError {
    /// Only store and unexpected failures are retried
    pub fn is_retryable(&self) -> bool {
        match self {
            ProcessingError::Decode(_) | ProcessingError::NotFound(_) => false,
            ProcessingError::Store(_) | ProcessingError::Unexpected(_) => true,
        }
    }

    /// Short label for metrics and logs
    pub fn kind(&self) -> &'static str {
        match self {
            ProcessingError::Decode(_) => "decode",
            ProcessingError::NotFound(_) => "not_found",
            ProcessingError::Store(_) => "store",
            ProcessingError::Unexpected(_) => "unexpected",
        }
    }
}

impl From<UpdateError> for ProcessingError {
    fn from(err: UpdateError) -> Self {
        match err {
            UpdateError::NotFound(id) => ProcessingError::NotFound(format!("plot {} not found", id)),
            UpdateError::Store(e) => ProcessingError::Store(e),
        }
    }
}
