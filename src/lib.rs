//! Plot status synchronization from agronomic alerts
//!
//! Consumes alert-created events from a message broker and keeps the status
//! of the targeted plot (code plus a human-readable description) in line
//! with the most recent alert.
//!
//! # Example
//!
//! ```
//! use plot_alert_sync::event::{AlertKind, Severity};
//! use plot_alert_sync::status::{status_code, status_description, StatusCode};
//!
//! assert_eq!(status_code(Severity::High), StatusCode::Critical);
//! assert_eq!(
//!     status_description(&AlertKind::SoilMoisture, Severity::High),
//!     "Critical – drought detected"
//! );
//! ```
//!
//! # Kafka / Redpanda
//!
//! With the `kafka` feature, [`consumer::create_alert_consumer`] connects to
//! the broker, declares the inbound and dead-letter topics and returns a
//! consumer ready to [`spawn`](consumer::AlertConsumer::spawn).

#![warn(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![allow(clippy::module_inception)]

pub use consumer::{AlertConsumer, ConsumerConfig, ConsumerError, ConsumerResult};
pub use event::{AlertEvent, AlertKind, PlotId, Severity};
pub use plot::{InMemoryPlotStore, Plot, PlotStore, StatusUpdater};
pub use status::{PlotStatus, StatusCode};

/// Alert-created consumer and its broker bindings
pub mod consumer;

/// Alert events and payload decoding
pub mod event;

/// Plots and their storage
pub mod plot;

/// Status codes and the alert mapping
pub mod status;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the tracing subscriber with JSON output, filtered by `RUST_LOG`
pub fn init_tracing() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer().json())
        .init();
}

/// Initialize human-readable tracing at `level` (an `EnvFilter` directive).
/// Falls back to `info` when the directive does not parse.
pub fn init_custom_tracing(level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let env_filter = tracing_subscriber::EnvFilter::try_new(level)
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_is_set() {
        assert!(!VERSION.is_empty());
    }
}
