//! Message processor trait and the alert-to-status implementation

use crate::consumer::channel::Delivery;
use crate::consumer::error::ProcessingError;
use crate::event;
use crate::plot::{PlotStore, StatusUpdater, UpdateOutcome};
use crate::status::{status_code, status_description};
use async_trait::async_trait;
use tracing::{debug, info};

/// Processes the payload of one delivery
#[async_trait]
pub trait MessageProcessor: Send + Sync + 'static {
    /// Process a single delivery. Settling is the caller's job.
    async fn process(&self, delivery: &Delivery) -> Result<(), ProcessingError>;

    /// Get processor name for logs
    fn name(&self) -> &str {
        "MessageProcessor"
    }
}

/// Decode → map → update pipeline for alert-created events
pub struct AlertStatusProcessor<S> {
    updater: StatusUpdater<S>,
}

impl<S: PlotStore> AlertStatusProcessor<S> {
    /// Processor writing through `updater`
    pub fn new(updater: StatusUpdater<S>) -> Self {
        Self { updater }
    }

    /// The updater in use
    pub fn updater(&self) -> &StatusUpdater<S> {
        &self.updater
    }
}

#[async_trait]
impl<S: PlotStore> MessageProcessor for AlertStatusProcessor<S> {
    async fn process(&self, delivery: &Delivery) -> Result<(), ProcessingError> {
        let alert = event::decode(&delivery.payload)?;

        let code = status_code(alert.severity);
        let description = status_description(&alert.kind, alert.severity);
        debug!(
            plot_id = %alert.plot_id,
            alert_id = alert.alert_id.as_deref().unwrap_or("-"),
            kind = %alert.kind,
            severity = %alert.severity,
            "Mapped alert to status {}",
            code
        );

        match self.updater.apply(&alert.plot_id, code, description).await? {
            UpdateOutcome::Updated(status) => info!(
                plot_id = %alert.plot_id,
                alert_id = alert.alert_id.as_deref().unwrap_or("-"),
                "Plot status updated to {} ({})",
                status.code,
                status.description
            ),
            UpdateOutcome::Unchanged(status) => info!(
                plot_id = %alert.plot_id,
                alert_id = alert.alert_id.as_deref().unwrap_or("-"),
                "Plot status already {} ({}), refreshed at {}",
                status.code,
                status.description,
                status.updated_at
            ),
        }

        Ok(())
    }

    fn name(&self) -> &str {
        "AlertStatusProcessor"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consumer::channel::DeliveryPosition;
    use crate::event::PlotId;
    use crate::plot::{InMemoryPlotStore, Plot};
    use crate::status::StatusCode;
    use std::sync::Arc;
    use std::time::Duration;

    fn delivery(payload: &str) -> Delivery {
        Delivery::new(
            payload.as_bytes().to_vec(),
            None,
            vec![],
            DeliveryPosition {
                queue: "alert-created".to_string(),
                partition: 0,
                offset: 0,
            },
        )
    }

    fn processor(store: Arc<InMemoryPlotStore>) -> AlertStatusProcessor<Arc<InMemoryPlotStore>> {
        AlertStatusProcessor::new(StatusUpdater::new(store, Duration::from_secs(1)))
    }

    #[tokio::test]
    async fn test_process_updates_plot() {
        let id = PlotId::new("P1").unwrap();
        let store = Arc::new(InMemoryPlotStore::with_plots([Plot::new(id.clone())]));

        processor(store.clone())
            .process(&delivery(r#"{"plotId": "P1", "alertKind": "temperature", "severity": "high"}"#))
            .await
            .unwrap();

        let plot = store.snapshot(&id).unwrap();
        assert_eq!(plot.status, StatusCode::Critical);
        assert_eq!(plot.status_text(), "Critical – thermal stress");
    }

    #[tokio::test]
    async fn test_process_classifies_failures() {
        let store = Arc::new(InMemoryPlotStore::new());
        let processor = processor(store);

        let err = processor.process(&delivery(r#"{"severity": "high"}"#)).await.unwrap_err();
        assert!(matches!(err, ProcessingError::Decode(_)));

        let err = processor
            .process(&delivery(r#"{"plotId": "missing", "severity": "high"}"#))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessingError::NotFound(_)));
        assert!(!err.is_retryable());
    }
}
