//! Idempotent status writes through a [`PlotStore`]

use super::{PlotStore, StoreError};
use crate::event::PlotId;
use crate::status::{PlotStatus, StatusCode};
use chrono::Utc;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

/// Why a status could not be applied
#[derive(Error, Debug, Clone, PartialEq)]
pub enum UpdateError {
    /// Plot does not exist; retrying cannot help
    #[error("plot {0} not found")]
    NotFound(PlotId),

    /// Transient store failure
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Result of a successful apply
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOutcome {
    /// Status was written with a new code or description
    Updated(PlotStatus),
    /// Plot already carried this code and description; only the timestamp moved
    Unchanged(PlotStatus),
}

/// Applies computed statuses to plots
#[derive(Debug)]
pub struct StatusUpdater<S> {
    store: S,
    timeout: Duration,
}

impl<S: PlotStore> StatusUpdater<S> {
    /// Updater bounding every store call by `timeout`
    pub fn new(store: S, timeout: Duration) -> Self {
        Self { store, timeout }
    }

    /// Underlying store
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Read the plot and overwrite its status code, description and timestamp.
    ///
    /// Re-applying the same code and description leaves both unchanged, so a
    /// redelivered event only moves `updated_at`.
    pub async fn apply(
        &self,
        plot_id: &PlotId,
        code: StatusCode,
        description: &str,
    ) -> Result<UpdateOutcome, UpdateError> {
        let plot = self
            .bounded(self.store.get(plot_id))
            .await?
            .ok_or_else(|| UpdateError::NotFound(plot_id.clone()))?;

        let status = PlotStatus::new(code, description, Utc::now());
        let unchanged = plot.has_status(status.code, &status.description);

        // plot may be deleted between the read and the write
        if !self.bounded(self.store.update_status(plot_id, &status)).await? {
            return Err(UpdateError::NotFound(plot_id.clone()));
        }

        if unchanged {
            debug!(plot_id = %plot_id, code = %code, "Plot already had this status, timestamp refreshed");
            Ok(UpdateOutcome::Unchanged(status))
        } else {
            Ok(UpdateOutcome::Updated(status))
        }
    }

    async fn bounded<T, F>(&self, call: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        tokio::time::timeout(self.timeout, call)
            .await
            .map_err(|_| StoreError::Timeout(self.timeout))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::{InMemoryPlotStore, Plot};
    use async_trait::async_trait;
    use mockall::mock;
    use std::sync::Arc;

    mock! {
        Store {}

        #[async_trait]
        impl PlotStore for Store {
            async fn get(&self, id: &PlotId) -> Result<Option<Plot>, StoreError>;
            async fn update_status(&self, id: &PlotId, status: &PlotStatus) -> Result<bool, StoreError>;
        }
    }

    struct HangingStore;

    #[async_trait]
    impl PlotStore for HangingStore {
        async fn get(&self, _id: &PlotId) -> Result<Option<Plot>, StoreError> {
            std::future::pending().await
        }

        async fn update_status(&self, _id: &PlotId, _status: &PlotStatus) -> Result<bool, StoreError> {
            std::future::pending().await
        }
    }

    fn id(raw: &str) -> PlotId {
        PlotId::new(raw).unwrap()
    }

    #[tokio::test]
    async fn test_apply_writes_status() {
        let store = Arc::new(InMemoryPlotStore::with_plots([Plot::new(id("P1"))]));
        let updater = StatusUpdater::new(store.clone(), Duration::from_secs(1));

        let outcome = updater
            .apply(&id("P1"), StatusCode::Critical, "Critical – drought detected")
            .await
            .unwrap();

        assert!(matches!(outcome, UpdateOutcome::Updated(_)));
        let plot = store.snapshot(&id("P1")).unwrap();
        assert_eq!(plot.status, StatusCode::Critical);
        assert_eq!(plot.status_text(), "Critical – drought detected");
        assert!(plot.updated_at.is_some());
    }

    #[tokio::test]
    async fn test_apply_twice_is_idempotent() {
        let store = Arc::new(InMemoryPlotStore::with_plots([Plot::new(id("P1"))]));
        let updater = StatusUpdater::new(store.clone(), Duration::from_secs(1));

        updater
            .apply(&id("P1"), StatusCode::Alert, "Alert – drought risk")
            .await
            .unwrap();
        let first = store.snapshot(&id("P1")).unwrap();

        let outcome = updater
            .apply(&id("P1"), StatusCode::Alert, "Alert – drought risk")
            .await
            .unwrap();
        let second = store.snapshot(&id("P1")).unwrap();

        assert!(matches!(outcome, UpdateOutcome::Unchanged(_)));
        assert_eq!(second.status, first.status);
        assert_eq!(second.status_text(), first.status_text());
        assert!(second.updated_at >= first.updated_at);
    }

    #[tokio::test]
    async fn test_low_alert_on_fresh_plot_records_status() {
        let store = Arc::new(InMemoryPlotStore::with_plots([Plot::new(id("P1"))]));
        let updater = StatusUpdater::new(store.clone(), Duration::from_secs(1));

        let outcome = updater
            .apply(&id("P1"), StatusCode::Normal, "Normal")
            .await
            .unwrap();

        assert!(matches!(outcome, UpdateOutcome::Unchanged(_)));
        let plot = store.snapshot(&id("P1")).unwrap();
        assert_eq!(plot.status_description.as_deref(), Some("Normal"));
        assert!(plot.updated_at.is_some());
        assert_eq!(store.write_count(), 1);
    }

    #[tokio::test]
    async fn test_plot_deleted_between_read_and_write() {
        let mut store = MockStore::new();
        store
            .expect_get()
            .times(1)
            .returning(|id| Ok(Some(Plot::new(id.clone()))));
        store.expect_update_status().times(1).returning(|_, _| Ok(false));

        let updater = StatusUpdater::new(store, Duration::from_secs(1));
        let result = updater
            .apply(&id("P1"), StatusCode::Critical, "Critical – flood risk")
            .await;

        assert_eq!(result, Err(UpdateError::NotFound(id("P1"))));
    }

    #[tokio::test]
    async fn test_apply_missing_plot() {
        let updater = StatusUpdater::new(InMemoryPlotStore::new(), Duration::from_secs(1));
        let result = updater.apply(&id("nope"), StatusCode::Alert, "x").await;
        assert_eq!(result, Err(UpdateError::NotFound(id("nope"))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_store_times_out() {
        let updater = StatusUpdater::new(HangingStore, Duration::from_millis(250));
        let result = updater.apply(&id("P1"), StatusCode::Alert, "x").await;
        assert_eq!(
            result,
            Err(UpdateError::Store(StoreError::Timeout(Duration::from_millis(250))))
        );
    }
}
