//! Plot persistence seam and the status updater built on it
//!
//! The registration service owns plots. This crate only needs to read a plot
//! and overwrite its status, so the store is a narrow async trait.

use crate::event::PlotId;
use crate::status::{PlotStatus, StatusCode};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

pub mod memory;
pub mod updater;

pub use memory::InMemoryPlotStore;
pub use updater::{StatusUpdater, UpdateError, UpdateOutcome};

/// A planting area inside a rural property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plot {
    /// Identifier
    pub id: PlotId,
    /// Display name
    #[serde(default)]
    pub name: Option<String>,
    /// Current status code
    #[serde(default)]
    pub status: StatusCode,
    /// Current status description
    #[serde(default)]
    pub status_description: Option<String>,
    /// Last status write
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Plot {
    /// New plot in `Normal` status
    pub fn new(id: PlotId) -> Self {
        Self {
            id,
            name: None,
            status: StatusCode::Normal,
            status_description: None,
            updated_at: None,
        }
    }

    /// Description to show, falling back to the status label
    pub fn status_text(&self) -> &str {
        self.status_description
            .as_deref()
            .unwrap_or_else(|| self.status.label())
    }

    /// Whether this plot already carries the given code and description
    pub fn has_status(&self, code: StatusCode, description: &str) -> bool {
        self.status == code && self.status_text() == description
    }
}

/// Store failures. All of them are transient from the consumer's view.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Backend refused or dropped the request
    #[error("plot store unavailable: {0}")]
    Unavailable(String),

    /// Call exceeded its time bound
    #[error("plot store call timed out after {0:?}")]
    Timeout(Duration),
}

/// Persistence operations the consumer relies on
#[async_trait]
pub trait PlotStore: Send + Sync + 'static {
    /// Fetch a plot by id
    async fn get(&self, id: &PlotId) -> Result<Option<Plot>, StoreError>;

    /// Overwrite status, description and timestamp. Returns `false` when the
    /// plot no longer exists.
    async fn update_status(&self, id: &PlotId, status: &PlotStatus) -> Result<bool, StoreError>;
}

#[async_trait]
impl<S: PlotStore + ?Sized> PlotStore for Arc<S> {
    async fn get(&self, id: &PlotId) -> Result<Option<Plot>, StoreError> {
        (**self).get(id).await
    }

    async fn update_status(&self, id: &PlotId, status: &PlotStatus) -> Result<bool, StoreError> {
        (**self).update_status(id, status).await
    }
}
