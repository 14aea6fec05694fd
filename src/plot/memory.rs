//! DashMap-backed plot store for local runs and tests

use super::{Plot, PlotStore, StoreError};
use crate::event::PlotId;
use crate::status::PlotStatus;
use anyhow::Context;
use async_trait::async_trait;
use dashmap::DashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

/// In-process plot store
#[derive(Debug, Default)]
pub struct InMemoryPlotStore {
    plots: DashMap<PlotId, Plot>,
    writes: AtomicU64,
}

impl InMemoryPlotStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with the given plots
    pub fn with_plots(plots: impl IntoIterator<Item = Plot>) -> Self {
        let store = Self::new();
        for plot in plots {
            store.insert(plot);
        }
        store
    }

    /// Load plots from a JSON array file
    pub fn from_json_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read(path)
            .with_context(|| format!("Failed to read plot file {}", path.display()))?;
        let plots: Vec<Plot> = serde_json::from_slice(&raw)
            .with_context(|| format!("Failed to parse plot file {}", path.display()))?;
        Ok(Self::with_plots(plots))
    }

    /// Insert or replace a plot
    pub fn insert(&self, plot: Plot) {
        self.plots.insert(plot.id.clone(), plot);
    }

    /// Remove a plot, returning it if present
    pub fn remove(&self, id: &PlotId) -> Option<Plot> {
        self.plots.remove(id).map(|(_, plot)| plot)
    }

    /// Snapshot of a plot
    pub fn snapshot(&self, id: &PlotId) -> Option<Plot> {
        self.plots.get(id).map(|entry| entry.value().clone())
    }

    /// Number of plots
    pub fn len(&self) -> usize {
        self.plots.len()
    }

    /// Whether the store holds no plots
    pub fn is_empty(&self) -> bool {
        self.plots.is_empty()
    }

    /// Number of successful status writes
    pub fn write_count(&self) -> u64 {
        self.writes.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl PlotStore for InMemoryPlotStore {
    async fn get(&self, id: &PlotId) -> Result<Option<Plot>, StoreError> {
        Ok(self.snapshot(id))
    }

    async fn update_status(&self, id: &PlotId, status: &PlotStatus) -> Result<bool, StoreError> {
        let Some(mut plot) = self.plots.get_mut(id) else {
            return Ok(false);
        };
        plot.status = status.code;
        plot.status_description = Some(status.description.clone());
        plot.updated_at = Some(status.updated_at);
        self.writes.fetch_add(1, Ordering::Relaxed);
        debug!(plot_id = %id, code = %status.code, "Plot status stored");
        Ok(true)
    }
}
