//! Graceful shutdown state of the consumer

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Tracks whether shutdown began and how many deliveries are mid-flight
#[derive(Debug, Default)]
pub struct ShutdownState {
    shutting_down: AtomicBool,
    shutdown_complete: AtomicBool,
    inflight_messages: AtomicUsize,
    shutdown_start: Mutex<Option<Instant>>,
}

impl ShutdownState {
    /// Create a new shutdown state
    pub fn new() -> Self {
        Self::default()
    }

    /// Begin the shutdown process
    pub fn begin_shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            *self.shutdown_start.lock() = Some(Instant::now());
            info!("Shutdown initiated");
        }
    }

    /// Check if shutdown is in progress
    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Complete the shutdown process
    pub fn complete_shutdown(&self) {
        self.shutdown_complete.store(true, Ordering::SeqCst);
        if let Some(duration) = self.shutdown_duration() {
            info!("Shutdown completed in {:?}", duration);
        }
    }

    /// Check if shutdown is complete
    pub fn is_shutdown_complete(&self) -> bool {
        self.shutdown_complete.load(Ordering::SeqCst)
    }

    /// Add an in-flight message
    pub fn add_inflight_message(&self) {
        let count = self.inflight_messages.fetch_add(1, Ordering::SeqCst) + 1;
        debug!("In-flight messages: {}", count);
    }

    /// Remove an in-flight message
    pub fn remove_inflight_message(&self) {
        let previous = self
            .inflight_messages
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .unwrap_or(0);
        debug!("In-flight messages: {}", previous.saturating_sub(1));
    }

    /// Get the count of in-flight messages
    pub fn inflight_count(&self) -> usize {
        self.inflight_messages.load(Ordering::SeqCst)
    }

    /// Get the duration since shutdown started
    pub fn shutdown_duration(&self) -> Option<Duration> {
        self.shutdown_start.lock().map(|start| start.elapsed())
    }
}
