//! Progress-callback trait for per-row batch events.
//!
//! Inject an [`Arc<dyn BatchProgressCallback>`] via
//! [`crate::config::PipelineConfigBuilder::progress_callback`] to receive
//! events as the driver works through the sheet.
//!
//! # Example
//!
//! ```rust
//! use artfetch::{BatchProgressCallback, DownloadOutcome};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! struct CountingCallback {
//!     fetched: AtomicUsize,
//! }
//!
//! impl BatchProgressCallback for CountingCallback {
//!     fn on_fetch_complete(&self, _row: usize, _column: &str, outcome: &DownloadOutcome) {
//!         if outcome.is_available() {
//!             self.fetched.fetch_add(1, Ordering::SeqCst);
//!         }
//!     }
//! }
//! ```

use crate::output::{BatchStats, DownloadOutcome};
use std::sync::Arc;

/// Called by the batch driver as it processes rows.
///
/// With a worker pool configured, `on_fetch_complete` and `on_row_complete`
/// may be called concurrently and out of row order. Implementations must
/// protect shared state themselves.
pub trait BatchProgressCallback: Send + Sync {
    /// Called once after filtering, before the first fetch.
    ///
    /// # Arguments
    /// * `total_rows`: rows that will be processed
    fn on_batch_start(&self, total_rows: usize) {
        let _ = total_rows;
    }

    /// Called before each chunk in sequential mode.
    ///
    /// # Arguments
    /// * `start`: 0-indexed first row of the chunk
    /// * `end`: exclusive end row
    fn on_chunk_start(&self, start: usize, end: usize) {
        let _ = (start, end);
    }

    /// Called after each (row, URL column) is resolved.
    fn on_fetch_complete(&self, row: usize, column: &str, outcome: &DownloadOutcome) {
        let _ = (row, column, outcome);
    }

    /// Called after every URL column of a row is resolved.
    fn on_row_complete(&self, row: usize, total_rows: usize) {
        let _ = (row, total_rows);
    }

    /// Called once after all rows have been attempted.
    fn on_batch_complete(&self, stats: &BatchStats) {
        let _ = stats;
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl BatchProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn BatchProgressCallback>;
