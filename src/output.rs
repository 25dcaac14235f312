//! Result types produced by a batch run.

use crate::dataset::Dataset;
use crate::error::FetchError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// What happened to one (row, URL column) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DownloadOutcome {
    /// The destination already existed; no request was made.
    Skipped { path: PathBuf },
    /// Fetched and written during this run.
    Succeeded { path: PathBuf },
    /// The fetch failed; the sentinel was recorded.
    Failed { error: FetchError },
}

impl DownloadOutcome {
    /// The artifact is on disk (reused or freshly fetched).
    pub fn is_available(&self) -> bool {
        !matches!(self, DownloadOutcome::Failed { .. })
    }
}

/// Outcomes for one row, in URL-column order. Absent URLs have no entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RowReport {
    /// 0-indexed position in the filtered dataset.
    pub row: usize,
    /// `(source column, outcome)` pairs.
    pub outcomes: Vec<(String, DownloadOutcome)>,
}

impl RowReport {
    /// At least one artwork of the row is on disk.
    pub fn any_available(&self) -> bool {
        self.outcomes.iter().any(|(_, o)| o.is_available())
    }
}

/// Run-level counters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchStats {
    /// Rows read from the input sheet.
    pub rows_loaded: usize,
    /// Rows removed by the row filter.
    pub rows_filtered_out: usize,
    /// Rows processed by the driver.
    pub rows_processed: usize,
    /// Files fetched during this run.
    pub downloaded: usize,
    /// Files that already existed and were reused.
    pub reused: usize,
    /// Fetches recorded as `DOWNLOAD_FAILED`.
    pub failed: usize,
    /// URL cells that were empty.
    pub missing_urls: usize,
    /// Rows in the merged sheet, when a merge ran.
    pub merged_rows: Option<usize>,
    /// Wall-clock time of the whole run.
    pub total_duration_ms: u64,
}

/// Everything a run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    /// The filtered, enriched dataset as written to the output sheet.
    pub dataset: Dataset,
    /// Per-row outcomes in row order.
    pub rows: Vec<RowReport>,
    pub stats: BatchStats,
    /// The merged dataset, when a merge ran.
    pub merged: Option<Dataset>,
}
