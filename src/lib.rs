//! # artfetch
//!
//! Read a spreadsheet of product records, drop rows that fail data-quality
//! rules, download each row's artwork images, and write the local paths (or
//! clickable `=HYPERLINK(..)` formulas) back into new columns.
//!
//! ## Pipeline Overview
//!
//! ```text
//! XLSX
//!  │
//!  ├─ 1. Load     first sheet (or a named one) via calamine
//!  ├─ 2. Validate every configured column exists, fail before any request
//!  ├─ 3. Filter   date-like ids out, TIN pattern in, required cells present
//!  ├─ 4. Fetch    per row and URL column: reuse existing file, else HTTP GET
//!  │              (PDF payloads → first page rasterised via pdfium)
//!  ├─ 5. Write    paths / sentinels / hyperlink formulas via rust_xlsxwriter
//!  └─ 6. Merge    optional inner join with a reference sheet
//! ```
//!
//! A fetch that fails is recorded as `DOWNLOAD_FAILED` and the batch moves
//! on. Re-running is cheap: destinations that already exist are never
//! requested again (a truncated file from an earlier run is not retried).
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use artfetch::{run, FilterRules, OutputMode, PipelineConfig, UrlColumn};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder()
//!         .input_path("Medical Devices.xlsx")
//!         .output_path("data_updated.xlsx")
//!         .id_column("NAFDACNumber")
//!         .url_column(UrlColumn::new("ProductFrontViewArtwork", "local_path_front", "front"))
//!         .url_column(UrlColumn::new("ProductWholeViewArtwork", "local_path_whole", "whole"))
//!         .status_column("Status")
//!         .filter(FilterRules::registration(
//!             "NAFDACNumber",
//!             "TIN",
//!             &["NAFDACNumber", "TIN", "ProductFrontViewArtwork", "ProductWholeViewArtwork"],
//!         ))
//!         .output_mode(OutputMode::Hyperlink)
//!         .build()?;
//!     let output = run(&config).await?;
//!     eprintln!("downloaded {} files", output.stats.downloaded);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `artfetch` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! PDF artwork needs a pdfium shared library at runtime: set `PDFIUM_LIB_PATH`,
//! place it in the working directory, or install it system-wide.

// ── Modules ──────────────────────────────────────────────────────────────

pub mod batch;
pub mod config;
pub mod dataset;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use batch::{process_dataset, run, run_sync, run_with_fetcher, validate_schema};
pub use config::{
    ColumnPattern, FilterRules, MergeConfig, OutputMode, PipelineConfig, PipelineConfigBuilder,
    UrlColumn, DOWNLOAD_FAILED, ROW_DOWNLOAD_FAILED,
};
pub use dataset::{Cell, Dataset, Hyperlink};
pub use error::{ArtfetchError, FetchError};
pub use output::{BatchOutput, BatchStats, DownloadOutcome, RowReport};
pub use pipeline::fetch::{ArtifactFetcher, FetchedArtifact, HttpFetcher};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
