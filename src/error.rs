//! Error types for the artfetch library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ArtfetchError`]: **Fatal**: the batch cannot proceed at all
//!   (a configured column is missing, the spreadsheet cannot be read or
//!   written). Returned as `Err(ArtfetchError)` from [`crate::run`] and
//!   friends, always before any network call for schema problems.
//!
//! * [`FetchError`]: **Non-fatal**: a single (row, URL) pair failed
//!   (timeout, HTTP 404, PDF without pages). Stored inside
//!   [`crate::output::DownloadOutcome::Failed`] and written to the sheet as
//!   the `DOWNLOAD_FAILED` sentinel; the batch carries on with the next row.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the artfetch library.
///
/// Per-URL failures use [`FetchError`] and are recorded as data rather than
/// propagated here.
#[derive(Debug, Error)]
pub enum ArtfetchError {
    // ── Schema errors ─────────────────────────────────────────────────────
    /// One or more columns referenced by the configuration are absent.
    #[error("Missing required column(s): {}\nAvailable columns: {}", missing.join(", "), available.join(", "))]
    MissingColumns {
        missing: Vec<String>,
        available: Vec<String>,
    },

    /// The sheet has no header row at all.
    #[error("Sheet '{sheet}' in '{path}' is empty (no header row)")]
    EmptySheet { path: PathBuf, sheet: String },

    // ── Spreadsheet I/O ───────────────────────────────────────────────────
    /// Could not open or parse the input spreadsheet.
    #[error("Failed to read spreadsheet '{path}': {detail}")]
    SpreadsheetRead { path: PathBuf, detail: String },

    /// Could not build or save the output spreadsheet.
    #[error("Failed to write spreadsheet '{path}': {detail}")]
    SpreadsheetWrite { path: PathBuf, detail: String },

    /// Could not create the artwork output directory.
    #[error("Failed to create output directory '{path}': {source}")]
    OutputDirFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A JSON job file could not be read or parsed.
    #[error("Failed to load job file '{path}': {detail}")]
    ConfigFile { path: PathBuf, detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// A non-fatal error for a single (row, URL) fetch.
///
/// Never leaves a file at the destination path.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum FetchError {
    /// The request exceeded the configured per-request timeout.
    #[error("'{url}' timed out after {secs}s")]
    Timeout { url: String, secs: u64 },

    /// Connection, DNS, TLS or body-read failure.
    #[error("'{url}' could not be fetched: {reason}")]
    Network { url: String, reason: String },

    /// The server answered with a non-2xx status.
    #[error("'{url}' returned HTTP {status}")]
    HttpStatus { url: String, status: u16 },

    /// The PDF payload rendered to zero pages.
    #[error("'{url}' is a PDF with no pages")]
    NoPages { url: String },

    /// pdfium could not be bound, or the PDF could not be loaded or rendered.
    #[error("'{url}' PDF conversion failed: {detail}")]
    Conversion { url: String, detail: String },

    /// The row's file-name columns are empty, so no unique destination exists.
    #[error("'{url}' not fetched: the row has an empty file-name column")]
    EmptyFileName { url: String },

    /// Writing the artifact to disk failed.
    #[error("Failed to write '{path}': {detail}")]
    Io { path: PathBuf, detail: String },
}

impl FetchError {
    /// Attach the source URL to errors produced below the HTTP layer.
    pub(crate) fn with_url(self, url: &str) -> Self {
        match self {
            FetchError::NoPages { .. } => FetchError::NoPages {
                url: url.to_string(),
            },
            FetchError::Conversion { detail, .. } => FetchError::Conversion {
                url: url.to_string(),
                detail,
            },
            other => other,
        }
    }
}
