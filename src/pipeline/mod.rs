//! Pipeline stages for the spreadsheet artwork batch.
//!
//! Each submodule implements exactly one step and is testable on its own.
//! Stages exchange plain data ([`crate::dataset::Dataset`] in, `Dataset` out).
//!
//! ## Data Flow
//!
//! ```text
//! sheet ──▶ filter ──▶ naming ──▶ fetch ──▶ writer
//! (xlsx)    (rules)    (paths)   (HTTP/PDF) (xlsx)
//! ```
//!
//! 1. [`sheet`]: read one worksheet into a `Dataset`
//! 2. [`filter`]: drop rows that fail the data-quality rules
//! 3. [`naming`]: derive deterministic, filesystem-safe artifact names
//! 4. [`fetch`]: HTTP GET with timeout; the only stage with network I/O.
//!    PDF payloads go through [`render`], which runs pdfium in
//!    `spawn_blocking`
//! 5. [`writer`]: write the enriched sheet, optionally merged with a
//!    reference sheet

pub mod fetch;
pub mod filter;
pub mod naming;
pub mod render;
pub mod sheet;
pub mod writer;
