//! Batch driver: load → validate → filter → fetch → write.
//!
//! Rows run either sequentially in fixed-size chunks with an unconditional
//! pause between chunks, or through a fixed-size pool of concurrent fetches
//! (`workers`). In both modes each row's results are written back by row
//! index, so output order always follows input order. State shared across
//! rows is the download counter (an atomic) and one lock per destination,
//! held from the existence check until the fetch finishes, so rows that
//! name the same file download it once.

use crate::config::{PipelineConfig, DOWNLOAD_FAILED, ROW_DOWNLOAD_FAILED};
use crate::dataset::{Cell, Dataset, Hyperlink};
use crate::error::{ArtfetchError, FetchError};
use crate::output::{BatchOutput, BatchStats, DownloadOutcome, RowReport};
use crate::pipeline::fetch::{ArtifactFetcher, HttpFetcher};
use crate::pipeline::naming::FileNaming;
use crate::pipeline::{filter, sheet, writer};
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Run a whole batch as configured.
///
/// # Errors
/// Returns `Err(ArtfetchError)` only for fatal conditions:
/// - a configured column is missing (before any network call)
/// - the input or output spreadsheet cannot be read or written
/// - the output directory cannot be created
///
/// Individual fetch failures are recorded in the sheet as `DOWNLOAD_FAILED`.
pub async fn run(config: &PipelineConfig) -> Result<BatchOutput, ArtfetchError> {
    let fetcher = HttpFetcher::new(config.timeout_secs, config.max_rendered_pixels)
        .map_err(|e| ArtfetchError::Internal(e.to_string()))?;
    run_with_fetcher(config, &fetcher).await
}

/// [`run`] with a caller-supplied fetcher.
pub async fn run_with_fetcher<F: ArtifactFetcher>(
    config: &PipelineConfig,
    fetcher: &F,
) -> Result<BatchOutput, ArtfetchError> {
    let total_start = Instant::now();
    config.validate()?;

    // ── Step 1: Load ─────────────────────────────────────────────────────
    let dataset = sheet::load_dataset(&config.input_path, config.sheet.as_deref())?;

    // ── Step 2-4: Validate, filter, fetch ────────────────────────────────
    let mut output = process_dataset(dataset, config, fetcher).await?;

    // ── Step 5: Write ────────────────────────────────────────────────────
    writer::write_dataset(&output.dataset, &config.output_path, config.output_mode)?;

    // ── Step 6: Optional merge ───────────────────────────────────────────
    if let Some(ref merge) = config.merge {
        let reference = sheet::load_dataset(&merge.reference_path, merge.reference_sheet.as_deref())?;
        let merged = writer::merge_with_reference(&output.dataset, &reference, merge, config)?;
        // Merged links are always formulas; that sheet exists to be clicked through.
        writer::write_dataset(&merged, &merge.output_path, crate::config::OutputMode::Hyperlink)?;
        output.stats.merged_rows = Some(merged.len());
        output.merged = Some(merged);
    }

    output.stats.total_duration_ms = total_start.elapsed().as_millis() as u64;
    info!(
        "Batch complete: {} downloaded, {} reused, {} failed, {}ms",
        output.stats.downloaded,
        output.stats.reused,
        output.stats.failed,
        output.stats.total_duration_ms
    );
    Ok(output)
}

/// Synchronous wrapper around [`run`].
///
/// Creates a temporary tokio runtime internally.
pub fn run_sync(config: &PipelineConfig) -> Result<BatchOutput, ArtfetchError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ArtfetchError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(run(config))
}

/// Fail unless every column the configuration reads is present.
pub fn validate_schema(dataset: &Dataset, config: &PipelineConfig) -> Result<(), ArtfetchError> {
    dataset.require_columns(config.referenced_columns())
}

/// Validate, filter and fetch an already-loaded dataset.
///
/// The returned dataset has every configured output column (and the status
/// column, when set) populated for each row that had a URL.
pub async fn process_dataset<F: ArtifactFetcher>(
    dataset: Dataset,
    config: &PipelineConfig,
    fetcher: &F,
) -> Result<BatchOutput, ArtfetchError> {
    let batch_start = Instant::now();
    validate_schema(&dataset, config)?;

    std::fs::create_dir_all(&config.output_dir).map_err(|e| ArtfetchError::OutputDirFailed {
        path: config.output_dir.clone(),
        source: e,
    })?;

    let rows_loaded = dataset.len();
    let mut dataset = filter::apply_filters(dataset, &config.filter)?;
    let rows_filtered_out = rows_loaded - dataset.len();

    for u in &config.url_columns {
        dataset.ensure_column(&u.output);
    }
    if let Some(ref status) = config.status_column {
        dataset.ensure_column(status);
    }

    let plans = plan_rows(&dataset, config)?;
    let total = plans.len();
    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_start(total);
    }

    let mut dest_locks: HashMap<PathBuf, Mutex<()>> = HashMap::new();
    for fetch in plans.iter().flat_map(|p| &p.fetches) {
        dest_locks.entry(fetch.dest.clone()).or_default();
    }
    let ctx = RowContext {
        fetcher,
        config,
        total,
        downloaded: AtomicUsize::new(0),
        dest_locks,
    };
    let results = match config.workers {
        Some(workers) => process_pooled(&plans, workers, &ctx).await,
        None => process_chunked(&plans, &ctx).await,
    };

    let mut stats = BatchStats {
        rows_loaded,
        rows_filtered_out,
        rows_processed: total,
        downloaded: ctx.downloaded.load(Ordering::SeqCst),
        ..Default::default()
    };

    let mut reports = Vec::with_capacity(results.len());
    for result in results {
        stats.missing_urls += result.missing_urls;
        for (_, outcome) in &result.report.outcomes {
            match outcome {
                DownloadOutcome::Skipped { .. } => stats.reused += 1,
                DownloadOutcome::Succeeded { .. } => {}
                DownloadOutcome::Failed { .. } => stats.failed += 1,
            }
        }
        for (col, cell) in result.cells {
            dataset.set(result.report.row, col, cell);
        }
        reports.push(result.report);
    }
    stats.total_duration_ms = batch_start.elapsed().as_millis() as u64;

    if let Some(ref cb) = config.progress_callback {
        cb.on_batch_complete(&stats);
    }
    info!("Successfully downloaded {} files", stats.downloaded);

    Ok(BatchOutput {
        dataset,
        rows: reports,
        stats,
        merged: None,
    })
}

// ── Internal helpers ─────────────────────────────────────────────────────

/// One URL cell to resolve.
struct FetchPlan {
    source: String,
    output_col: usize,
    url: Option<String>,
    file_name: String,
    dest: PathBuf,
    link: Hyperlink,
}

/// Everything a row needs, detached from the dataset so rows can run concurrently.
struct RowPlan {
    row: usize,
    /// False when a file-name column is empty; such rows are never fetched.
    stem_complete: bool,
    fetches: Vec<FetchPlan>,
    status: Option<(usize, Hyperlink)>,
}

/// Shared by every row of one batch.
struct RowContext<'a, F> {
    fetcher: &'a F,
    config: &'a PipelineConfig,
    total: usize,
    downloaded: AtomicUsize,
    dest_locks: HashMap<PathBuf, Mutex<()>>,
}

struct RowResult {
    report: RowReport,
    cells: Vec<(usize, Cell)>,
    missing_urls: usize,
}

fn plan_rows(dataset: &Dataset, config: &PipelineConfig) -> Result<Vec<RowPlan>, ArtfetchError> {
    let naming = FileNaming::new(config, dataset)
        .ok_or_else(|| ArtfetchError::Internal("stem column missing after validation".into()))?;
    let column = |name: &str| {
        dataset
            .column_index(name)
            .ok_or_else(|| ArtfetchError::Internal(format!("column '{name}' missing after validation")))
    };

    let url_cols = config
        .url_columns
        .iter()
        .map(|u| -> Result<_, ArtfetchError> { Ok((u, column(&u.source)?, column(&u.output)?)) })
        .collect::<Result<Vec<_>, _>>()?;
    let status_col = config.status_column.as_deref().map(column).transpose()?;

    Ok(dataset
        .rows()
        .iter()
        .enumerate()
        .map(|(row, cells)| RowPlan {
            row,
            stem_complete: naming.has_complete_stem(cells),
            fetches: url_cols
                .iter()
                .map(|(u, src, out)| {
                    let url = cells[*src].as_text().map(|s| s.trim().to_string());
                    let file_name = naming.file_name_for_url(cells, &u.tag, url.as_deref());
                    FetchPlan {
                        source: u.source.clone(),
                        output_col: *out,
                        url,
                        dest: naming.path_for(&file_name),
                        link: naming.link(&file_name),
                        file_name,
                    }
                })
                .collect(),
            status: status_col.map(|c| (c, naming.status_link(cells))),
        })
        .collect())
}

/// Sequential mode: fixed-size chunks, fixed pause between chunks.
async fn process_chunked<F: ArtifactFetcher>(plans: &[RowPlan], ctx: &RowContext<'_, F>) -> Vec<RowResult> {
    let config = ctx.config;
    let mut results = Vec::with_capacity(plans.len());
    let chunks = plans.chunks(config.chunk_size);
    let chunk_count = chunks.len();

    for (i, chunk) in chunks.enumerate() {
        let start = i * config.chunk_size;
        let end = start + chunk.len();
        info!("Processing rows {} to {}", start + 1, end);
        if let Some(ref cb) = config.progress_callback {
            cb.on_chunk_start(start, end);
        }

        for plan in chunk {
            results.push(process_row(plan, ctx).await);
        }

        if i + 1 < chunk_count && config.chunk_pause_ms > 0 {
            debug!("Pausing {}ms before next chunk", config.chunk_pause_ms);
            tokio::time::sleep(Duration::from_millis(config.chunk_pause_ms)).await;
        }
    }
    results
}

/// Pool mode: up to `workers` rows in flight, written back by row index.
async fn process_pooled<F: ArtifactFetcher>(
    plans: &[RowPlan],
    workers: usize,
    ctx: &RowContext<'_, F>,
) -> Vec<RowResult> {
    info!("Processing {} rows with {} workers", ctx.total, workers);

    let mut results: Vec<RowResult> = stream::iter(plans.iter().map(|plan| process_row(plan, ctx)))
        .buffer_unordered(workers)
        .collect()
        .await;

    results.sort_by_key(|r| r.report.row);
    results
}

async fn process_row<F: ArtifactFetcher>(plan: &RowPlan, ctx: &RowContext<'_, F>) -> RowResult {
    let config = ctx.config;
    let mut outcomes = Vec::with_capacity(plan.fetches.len());
    let mut cells = Vec::with_capacity(plan.fetches.len() + 1);
    let mut missing_urls = 0;

    for fetch in &plan.fetches {
        let Some(ref url) = fetch.url else {
            missing_urls += 1;
            continue;
        };

        let outcome = if !plan.stem_complete {
            warn!("Row {}: empty file-name column, not fetching {}", plan.row + 1, url);
            DownloadOutcome::Failed {
                error: FetchError::EmptyFileName { url: url.clone() },
            }
        } else {
            fetch_once(plan, fetch, url, ctx).await
        };

        let cell = if outcome.is_available() {
            Cell::Link(fetch.link.clone())
        } else {
            Cell::text(DOWNLOAD_FAILED)
        };
        cells.push((fetch.output_col, cell));

        if let Some(ref cb) = config.progress_callback {
            cb.on_fetch_complete(plan.row, &fetch.source, &outcome);
        }
        outcomes.push((fetch.source.clone(), outcome));
    }

    let report = RowReport {
        row: plan.row,
        outcomes,
    };

    if let Some((col, ref link)) = plan.status {
        let status = if report.any_available() {
            Cell::Link(link.clone())
        } else {
            Cell::text(ROW_DOWNLOAD_FAILED)
        };
        cells.push((col, status));
    }

    if let Some(ref cb) = config.progress_callback {
        cb.on_row_complete(plan.row, ctx.total);
    }

    RowResult {
        report,
        cells,
        missing_urls,
    }
}

/// Reuse the destination if it exists, else fetch it. Rows naming the same
/// file are serialised on its lock, so only the first one downloads.
async fn fetch_once<F: ArtifactFetcher>(
    plan: &RowPlan,
    fetch: &FetchPlan,
    url: &str,
    ctx: &RowContext<'_, F>,
) -> DownloadOutcome {
    let _dest_guard = match ctx.dest_locks.get(&fetch.dest) {
        Some(lock) => Some(lock.lock().await),
        None => None,
    };

    if fetch.dest.exists() {
        debug!("Row {}: reusing {}", plan.row + 1, fetch.dest.display());
        return DownloadOutcome::Skipped {
            path: fetch.dest.clone(),
        };
    }

    match ctx.fetcher.fetch(url, &fetch.dest).await {
        Ok(artifact) => {
            ctx.downloaded.fetch_add(1, Ordering::SeqCst);
            debug!("Row {}: saved {} ({:?})", plan.row + 1, fetch.file_name, artifact);
            DownloadOutcome::Succeeded {
                path: fetch.dest.clone(),
            }
        }
        Err(error) => {
            warn!("Failed to download {}: {}", url, error);
            DownloadOutcome::Failed { error }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FilterRules, UrlColumn};
    use crate::error::FetchError;
    use crate::pipeline::fetch::FetchedArtifact;
    use std::collections::HashSet;
    use std::path::Path;
    use std::sync::Mutex;

    /// Writes a stub file for every URL except those listed as failing.
    #[derive(Default)]
    struct FakeFetcher {
        failing: HashSet<String>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeFetcher {
        fn failing(urls: &[&str]) -> Self {
            Self {
                failing: urls.iter().map(|s| s.to_string()).collect(),
                ..Default::default()
            }
        }

        fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    impl ArtifactFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, dest: &Path) -> Result<FetchedArtifact, FetchError> {
            self.calls.lock().unwrap().push(url.to_string());
            // Let other in-flight rows run between the request and the write.
            tokio::task::yield_now().await;
            if self.failing.contains(url) {
                return Err(FetchError::HttpStatus {
                    url: url.to_string(),
                    status: 404,
                });
            }
            std::fs::write(dest, b"img").unwrap();
            Ok(FetchedArtifact::Raw { bytes: 3 })
        }
    }

    fn config(dir: &Path) -> PipelineConfig {
        PipelineConfig::builder()
            .id_column("NAFDACNumber")
            .output_dir(dir)
            .url_column(UrlColumn::new("Front", "local_path_front", "front"))
            .url_column(UrlColumn::new("Whole", "local_path_whole", "whole"))
            .status_column("Status")
            .filter(FilterRules::registration("NAFDACNumber", "TIN", &["NAFDACNumber", "TIN"]))
            .chunk_size(2)
            .chunk_pause_ms(0)
            .build()
            .unwrap()
    }

    fn dataset() -> Dataset {
        let mut ds = Dataset::new(vec![
            "NAFDACNumber".into(),
            "TIN".into(),
            "Front".into(),
            "Whole".into(),
        ]);
        let t = Cell::text;
        ds.push_row(vec![t("A7-0001"), t("12345678-9012"), t("http://h/1f.jpg"), t("http://h/1w.jpg")]);
        ds.push_row(vec![t("Jan-23"), t("12345678-9012"), t("http://h/2f.jpg"), t("http://h/2w.jpg")]);
        ds.push_row(vec![t("B4-0003"), t("12345678-9012"), t("http://h/3f.jpg"), t("http://h/3w.jpg")]);
        ds.push_row(vec![t("C9-0004"), t("12345678-9012"), Cell::Empty, t("http://h/4w.jpg")]);
        ds
    }

    #[tokio::test]
    async fn end_to_end_outcomes() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let fetcher = FakeFetcher::failing(&["http://h/3f.jpg", "http://h/3w.jpg"]);

        let out = process_dataset(dataset(), &cfg, &fetcher).await.unwrap();
        let ds = &out.dataset;

        assert_eq!(ds.len(), 3, "Jan-23 row is filtered out");
        assert_eq!(out.stats.rows_filtered_out, 1);

        // Row 0: both fetched.
        assert!(matches!(ds.get(0, "local_path_front"), Some(Cell::Link(l)) if l.label == "A7-0001_front.jpeg"));
        assert!(matches!(ds.get(0, "local_path_whole"), Some(Cell::Link(l)) if l.label == "A7-0001_whole.jpeg"));
        assert!(matches!(ds.get(0, "Status"), Some(Cell::Link(l)) if l.label == "A7-0001.jpeg"));

        // Row 1 (B4-0003): both 404.
        assert_eq!(ds.get(1, "local_path_front"), Some(&Cell::text(DOWNLOAD_FAILED)));
        assert_eq!(ds.get(1, "local_path_whole"), Some(&Cell::text(DOWNLOAD_FAILED)));
        assert_eq!(ds.get(1, "Status"), Some(&Cell::text(ROW_DOWNLOAD_FAILED)));
        assert!(!dir.path().join("B4-0003_front.jpeg").exists());

        // Row 2: missing front URL is skipped silently.
        assert_eq!(ds.get(2, "local_path_front"), Some(&Cell::Empty));
        assert!(matches!(ds.get(2, "local_path_whole"), Some(Cell::Link(_))));

        assert_eq!(out.stats.downloaded, 3);
        assert_eq!(out.stats.failed, 2);
        assert_eq!(out.stats.missing_urls, 1);
        assert_eq!(fetcher.call_count(), 5);
    }

    #[tokio::test]
    async fn second_run_is_idempotent_and_offline() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());

        let first = process_dataset(dataset(), &cfg, &FakeFetcher::default()).await.unwrap();
        let fetcher = FakeFetcher::default();
        let second = process_dataset(dataset(), &cfg, &fetcher).await.unwrap();

        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(first.dataset, second.dataset);
        assert_eq!(second.stats.downloaded, 0);
        assert_eq!(second.stats.reused, 5);
    }

    #[tokio::test]
    async fn missing_column_aborts_before_any_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::builder()
            .id_column("NAFDACNumber")
            .output_dir(dir.path())
            .url_column(UrlColumn::new("Front", "local_path_front", "front"))
            .url_column(UrlColumn::new("Back", "local_path_back", "back"))
            .build()
            .unwrap();
        let fetcher = FakeFetcher::default();

        let err = process_dataset(dataset(), &cfg, &fetcher).await.unwrap_err();
        match err {
            ArtfetchError::MissingColumns { missing, .. } => assert_eq!(missing, vec!["Back"]),
            other => panic!("expected MissingColumns, got {other:?}"),
        }
        assert_eq!(fetcher.call_count(), 0);
    }

    #[tokio::test]
    async fn pooled_mode_matches_sequential_order_and_counts() {
        let seq_dir = tempfile::tempdir().unwrap();
        let pool_dir = tempfile::tempdir().unwrap();

        // Many rows so the pool really overlaps.
        let mut ds = Dataset::new(vec!["NAFDACNumber".into(), "TIN".into(), "Front".into(), "Whole".into()]);
        for i in 0..40 {
            ds.push_row(vec![
                Cell::text(format!("R{i}-{i}")),
                Cell::text("12345678-9012"),
                Cell::text(format!("http://h/{i}f.jpg")),
                Cell::text(format!("http://h/{i}w.jpg")),
            ]);
        }

        let seq = process_dataset(ds.clone(), &config(seq_dir.path()), &FakeFetcher::default())
            .await
            .unwrap();

        let mut pool_cfg = config(pool_dir.path());
        pool_cfg.workers = Some(5);
        let pooled = process_dataset(ds, &pool_cfg, &FakeFetcher::default()).await.unwrap();

        assert_eq!(pooled.stats.downloaded, 80);
        let labels = |out: &BatchOutput| -> Vec<String> {
            out.dataset
                .rows()
                .iter()
                .map(|r| match &r[4] {
                    Cell::Link(l) => l.label.clone(),
                    other => other.to_string(),
                })
                .collect()
        };
        assert_eq!(labels(&seq), labels(&pooled));
        let rows: Vec<usize> = pooled.rows.iter().map(|r| r.row).collect();
        assert_eq!(rows, (0..40).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn existing_output_columns_are_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = config(dir.path());
        let mut ds = dataset();
        let col = ds.ensure_column("local_path_front");
        ds.set(0, col, Cell::text("stale"));

        let out = process_dataset(ds, &cfg, &FakeFetcher::default()).await.unwrap();
        assert!(matches!(out.dataset.get(0, "local_path_front"), Some(Cell::Link(_))));
        assert_eq!(out.dataset.columns().iter().filter(|c| *c == "local_path_front").count(), 1);
    }

    #[tokio::test]
    async fn pooled_rows_sharing_a_destination_fetch_it_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut cfg = config(dir.path());
        cfg.workers = Some(4);

        let mut ds = Dataset::new(vec!["NAFDACNumber".into(), "TIN".into(), "Front".into(), "Whole".into()]);
        for _ in 0..8 {
            ds.push_row(vec![
                Cell::text("A7-0001"),
                Cell::text("12345678-9012"),
                Cell::text("http://h/dup.jpg"),
                Cell::Empty,
            ]);
        }
        let fetcher = FakeFetcher::default();

        let out = process_dataset(ds, &cfg, &fetcher).await.unwrap();

        assert_eq!(fetcher.call_count(), 1);
        assert_eq!(out.stats.downloaded, 1);
        assert_eq!(out.stats.reused, 7);
        assert_eq!(out.stats.failed, 0);
        for row in 0..8 {
            assert!(matches!(out.dataset.get(row, "local_path_front"), Some(Cell::Link(l)) if l.label == "A7-0001_front.jpeg"));
        }
    }

    #[tokio::test]
    async fn empty_stem_is_failed_without_a_request() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = PipelineConfig::builder()
            .id_column("NAFDACNumber")
            .output_dir(dir.path())
            .url_column(UrlColumn::new("Front", "local_path_front", "front"))
            .build()
            .unwrap();

        let mut ds = Dataset::new(vec!["NAFDACNumber".into(), "Front".into()]);
        ds.push_row(vec![Cell::Empty, Cell::text("http://h/a.jpg")]);
        ds.push_row(vec![Cell::Empty, Cell::text("http://h/b.jpg")]);
        let fetcher = FakeFetcher::default();

        let out = process_dataset(ds, &cfg, &fetcher).await.unwrap();

        assert_eq!(fetcher.call_count(), 0);
        assert_eq!(out.stats.failed, 2);
        assert_eq!(out.dataset.get(1, "local_path_front"), Some(&Cell::text(DOWNLOAD_FAILED)));
        assert!(!dir.path().join("_front.jpeg").exists());
        assert!(matches!(
            out.rows[0].outcomes[0].1,
            DownloadOutcome::Failed { error: FetchError::EmptyFileName { .. } }
        ));
    }
}
