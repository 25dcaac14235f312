//! CLI binary for artfetch.
//!
//! A thin shim over the library crate that layers CLI flags over an
//! optional JSON job file and prints a run summary.

use anyhow::{Context, Result};
use artfetch::{
    run, BatchOutput, BatchProgressCallback, BatchStats, ColumnPattern, DownloadOutcome,
    FilterRules, OutputMode, PipelineConfig, ProgressCallback, RowReport, UrlColumn,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar over rows plus a log line for every
/// failed fetch. Rows may complete out of order in pool mode.
struct CliProgressCallback {
    bar: ProgressBar,
    failures: AtomicUsize,
}

impl CliProgressCallback {
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Reading spreadsheet…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            failures: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>5}/{len} rows  \
             ⏱ {elapsed_precise}  ETA {eta_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Fetching");
        self.bar.set_message("");
        self.bar.reset_eta();
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_rows: usize) {
        self.activate_bar(total_rows);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Processing {total_rows} rows…"))
        ));
    }

    fn on_chunk_start(&self, start: usize, end: usize) {
        self.bar.set_message(dim(&format!("chunk {}-{}", start + 1, end)));
    }

    fn on_fetch_complete(&self, row: usize, column: &str, outcome: &DownloadOutcome) {
        if let DownloadOutcome::Failed { error } = outcome {
            self.failures.fetch_add(1, Ordering::SeqCst);
            let msg = error.to_string();
            let msg = if msg.chars().count() > 80 {
                format!("{}\u{2026}", msg.chars().take(79).collect::<String>())
            } else {
                msg
            };
            self.bar.println(format!(
                "  {} row {:>5}  {:<24}  {}",
                red("✗"),
                row + 1,
                column,
                red(&msg)
            ));
        }
    }

    fn on_row_complete(&self, _row: usize, _total_rows: usize) {
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, stats: &BatchStats) {
        self.bar.finish_and_clear();
        let failed = self.failures.load(Ordering::SeqCst);
        eprintln!(
            "{} {} rows processed  ({} downloaded, {} reused, {} failed)",
            if failed == 0 { green("✔") } else { cyan("⚠") },
            bold(&stats.rows_processed.to_string()),
            stats.downloaded,
            stats.reused,
            if failed == 0 {
                failed.to_string()
            } else {
                red(&failed.to_string())
            },
        );
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Front and whole-view artwork, registration-number filters, hyperlinks
  artfetch "Medical Devices.xlsx" -o data_updated.xlsx \
      --id-column NAFDACNumber \
      --url-column ProductFrontViewArtwork=local_path_front:front \
      --url-column ProductWholeViewArtwork=local_path_whole:whole \
      --status-column Status --registration-filter TIN --hyperlinks

  # Name files after several columns, five concurrent workers
  artfetch products.xlsx --name-column ProductName --name-column Category \
      --url-column ImageURL=local_path --workers 5

  # Run a saved job, overriding the timeout
  artfetch --config job.json --timeout 30

  # Join with a reference sheet of cleaned images
  artfetch --config job.json --merge-reference cleanimage.xlsx

  # Machine-readable summary
  artfetch --config job.json --json > summary.json

URL COLUMNS:
  SOURCE=OUTPUT[:TAG]   read URLs from SOURCE, record results in OUTPUT,
                        save files as <stem>_<TAG>.<ext>

ENVIRONMENT VARIABLES:
  RUST_LOG            Override the log filter (e.g. artfetch=debug)
  PDFIUM_LIB_PATH     Path to the libpdfium shared library, for .pdf artwork
"#;

/// Download product artwork listed in a spreadsheet and record where it went.
#[derive(Parser, Debug)]
#[command(
    name = "artfetch",
    version,
    about = "Download product artwork listed in a spreadsheet and record where it went",
    long_about = "Read a spreadsheet of product records, drop rows that fail data-quality \
rules, download each row's artwork images (rasterising PDFs), and write the local paths or \
clickable hyperlinks back into the sheet.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input spreadsheet (.xlsx).
    input: Option<PathBuf>,

    /// Output spreadsheet.
    #[arg(short, long, env = "ARTFETCH_OUTPUT")]
    output: Option<PathBuf>,

    /// Directory receiving downloaded files.
    #[arg(long, env = "ARTFETCH_OUTPUT_DIR")]
    output_dir: Option<PathBuf>,

    /// JSON job file; flags given on the command line override it.
    #[arg(long, env = "ARTFETCH_CONFIG")]
    config: Option<PathBuf>,

    /// Worksheet to read (default: the first one).
    #[arg(long)]
    sheet: Option<String>,

    /// Column holding the record id.
    #[arg(long)]
    id_column: Option<String>,

    /// Column joined into the file stem (repeatable, default: the id column).
    #[arg(long = "name-column")]
    name_columns: Vec<String>,

    /// URL column as SOURCE=OUTPUT[:TAG] (repeatable).
    #[arg(long = "url-column")]
    url_columns: Vec<String>,

    /// Column receiving a per-row status link or "Download Failed".
    #[arg(long)]
    status_column: Option<String>,

    /// Apply the registration-number filters with this TIN column.
    #[arg(long, value_name = "TIN_COLUMN")]
    registration_filter: Option<String>,

    /// Drop rows whose COLUMN contains a match of REGEX.
    #[arg(long, value_name = "COLUMN=REGEX")]
    exclude_pattern: Option<String>,

    /// Keep only rows whose COLUMN matches REGEX from its first character.
    #[arg(long, value_name = "COLUMN=REGEX")]
    require_pattern: Option<String>,

    /// Drop rows with an empty cell in this column (repeatable).
    #[arg(long = "require-non-null", value_name = "COLUMN")]
    require_non_null: Vec<String>,

    /// Title-case this column when present (repeatable).
    #[arg(long = "title-case", value_name = "COLUMN")]
    title_case: Vec<String>,

    /// Write =HYPERLINK formulas instead of plain paths.
    #[arg(long, env = "ARTFETCH_HYPERLINKS")]
    hyperlinks: bool,

    /// Per-request timeout in seconds.
    #[arg(long, env = "ARTFETCH_TIMEOUT")]
    timeout: Option<u64>,

    /// Rows per sequential chunk.
    #[arg(long, env = "ARTFETCH_CHUNK_SIZE")]
    chunk_size: Option<usize>,

    /// Pause between chunks in milliseconds.
    #[arg(long, env = "ARTFETCH_CHUNK_PAUSE_MS")]
    chunk_pause_ms: Option<u64>,

    /// Fetch with a pool of this many concurrent workers instead of chunks.
    #[arg(long, env = "ARTFETCH_WORKERS")]
    workers: Option<usize>,

    /// Extension of saved files (default: jpeg).
    #[arg(long, env = "ARTFETCH_EXTENSION")]
    extension: Option<String>,

    /// Keep the extension of each URL's path; PDFs are still saved as JPEG.
    #[arg(long)]
    extension_from_url: bool,

    /// Reference spreadsheet to inner-join with after the run.
    #[arg(long)]
    merge_reference: Option<PathBuf>,

    /// Where the merged spreadsheet is written.
    #[arg(long)]
    merge_output: Option<PathBuf>,

    /// Reference column holding file names.
    #[arg(long)]
    merge_filename_column: Option<String>,

    /// Regex extracting the id from a reference file name.
    #[arg(long)]
    merge_key_pattern: Option<String>,

    /// Print the run summary (stats and per-row outcomes) as JSON.
    #[arg(long, env = "ARTFETCH_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "ARTFETCH_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "ARTFETCH_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "ARTFETCH_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs when it is active.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Build config ─────────────────────────────────────────────────────
    let mut config = build_config(&cli)?;
    if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        config.progress_callback = Some(cb as ProgressCallback);
    }

    // ── Run ──────────────────────────────────────────────────────────────
    let output = run(&config).await.context("Batch failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&JsonSummary::from(&output))
            .context("Failed to serialise summary")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&config, &output, show_progress);
    }

    Ok(())
}

/// Map the job file (if any) and CLI flags to `PipelineConfig`.
fn build_config(cli: &Cli) -> Result<PipelineConfig> {
    let mut config = match cli.config {
        Some(ref path) => PipelineConfig::from_json_file(path).context("Failed to load job file")?,
        None => PipelineConfig::default(),
    };

    if let Some(ref input) = cli.input {
        config.input_path = input.clone();
    }
    if let Some(ref output) = cli.output {
        config.output_path = output.clone();
    }
    if let Some(ref dir) = cli.output_dir {
        config.output_dir = dir.clone();
    }
    if let Some(ref sheet) = cli.sheet {
        config.sheet = Some(sheet.clone());
    }
    if let Some(ref id) = cli.id_column {
        config.id_column = id.clone();
    }
    if !cli.name_columns.is_empty() {
        config.name_columns = cli.name_columns.clone();
    }
    if !cli.url_columns.is_empty() {
        config.url_columns = cli
            .url_columns
            .iter()
            .map(|s| UrlColumn::parse(s))
            .collect::<Result<Vec<_>, _>>()
            .context("Invalid --url-column")?;
    }
    if let Some(ref status) = cli.status_column {
        config.status_column = Some(status.clone());
    }

    apply_filter_flags(cli, &mut config)?;

    if cli.hyperlinks {
        config.output_mode = OutputMode::Hyperlink;
    }
    if let Some(secs) = cli.timeout {
        config.timeout_secs = secs;
    }
    if let Some(n) = cli.chunk_size {
        config.chunk_size = n;
    }
    if let Some(ms) = cli.chunk_pause_ms {
        config.chunk_pause_ms = ms;
    }
    if let Some(n) = cli.workers {
        config.workers = Some(n);
    }
    if let Some(ref ext) = cli.extension {
        config.extension = ext.trim_start_matches('.').to_string();
    }
    if cli.extension_from_url {
        config.url_extension = true;
    }

    let merge_requested = cli.merge_reference.is_some()
        || cli.merge_output.is_some()
        || cli.merge_filename_column.is_some()
        || cli.merge_key_pattern.is_some();
    if merge_requested {
        let mut merge = config.merge.take().unwrap_or_default();
        if let Some(ref path) = cli.merge_reference {
            merge.reference_path = path.clone();
        }
        if let Some(ref path) = cli.merge_output {
            merge.output_path = path.clone();
        }
        if let Some(ref col) = cli.merge_filename_column {
            merge.filename_column = col.clone();
        }
        if let Some(ref pattern) = cli.merge_key_pattern {
            merge.key_pattern = pattern.clone();
        }
        config.merge = Some(merge);
    }

    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn apply_filter_flags(cli: &Cli, config: &mut PipelineConfig) -> Result<()> {
    if let Some(ref tin) = cli.registration_filter {
        let mut required: Vec<&str> = vec![config.id_column.as_str(), tin.as_str()];
        required.extend(config.url_columns.iter().map(|u| u.source.as_str()));
        let rules = FilterRules {
            title_case: std::mem::take(&mut config.filter.title_case),
            ..FilterRules::registration(&config.id_column, tin, &required)
        };
        config.filter = rules;
    }
    if let Some(ref arg) = cli.exclude_pattern {
        config.filter.exclude_date_like =
            Some(ColumnPattern::parse(arg).context("Invalid --exclude-pattern")?);
    }
    if let Some(ref arg) = cli.require_pattern {
        config.filter.require_pattern =
            Some(ColumnPattern::parse(arg).context("Invalid --require-pattern")?);
    }
    for col in &cli.require_non_null {
        if !config.filter.require_non_null.contains(col) {
            config.filter.require_non_null.push(col.clone());
        }
    }
    for col in &cli.title_case {
        if !config.filter.title_case.contains(col) {
            config.filter.title_case.push(col.clone());
        }
    }
    Ok(())
}

fn print_summary(config: &PipelineConfig, output: &BatchOutput, show_progress: bool) {
    let stats = &output.stats;
    if !show_progress {
        eprintln!(
            "Processed {} rows ({} loaded, {} filtered out)",
            stats.rows_processed, stats.rows_loaded, stats.rows_filtered_out
        );
        eprintln!(
            "  {} downloaded, {} reused, {} failed",
            stats.downloaded, stats.reused, stats.failed
        );
    }
    if stats.missing_urls > 0 {
        eprintln!("  {}", dim(&format!("{} empty URL cells", stats.missing_urls)));
    }
    eprintln!(
        "{}  {}ms  →  {}",
        if stats.failed == 0 { green("✔") } else { cyan("⚠") },
        stats.total_duration_ms,
        bold(&config.output_path.display().to_string()),
    );
    if let (Some(rows), Some(merge)) = (stats.merged_rows, config.merge.as_ref()) {
        eprintln!(
            "   merged {} rows  →  {}",
            rows,
            bold(&merge.output_path.display().to_string())
        );
    }
}

/// `--json` payload: counters plus per-row outcomes, without the dataset.
#[derive(serde::Serialize)]
struct JsonSummary<'a> {
    stats: &'a BatchStats,
    rows: &'a [RowReport],
}

impl<'a> From<&'a BatchOutput> for JsonSummary<'a> {
    fn from(output: &'a BatchOutput) -> Self {
        Self {
            stats: &output.stats,
            rows: &output.rows,
        }
    }
}
