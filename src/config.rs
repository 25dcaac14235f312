//! Configuration types for a spreadsheet artwork batch.
//!
//! Every knob of a run lives in one immutable [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`] or deserialised from a JSON job file. Components
//! receive the config (or the part they need) by reference; nothing reads
//! global state.

use crate::error::ArtfetchError;
use crate::progress::ProgressCallback;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Month-year tokens such as `Jan-23`, used to spot mangled registration numbers.
pub const DEFAULT_DATE_PATTERN: &str = r"\b(?:Jan|Feb|Mar|Apr|May|Jun|Jul|Aug|Sep|Oct|Nov|Dec)-\d{2}\b";

/// Tax identification number: eight digits, dash, four digits.
pub const DEFAULT_TIN_PATTERN: &str = r"^\d{8}-\d{4}$";

/// Registration number embedded in a reference file name, e.g. `A7-1234`.
pub const DEFAULT_MERGE_KEY_PATTERN: &str = r"([A-Z0-9]+-\d+)";

/// Sentinel written in place of a path when a fetch fails.
pub const DOWNLOAD_FAILED: &str = "DOWNLOAD_FAILED";

/// Aggregate row status when no artwork of the row could be obtained.
pub const ROW_DOWNLOAD_FAILED: &str = "Download Failed";

/// Configuration for one batch run.
///
/// # Example
/// ```rust
/// use artfetch::{PipelineConfig, UrlColumn};
///
/// let config = PipelineConfig::builder()
///     .input_path("Medical Devices.xlsx")
///     .id_column("NAFDACNumber")
///     .url_column(UrlColumn::new("ProductFrontViewArtwork", "local_path_front", "front"))
///     .url_column(UrlColumn::new("ProductWholeViewArtwork", "local_path_whole", "whole"))
///     .chunk_size(100)
///     .build()
///     .unwrap();
/// assert_eq!(config.url_columns.len(), 2);
/// ```
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Source spreadsheet (`.xlsx`, `.xls`, `.ods`).
    pub input_path: PathBuf,

    /// Sheet to read. `None` reads the first sheet.
    pub sheet: Option<String>,

    /// Where the enriched spreadsheet is written. Default: `data_updated.xlsx`.
    pub output_path: PathBuf,

    /// Directory holding one file per fetched artwork. Created if absent.
    pub output_dir: PathBuf,

    /// Identifier column (registration number). Used for naming when
    /// `name_columns` is empty and as the merge join key.
    pub id_column: String,

    /// Columns whose cleaned values, joined by `_`, form the file stem.
    /// Empty means "use `id_column`".
    pub name_columns: Vec<String>,

    /// Source URL column → output column mapping, with the tag that goes
    /// into the file name.
    pub url_columns: Vec<UrlColumn>,

    /// Optional aggregate status column (combined hyperlink or `Download Failed`).
    pub status_column: Option<String>,

    /// Row exclusion rules applied before any fetch.
    pub filter: FilterRules,

    /// Plain paths or `=HYPERLINK(..)` formulas in the written sheet.
    pub output_mode: OutputMode,

    /// Per-request HTTP timeout in seconds. Default: 10.
    pub timeout_secs: u64,

    /// Rows per chunk in sequential mode. Default: 100.
    pub chunk_size: usize,

    /// Unconditional pause between chunks in milliseconds. Default: 1000.
    pub chunk_pause_ms: u64,

    /// Worker-pool size. `None` runs rows sequentially in chunks.
    pub workers: Option<usize>,

    /// Extension of every artifact file. Default: `jpeg`.
    pub extension: String,

    /// Take the extension from the URL path when it has one (PDF URLs excepted).
    pub url_extension: bool,

    /// Longest edge, in pixels, of a rasterised PDF page. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Optional post-process join against a reference spreadsheet.
    pub merge: Option<MergeConfig>,

    /// Receives row and fetch events while the batch runs.
    #[serde(skip)]
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            input_path: PathBuf::from("data.xlsx"),
            sheet: None,
            output_path: PathBuf::from("data_updated.xlsx"),
            output_dir: PathBuf::from("downloaded_images"),
            id_column: "id".to_string(),
            name_columns: Vec::new(),
            url_columns: Vec::new(),
            status_column: None,
            filter: FilterRules::default(),
            output_mode: OutputMode::default(),
            timeout_secs: 10,
            chunk_size: 100,
            chunk_pause_ms: 1000,
            workers: None,
            extension: "jpeg".to_string(),
            url_extension: false,
            max_rendered_pixels: 2000,
            merge: None,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("input_path", &self.input_path)
            .field("sheet", &self.sheet)
            .field("output_path", &self.output_path)
            .field("output_dir", &self.output_dir)
            .field("id_column", &self.id_column)
            .field("name_columns", &self.name_columns)
            .field("url_columns", &self.url_columns)
            .field("status_column", &self.status_column)
            .field("filter", &self.filter)
            .field("output_mode", &self.output_mode)
            .field("timeout_secs", &self.timeout_secs)
            .field("chunk_size", &self.chunk_size)
            .field("chunk_pause_ms", &self.chunk_pause_ms)
            .field("workers", &self.workers)
            .field("extension", &self.extension)
            .field("url_extension", &self.url_extension)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("merge", &self.merge)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn BatchProgressCallback>"),
            )
            .finish()
    }
}

impl PipelineConfig {
    /// Create a new builder for `PipelineConfig`.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Read a JSON job file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ArtfetchError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ArtfetchError::ConfigFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ArtfetchError::ConfigFile {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    /// Columns used to build the file stem.
    pub fn stem_columns(&self) -> Vec<&str> {
        if self.name_columns.is_empty() {
            vec![self.id_column.as_str()]
        } else {
            self.name_columns.iter().map(String::as_str).collect()
        }
    }

    /// Every column the run reads, deduplicated, in first-seen order.
    ///
    /// Title-case columns are not listed; they are optional.
    pub fn referenced_columns(&self) -> Vec<&str> {
        let mut cols: Vec<&str> = vec![self.id_column.as_str()];
        cols.extend(self.name_columns.iter().map(String::as_str));
        cols.extend(self.url_columns.iter().map(|u| u.source.as_str()));
        cols.extend(self.filter.referenced_columns());

        let mut seen = std::collections::HashSet::new();
        cols.retain(|c| seen.insert(*c));
        cols
    }

    /// Check the invariants the builder enforces. Also used after
    /// loading a job file, which bypasses the builder.
    pub fn validate(&self) -> Result<(), ArtfetchError> {
        if self.id_column.trim().is_empty() {
            return Err(ArtfetchError::InvalidConfig(
                "id column must not be empty".into(),
            ));
        }
        if self.url_columns.is_empty() {
            return Err(ArtfetchError::InvalidConfig(
                "at least one URL column is required".into(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(ArtfetchError::InvalidConfig("timeout must be ≥ 1 second".into()));
        }
        if self.chunk_size == 0 {
            return Err(ArtfetchError::InvalidConfig("chunk size must be ≥ 1".into()));
        }
        if self.workers == Some(0) {
            return Err(ArtfetchError::InvalidConfig("workers must be ≥ 1".into()));
        }
        if self.extension.is_empty() || self.extension.contains(['/', '\\', '.']) {
            return Err(ArtfetchError::InvalidConfig(format!(
                "invalid file extension '{}'",
                self.extension
            )));
        }
        self.filter.compile()?;
        if let Some(ref merge) = self.merge {
            compile_pattern(&merge.key_pattern)?;
        }
        Ok(())
    }
}

/// Builder for [`PipelineConfig`].
#[derive(Debug)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn input_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.input_path = path.into();
        self
    }

    pub fn sheet(mut self, name: impl Into<String>) -> Self {
        self.config.sheet = Some(name.into());
        self
    }

    pub fn output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.output_path = path.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    pub fn id_column(mut self, column: impl Into<String>) -> Self {
        self.config.id_column = column.into();
        self
    }

    pub fn name_column(mut self, column: impl Into<String>) -> Self {
        self.config.name_columns.push(column.into());
        self
    }

    pub fn url_column(mut self, column: UrlColumn) -> Self {
        self.config.url_columns.push(column);
        self
    }

    pub fn status_column(mut self, column: impl Into<String>) -> Self {
        self.config.status_column = Some(column.into());
        self
    }

    pub fn filter(mut self, rules: FilterRules) -> Self {
        self.config.filter = rules;
        self
    }

    pub fn output_mode(mut self, mode: OutputMode) -> Self {
        self.config.output_mode = mode;
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs.max(1);
        self
    }

    pub fn chunk_size(mut self, n: usize) -> Self {
        self.config.chunk_size = n;
        self
    }

    pub fn chunk_pause_ms(mut self, ms: u64) -> Self {
        self.config.chunk_pause_ms = ms;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = Some(n);
        self
    }

    pub fn extension(mut self, ext: impl Into<String>) -> Self {
        self.config.extension = ext.into().trim_start_matches('.').to_string();
        self
    }

    pub fn url_extension(mut self, enabled: bool) -> Self {
        self.config.url_extension = enabled;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn merge(mut self, merge: MergeConfig) -> Self {
        self.config.merge = Some(merge);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, ArtfetchError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

// ── Column mapping ───────────────────────────────────────────────────────

/// One URL column to fetch and the column its outcome is written to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UrlColumn {
    /// Column holding the remote URL.
    pub source: String,
    /// Column receiving the local path, hyperlink or sentinel.
    pub output: String,
    /// Suffix appended to the file stem (`front`, `whole`). Empty for none.
    #[serde(default)]
    pub tag: String,
}

impl UrlColumn {
    pub fn new(source: impl Into<String>, output: impl Into<String>, tag: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            output: output.into(),
            tag: tag.into(),
        }
    }

    /// Parse `SOURCE=OUTPUT[:TAG]`.
    pub fn parse(arg: &str) -> Result<Self, ArtfetchError> {
        let (source, rest) = arg.split_once('=').ok_or_else(|| {
            ArtfetchError::InvalidConfig(format!(
                "URL column '{arg}' must look like SOURCE=OUTPUT[:TAG]"
            ))
        })?;
        let (output, tag) = rest.split_once(':').unwrap_or((rest, ""));
        if source.trim().is_empty() || output.trim().is_empty() {
            return Err(ArtfetchError::InvalidConfig(format!(
                "URL column '{arg}' has an empty source or output"
            )));
        }
        Ok(Self::new(source.trim(), output.trim(), tag.trim()))
    }
}

// ── Row filter rules ─────────────────────────────────────────────────────

/// A column and the regex tested against its string form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnPattern {
    pub column: String,
    pub pattern: String,
}

impl ColumnPattern {
    pub fn new(column: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            pattern: pattern.into(),
        }
    }

    /// Parse `COLUMN=REGEX` (split on the first `=`).
    pub fn parse(arg: &str) -> Result<Self, ArtfetchError> {
        let (column, pattern) = arg.split_once('=').ok_or_else(|| {
            ArtfetchError::InvalidConfig(format!("'{arg}' must look like COLUMN=REGEX"))
        })?;
        Ok(Self::new(column.trim(), pattern))
    }
}

/// Declarative row-exclusion rules. All unset by default (keep every row).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterRules {
    /// Drop rows whose value contains a match of this pattern.
    pub exclude_date_like: Option<ColumnPattern>,
    /// Keep only rows whose value matches this pattern from its first character.
    pub require_pattern: Option<ColumnPattern>,
    /// Drop rows with an empty cell in any of these columns.
    pub require_non_null: Vec<String>,
    /// Title-case these columns when present.
    pub title_case: Vec<String>,
}

impl FilterRules {
    /// The rules the registration-number scripts used: no month-year tokens in
    /// `id_column`, a well-formed TIN, and every listed column filled in.
    pub fn registration(id_column: &str, tin_column: &str, non_null: &[&str]) -> Self {
        Self {
            exclude_date_like: Some(ColumnPattern::new(id_column, DEFAULT_DATE_PATTERN)),
            require_pattern: Some(ColumnPattern::new(tin_column, DEFAULT_TIN_PATTERN)),
            require_non_null: non_null.iter().map(|s| s.to_string()).collect(),
            title_case: Vec::new(),
        }
    }

    pub(crate) fn referenced_columns(&self) -> Vec<&str> {
        let mut cols = Vec::new();
        if let Some(ref p) = self.exclude_date_like {
            cols.push(p.column.as_str());
        }
        if let Some(ref p) = self.require_pattern {
            cols.push(p.column.as_str());
        }
        cols.extend(self.require_non_null.iter().map(String::as_str));
        cols
    }

    /// Compile both patterns.
    pub(crate) fn compile(&self) -> Result<(Option<Regex>, Option<Regex>), ArtfetchError> {
        let exclude = self
            .exclude_date_like
            .as_ref()
            .map(|p| compile_pattern(&p.pattern))
            .transpose()?;
        let require = self
            .require_pattern
            .as_ref()
            .map(|p| compile_pattern(&p.pattern))
            .transpose()?;
        Ok((exclude, require))
    }
}

pub(crate) fn compile_pattern(pattern: &str) -> Result<Regex, ArtfetchError> {
    Regex::new(pattern)
        .map_err(|e| ArtfetchError::InvalidConfig(format!("invalid regex '{pattern}': {e}")))
}

// ── Output ───────────────────────────────────────────────────────────────

/// How recorded artwork locations are written to the sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// The local path (or sentinel) as text. (default)
    #[default]
    Plain,
    /// `=HYPERLINK("<path>", "<label>")` for every recorded path.
    Hyperlink,
}

/// Post-process join of the enriched sheet with a reference sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergeConfig {
    /// Reference spreadsheet listing the cleaned artwork files.
    pub reference_path: PathBuf,
    /// Sheet of the reference file. `None` reads the first sheet.
    pub reference_sheet: Option<String>,
    /// Reference column holding file names.
    pub filename_column: String,
    /// Regex extracting the id from a file name (group 1, else whole match).
    pub key_pattern: String,
    /// Where the merged spreadsheet is written.
    pub output_path: PathBuf,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            reference_path: PathBuf::from("cleanimage.xlsx"),
            reference_sheet: None,
            filename_column: "filename".to_string(),
            key_pattern: DEFAULT_MERGE_KEY_PATTERN.to_string(),
            output_path: PathBuf::from("merged_output_with_hyperlinks.xlsx"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal() -> PipelineConfigBuilder {
        PipelineConfig::builder()
            .id_column("NAFDACNumber")
            .url_column(UrlColumn::new("ProductFrontViewArtwork", "local_path_front", "front"))
    }

    #[test]
    fn defaults_match_scripts() {
        let c = minimal().build().unwrap();
        assert_eq!(c.timeout_secs, 10);
        assert_eq!(c.chunk_size, 100);
        assert_eq!(c.chunk_pause_ms, 1000);
        assert_eq!(c.extension, "jpeg");
        assert_eq!(c.output_mode, OutputMode::Plain);
        assert!(c.workers.is_none());
    }

    #[test]
    fn build_rejects_bad_values() {
        assert!(PipelineConfig::builder().id_column("x").build().is_err());
        assert!(minimal().chunk_size(0).build().is_err());
        assert!(minimal().workers(0).build().is_err());
        assert!(minimal()
            .filter(FilterRules {
                require_pattern: Some(ColumnPattern::new("TIN", "([")),
                ..Default::default()
            })
            .build()
            .is_err());
    }

    #[test]
    fn zero_timeout_from_job_file_is_rejected() {
        let json = r#"{
            "id_column": "NAFDACNumber",
            "url_columns": [{"source": "Front", "output": "local_path_front"}],
            "timeout_secs": 0
        }"#;
        let c: PipelineConfig = serde_json::from_str(json).unwrap();
        assert!(matches!(c.validate(), Err(ArtfetchError::InvalidConfig(_))));

        let mut c = minimal().build().unwrap();
        c.timeout_secs = 0;
        assert!(c.validate().is_err());
    }

    #[test]
    fn extension_leading_dot_is_stripped() {
        let c = minimal().extension(".png").build().unwrap();
        assert_eq!(c.extension, "png");
    }

    #[test]
    fn url_column_parse() {
        let u = UrlColumn::parse("ProductFrontViewArtwork=local_path_front:front").unwrap();
        assert_eq!(u, UrlColumn::new("ProductFrontViewArtwork", "local_path_front", "front"));

        let u = UrlColumn::parse("url=local_path").unwrap();
        assert_eq!(u.tag, "");

        assert!(UrlColumn::parse("no-equals").is_err());
        assert!(UrlColumn::parse("=out").is_err());
    }

    #[test]
    fn column_pattern_splits_on_first_equals() {
        let p = ColumnPattern::parse("TIN=^a=b$").unwrap();
        assert_eq!(p.column, "TIN");
        assert_eq!(p.pattern, "^a=b$");
    }

    #[test]
    fn referenced_columns_are_deduplicated() {
        let c = minimal()
            .filter(FilterRules::registration(
                "NAFDACNumber",
                "TIN",
                &["NAFDACNumber", "TIN", "ProductFrontViewArtwork"],
            ))
            .build()
            .unwrap();
        assert_eq!(
            c.referenced_columns(),
            vec!["NAFDACNumber", "ProductFrontViewArtwork", "TIN"]
        );
    }

    #[test]
    fn stem_columns_fall_back_to_id() {
        let c = minimal().build().unwrap();
        assert_eq!(c.stem_columns(), vec!["NAFDACNumber"]);
        let c = minimal().name_column("name").name_column("category").build().unwrap();
        assert_eq!(c.stem_columns(), vec!["name", "category"]);
    }

    #[test]
    fn job_file_round_trip_uses_defaults() {
        let json = r#"{
            "input_path": "in.xlsx",
            "id_column": "NAFDACNumber",
            "url_columns": [{"source": "ProductFrontViewArtwork", "output": "local_path_front", "tag": "front"}],
            "output_mode": "hyperlink"
        }"#;
        let c: PipelineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(c.output_mode, OutputMode::Hyperlink);
        assert_eq!(c.chunk_size, 100);
        assert!(c.validate().is_ok());
    }
}
