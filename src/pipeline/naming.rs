//! Deterministic artifact file names derived from row fields.

use crate::config::PipelineConfig;
use crate::dataset::{Cell, Dataset, Hyperlink};
use crate::pipeline::fetch::{is_pdf_url, url_path_extension};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};

static UNSAFE_CHARS: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^A-Za-z0-9_\-. ]").unwrap());

/// Replace every character outside `[A-Za-z0-9_-. ]` with `_`, then spaces with `_`.
///
/// `"A/B C"` → `"A_B_C"`.
pub fn clean_filename(raw: &str) -> String {
    UNSAFE_CHARS.replace_all(raw, "_").replace(' ', "_")
}

/// `<stem parts joined by _>[_<tag>].<ext>`, each part cleaned.
pub fn artifact_file_name(stem_parts: &[&str], tag: &str, extension: &str) -> String {
    let mut name = stem(stem_parts);
    if !tag.is_empty() {
        name.push('_');
        name.push_str(&clean_filename(tag));
    }
    format!("{name}.{extension}")
}

fn stem(parts: &[&str]) -> String {
    parts
        .iter()
        .map(|p| clean_filename(p))
        .collect::<Vec<_>>()
        .join("_")
}

/// Resolves file names and paths for rows under one configuration.
#[derive(Debug, Clone)]
pub struct FileNaming {
    output_dir: PathBuf,
    extension: String,
    url_extension: bool,
    stem_columns: Vec<usize>,
}

impl FileNaming {
    /// `None` when a stem column is missing from `dataset`.
    pub fn new(config: &PipelineConfig, dataset: &Dataset) -> Option<Self> {
        let stem_columns = config
            .stem_columns()
            .into_iter()
            .map(|c| dataset.column_index(c))
            .collect::<Option<Vec<_>>>()?;
        Some(Self {
            output_dir: config.output_dir.clone(),
            extension: config.extension.clone(),
            url_extension: config.url_extension,
            stem_columns,
        })
    }

    /// Raw stem values of a row; null cells contribute an empty part.
    fn parts(&self, row: &[Cell]) -> Vec<String> {
        self.stem_columns
            .iter()
            .map(|&c| row.get(c).and_then(Cell::as_text).unwrap_or_default())
            .collect()
    }

    /// Every stem column of the row holds a value.
    ///
    /// Rows failing this would all share one file name, so nothing is fetched for them.
    pub fn has_complete_stem(&self, row: &[Cell]) -> bool {
        self.stem_columns
            .iter()
            .all(|&c| row.get(c).is_some_and(|cell| !cell.is_null()))
    }

    /// File name for one URL column of a row, with the configured extension.
    pub fn file_name(&self, row: &[Cell], tag: &str) -> String {
        let parts = self.parts(row);
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        artifact_file_name(&refs, tag, &self.extension)
    }

    /// File name for the artifact fetched from `url`.
    ///
    /// With `url_extension` set, the URL path's extension replaces the
    /// configured one. PDF URLs keep the configured one: they are rasterised.
    pub fn file_name_for_url(&self, row: &[Cell], tag: &str, url: Option<&str>) -> String {
        let ext = url
            .filter(|u| self.url_extension && !is_pdf_url(u))
            .and_then(url_path_extension)
            .unwrap_or_else(|| self.extension.clone());
        let parts = self.parts(row);
        let refs: Vec<&str> = parts.iter().map(String::as_str).collect();
        artifact_file_name(&refs, tag, &ext)
    }

    pub fn path_for(&self, file_name: &str) -> PathBuf {
        self.output_dir.join(file_name)
    }

    /// Link to `file_name` inside the output directory, labelled with the name.
    pub fn link(&self, file_name: &str) -> Hyperlink {
        Hyperlink::new(display_path(&self.path_for(file_name)), file_name)
    }

    /// Link to the combined `<stem>.<ext>` used by the row status column.
    pub fn status_link(&self, row: &[Cell]) -> Hyperlink {
        self.link(&self.file_name(row, ""))
    }
}

pub(crate) fn display_path(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UrlColumn;

    #[test]
    fn clean_filename_examples() {
        assert_eq!(clean_filename("A/B C"), "A_B_C");
        assert_eq!(clean_filename("A7-0123"), "A7-0123");
        assert_eq!(clean_filename("tab\there"), "tab_here");
        assert_eq!(clean_filename("café"), "caf_");
        assert_eq!(clean_filename(""), "");
    }

    #[test]
    fn clean_filename_output_alphabet() {
        let inputs = ["a:b*c?d", "  lead", "ünï©ødé 名前", "x.y-z_w", "../../etc/passwd"];
        for input in inputs {
            let out = clean_filename(input);
            assert!(
                out.chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.')),
                "{input:?} → {out:?}"
            );
            assert_eq!(out, clean_filename(input), "deterministic");
        }
    }

    #[test]
    fn artifact_names() {
        assert_eq!(artifact_file_name(&["A7-0001"], "front", "jpeg"), "A7-0001_front.jpeg");
        assert_eq!(artifact_file_name(&["A7-0001"], "", "jpeg"), "A7-0001.jpeg");
        assert_eq!(
            artifact_file_name(&["Para cetamol", "Pain/Relief"], "", "jpeg"),
            "Para_cetamol_Pain_Relief.jpeg"
        );
    }

    #[test]
    fn naming_from_row() {
        let config = PipelineConfig::builder()
            .id_column("NAFDACNumber")
            .output_dir("imgs")
            .url_column(UrlColumn::new("Front", "local_path_front", "front"))
            .build()
            .unwrap();
        let mut ds = Dataset::new(vec!["Front".into(), "NAFDACNumber".into()]);
        ds.push_row(vec![Cell::text("http://x"), Cell::text("A7 0001")]);

        let naming = FileNaming::new(&config, &ds).unwrap();
        let row = &ds.rows()[0];
        assert_eq!(naming.file_name(row, "front"), "A7_0001_front.jpeg");
        assert_eq!(naming.path_for("a.jpeg"), Path::new("imgs").join("a.jpeg"));

        let status = naming.status_link(row);
        assert_eq!(status.label, "A7_0001.jpeg");
        assert!(status.target.ends_with("A7_0001.jpeg"));
    }

    #[test]
    fn null_stem_is_incomplete() {
        let config = PipelineConfig::builder()
            .id_column("Id")
            .name_column("Name")
            .name_column("Category")
            .url_column(UrlColumn::new("Url", "out", "front"))
            .build()
            .unwrap();
        let mut ds = Dataset::new(vec!["Id".into(), "Name".into(), "Category".into(), "Url".into()]);
        ds.push_row(vec![Cell::text("1"), Cell::text("Widget"), Cell::text("Tools"), Cell::text("u")]);
        ds.push_row(vec![Cell::text("2"), Cell::text("Widget"), Cell::Empty, Cell::text("u")]);

        let naming = FileNaming::new(&config, &ds).unwrap();
        assert!(naming.has_complete_stem(&ds.rows()[0]));
        assert!(!naming.has_complete_stem(&ds.rows()[1]));
    }

    #[test]
    fn extension_from_url_when_enabled() {
        let build = |enabled: bool| {
            PipelineConfig::builder()
                .id_column("NRN")
                .url_column(UrlColumn::new("Image", "out", ""))
                .url_extension(enabled)
                .build()
                .unwrap()
        };
        let mut ds = Dataset::new(vec!["NRN".into(), "Image".into()]);
        ds.push_row(vec![Cell::text("A4-100"), Cell::text("u")]);
        let row = &ds.rows()[0];

        let naming = FileNaming::new(&build(true), &ds).unwrap();
        assert_eq!(naming.file_name_for_url(row, "", Some("http://x/a.PNG?s=1")), "A4-100.png");
        assert_eq!(naming.file_name_for_url(row, "", Some("http://x/label.pdf")), "A4-100.jpeg");
        assert_eq!(naming.file_name_for_url(row, "", Some("http://x/img")), "A4-100.jpeg");
        assert_eq!(naming.file_name_for_url(row, "", None), "A4-100.jpeg");

        let naming = FileNaming::new(&build(false), &ds).unwrap();
        assert_eq!(naming.file_name_for_url(row, "", Some("http://x/a.png")), "A4-100.jpeg");
    }

    #[test]
    fn naming_requires_stem_columns() {
        let config = PipelineConfig::builder()
            .id_column("NAFDACNumber")
            .url_column(UrlColumn::new("Front", "out", ""))
            .build()
            .unwrap();
        let ds = Dataset::new(vec!["Front".into()]);
        assert!(FileNaming::new(&config, &ds).is_none());
    }
}
