//! Result writer: serialise a dataset to `.xlsx`, plus the reference-sheet merge.
//!
//! [`Cell::Link`] values are written as their local path in
//! [`OutputMode::Plain`] and as `=HYPERLINK("<path>", "<label>")` formulas in
//! [`OutputMode::Hyperlink`]. Sentinels are plain text in both modes.

use crate::config::{compile_pattern, MergeConfig, OutputMode, PipelineConfig};
use crate::dataset::{Cell, Dataset};
use crate::error::ArtfetchError;
use crate::pipeline::naming::FileNaming;
use rust_xlsxwriter::{Format, Workbook, Worksheet, XlsxError};
use std::collections::HashMap;
use std::path::Path;
use tracing::{info, warn};

/// Sheet name of every written workbook.
pub const OUTPUT_SHEET: &str = "Sheet1";

/// Write `dataset` to `path` as a single-sheet workbook with a bold header.
pub fn write_dataset(
    dataset: &Dataset,
    path: impl AsRef<Path>,
    mode: OutputMode,
) -> Result<(), ArtfetchError> {
    let path = path.as_ref();
    let write_err = |e: XlsxError| ArtfetchError::SpreadsheetWrite {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| ArtfetchError::SpreadsheetWrite {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
    }

    let mut workbook = Workbook::new();
    let sheet = workbook.add_worksheet();
    sheet.set_name(OUTPUT_SHEET).map_err(write_err)?;
    fill_sheet(sheet, dataset, mode).map_err(write_err)?;
    workbook.save(path).map_err(write_err)?;

    info!(
        "Wrote {} rows to '{}' ({:?} mode)",
        dataset.len(),
        path.display(),
        mode
    );
    Ok(())
}

fn fill_sheet(sheet: &mut Worksheet, dataset: &Dataset, mode: OutputMode) -> Result<(), XlsxError> {
    let header = Format::new().set_bold();
    for (c, name) in dataset.columns().iter().enumerate() {
        sheet.write_string_with_format(0, c as u16, name, &header)?;
    }

    for (r, row) in dataset.rows().iter().enumerate() {
        let r = r as u32 + 1;
        for (c, cell) in row.iter().enumerate() {
            let c = c as u16;
            match cell {
                Cell::Empty => {}
                Cell::Text(s) => {
                    sheet.write_string(r, c, s)?;
                }
                Cell::Number(n) if n.is_finite() => {
                    sheet.write_number(r, c, *n)?;
                }
                Cell::Number(_) => {}
                Cell::Bool(b) => {
                    sheet.write_boolean(r, c, *b)?;
                }
                Cell::Link(link) => match mode {
                    OutputMode::Plain => {
                        sheet.write_string(r, c, &link.target)?;
                    }
                    OutputMode::Hyperlink => {
                        sheet.write_formula(r, c, link.formula().as_str())?;
                    }
                },
            }
        }
    }
    Ok(())
}

/// Inner-join `enriched` with `reference` and rebuild every link column.
///
/// The join key is extracted from `merge.filename_column` of the reference
/// with `merge.key_pattern` (capture group 1, else the whole match) and
/// compared with the id column's text. Left order is kept; a left row
/// matching N reference rows appears N times. Reference rows without a key
/// never match.
///
/// Output and status columns are then regenerated from the naming
/// convention alone, whether or not the fetch succeeded. Rebuilt links whose
/// file does not exist are logged, not dropped.
pub fn merge_with_reference(
    enriched: &Dataset,
    reference: &Dataset,
    merge: &MergeConfig,
    config: &PipelineConfig,
) -> Result<Dataset, ArtfetchError> {
    enriched.require_columns([config.id_column.as_str()])?;
    reference.require_columns([merge.filename_column.as_str()])?;
    let key_re = compile_pattern(&merge.key_pattern)?;

    let id_col = enriched
        .column_index(&config.id_column)
        .ok_or_else(|| ArtfetchError::Internal("id column vanished".into()))?;
    let file_col = reference
        .column_index(&merge.filename_column)
        .ok_or_else(|| ArtfetchError::Internal("filename column vanished".into()))?;

    let mut key_counts: HashMap<String, usize> = HashMap::new();
    for row in reference.rows() {
        let Some(name) = row[file_col].as_text() else {
            continue;
        };
        if let Some(caps) = key_re.captures(&name) {
            let key = caps.get(1).or_else(|| caps.get(0)).map(|m| m.as_str());
            if let Some(key) = key {
                *key_counts.entry(key.to_string()).or_default() += 1;
            }
        }
    }

    let mut merged = Dataset::new(enriched.columns().to_vec());
    for row in enriched.rows() {
        let Some(id) = row[id_col].as_text() else {
            continue;
        };
        let copies = key_counts.get(&id).copied().unwrap_or(0);
        for _ in 0..copies {
            merged.push_row(row.clone());
        }
    }

    rebuild_links(&mut merged, config)?;
    info!(
        "Merged {} rows with {} reference keys → {} rows",
        enriched.len(),
        key_counts.len(),
        merged.len()
    );
    Ok(merged)
}

fn rebuild_links(dataset: &mut Dataset, config: &PipelineConfig) -> Result<(), ArtfetchError> {
    let naming = FileNaming::new(config, dataset).ok_or_else(|| ArtfetchError::MissingColumns {
        missing: config
            .stem_columns()
            .into_iter()
            .filter(|c| !dataset.has_column(c))
            .map(str::to_string)
            .collect(),
        available: dataset.columns().to_vec(),
    })?;

    let targets: Vec<(usize, Option<usize>, String)> = config
        .url_columns
        .iter()
        .filter_map(|u| {
            let out = dataset.column_index(&u.output)?;
            Some((out, dataset.column_index(&u.source), u.tag.clone()))
        })
        .collect();
    let status_col = config
        .status_column
        .as_deref()
        .and_then(|s| dataset.column_index(s));

    let mut dangling = 0usize;
    for r in 0..dataset.len() {
        let row = dataset.rows()[r].clone();
        let mut updates = Vec::with_capacity(targets.len() + 1);
        for (col, source, tag) in &targets {
            let url = source.and_then(|c| row.get(c)).and_then(Cell::as_text);
            let file_name = naming.file_name_for_url(&row, tag, url.as_deref().map(str::trim));
            updates.push((*col, naming.link(&file_name)));
        }
        if let Some(col) = status_col {
            updates.push((col, naming.status_link(&row)));
        }
        for (col, link) in updates {
            if !Path::new(&link.target).exists() {
                dangling += 1;
                warn!("Rebuilt hyperlink points at a missing file: {}", link.target);
            }
            dataset.set(r, col, Cell::Link(link));
        }
    }

    if dangling > 0 {
        warn!("{} rebuilt hyperlink(s) point at files that do not exist", dangling);
    }
    Ok(())
}
