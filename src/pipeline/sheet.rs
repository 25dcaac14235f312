//! Spreadsheet loading: first row is the header, every following row a record.

use crate::dataset::{Cell, Dataset};
use crate::error::ArtfetchError;
use calamine::{open_workbook_auto, Data, Range, Reader};
use std::path::Path;
use tracing::{debug, info};

/// Load one sheet of a workbook into a [`Dataset`].
///
/// `sheet = None` reads the first sheet. Header cells are trimmed; blank
/// header cells become `Unnamed: N` so every column stays addressable.
pub fn load_dataset(path: impl AsRef<Path>, sheet: Option<&str>) -> Result<Dataset, ArtfetchError> {
    let path = path.as_ref();
    let read_err = |detail: String| ArtfetchError::SpreadsheetRead {
        path: path.to_path_buf(),
        detail,
    };

    let mut workbook = open_workbook_auto(path).map_err(|e| read_err(e.to_string()))?;

    let (sheet_name, range) = match sheet {
        Some(name) => {
            let range = workbook
                .worksheet_range(name)
                .map_err(|e| read_err(format!("sheet '{name}': {e}")))?;
            (name.to_string(), range)
        }
        None => {
            let name = workbook
                .sheet_names()
                .first()
                .cloned()
                .ok_or_else(|| read_err("workbook has no sheets".into()))?;
            let range = workbook
                .worksheet_range(&name)
                .map_err(|e| read_err(format!("sheet '{name}': {e}")))?;
            (name, range)
        }
    };

    let dataset = range_to_dataset(&range).ok_or_else(|| ArtfetchError::EmptySheet {
        path: path.to_path_buf(),
        sheet: sheet_name.clone(),
    })?;

    info!(
        "Loaded {} rows × {} columns from '{}' [{}]",
        dataset.len(),
        dataset.columns().len(),
        path.display(),
        sheet_name
    );
    Ok(dataset)
}

fn range_to_dataset(range: &Range<Data>) -> Option<Dataset> {
    let mut rows = range.rows();
    let header = rows.next()?;

    let columns: Vec<String> = header
        .iter()
        .enumerate()
        .map(|(i, cell)| match to_cell(cell) {
            c if c.is_null() => format!("Unnamed: {i}"),
            c => c.to_string().trim().to_string(),
        })
        .collect();
    debug!("Header: {:?}", columns);

    let mut dataset = Dataset::new(columns);
    for row in rows {
        let cells: Vec<Cell> = row.iter().map(to_cell).collect();
        // Trailing blank rows inside the used range carry no record.
        if cells.iter().all(Cell::is_null) {
            continue;
        }
        dataset.push_row(cells);
    }
    Some(dataset)
}

fn to_cell(data: &Data) -> Cell {
    match data {
        Data::Empty | Data::Error(_) => Cell::Empty,
        Data::String(s) => Cell::Text(s.clone()),
        Data::Int(i) => Cell::Number(*i as f64),
        Data::Float(f) => Cell::Number(*f),
        Data::Bool(b) => Cell::Bool(*b),
        Data::DateTime(dt) => Cell::Number(dt.as_f64()),
        Data::DateTimeIso(s) | Data::DurationIso(s) => Cell::Text(s.clone()),
    }
}
