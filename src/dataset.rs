//! In-memory tabular data: an ordered list of rows sharing one header.

use crate::error::ArtfetchError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A spreadsheet cell value.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Cell {
    #[default]
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    /// A local artifact location; rendered as a path or a hyperlink formula
    /// depending on [`crate::config::OutputMode`].
    Link(Hyperlink),
}

impl Cell {
    pub fn text(s: impl Into<String>) -> Self {
        Cell::Text(s.into())
    }

    /// Blank cells and empty strings count as missing.
    pub fn is_null(&self) -> bool {
        match self {
            Cell::Empty => true,
            Cell::Text(s) => s.is_empty(),
            Cell::Number(n) => n.is_nan(),
            _ => false,
        }
    }

    /// The cell as text, `None` when null.
    pub fn as_text(&self) -> Option<String> {
        if self.is_null() {
            None
        } else {
            Some(self.to_string())
        }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Empty => Ok(()),
            Cell::Text(s) => f.write_str(s),
            // Whole numbers print without a trailing ".0" so ids like 1234 stay 1234.
            Cell::Number(n) if n.fract() == 0.0 && n.abs() < 1e15 => write!(f, "{}", *n as i64),
            Cell::Number(n) => write!(f, "{n}"),
            Cell::Bool(b) => write!(f, "{}", if *b { "TRUE" } else { "FALSE" }),
            Cell::Link(link) => f.write_str(&link.target),
        }
    }
}

/// A clickable reference to a local file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hyperlink {
    /// Local path the link points at.
    pub target: String,
    /// Text shown in the cell.
    pub label: String,
}

impl Hyperlink {
    pub fn new(target: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            label: label.into(),
        }
    }

    /// `=HYPERLINK("<target>", "<label>")`, with embedded quotes doubled.
    pub fn formula(&self) -> String {
        format!(
            "=HYPERLINK(\"{}\", \"{}\")",
            self.target.replace('"', "\"\""),
            self.label.replace('"', "\"\"")
        )
    }
}

/// Ordered rows under a fixed header. Every row has exactly one cell per column.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Dataset {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Dataset {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// Append a row, padding or truncating it to the header width.
    pub fn push_row(&mut self, mut row: Vec<Cell>) {
        row.resize(self.columns.len(), Cell::Empty);
        self.rows.push(row);
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Fail with every missing name at once.
    pub fn require_columns<'a>(
        &self,
        names: impl IntoIterator<Item = &'a str>,
    ) -> Result<(), ArtfetchError> {
        let missing: Vec<String> = names
            .into_iter()
            .filter(|n| !self.has_column(n))
            .map(str::to_string)
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(ArtfetchError::MissingColumns {
                missing,
                available: self.columns.clone(),
            })
        }
    }

    /// Index of `name`, appending an empty column when absent.
    pub fn ensure_column(&mut self, name: &str) -> usize {
        if let Some(idx) = self.column_index(name) {
            return idx;
        }
        self.columns.push(name.to_string());
        for row in &mut self.rows {
            row.push(Cell::Empty);
        }
        self.columns.len() - 1
    }

    pub fn cell(&self, row: usize, col: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(col))
    }

    /// Cell by column name.
    pub fn get(&self, row: usize, column: &str) -> Option<&Cell> {
        self.column_index(column).and_then(|c| self.cell(row, c))
    }

    pub fn set(&mut self, row: usize, col: usize, value: Cell) {
        if let Some(cell) = self.rows.get_mut(row).and_then(|r| r.get_mut(col)) {
            *cell = value;
        }
    }

    /// Keep rows for which `keep` returns true, preserving order.
    pub fn retain_rows(&mut self, mut keep: impl FnMut(&[Cell]) -> bool) {
        self.rows.retain(|r| keep(r));
    }

    /// Apply `f` to every cell of one column.
    pub fn map_column(&mut self, col: usize, mut f: impl FnMut(&Cell) -> Cell) {
        for row in &mut self.rows {
            if let Some(cell) = row.get_mut(col) {
                *cell = f(cell);
            }
        }
    }
}
