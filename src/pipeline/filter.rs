//! Row filter: drop rows that fail the declarative data-quality rules.
//!
//! Rules are applied in a fixed order: date-like exclusion, required
//! pattern, non-null columns, then title-casing. Surviving rows keep their
//! relative order and are renumbered from zero.

use crate::config::FilterRules;
use crate::dataset::{Cell, Dataset};
use crate::error::ArtfetchError;
use tracing::{debug, info};

/// Apply `rules` to `dataset`, returning only the rows that pass.
///
/// Every column named by the rules (title-case columns excepted) must exist.
pub fn apply_filters(mut dataset: Dataset, rules: &FilterRules) -> Result<Dataset, ArtfetchError> {
    dataset.require_columns(rules.referenced_columns())?;
    let (exclude, require) = rules.compile()?;
    let before = dataset.len();

    if let (Some(rule), Some(re)) = (&rules.exclude_date_like, &exclude) {
        let col = column(&dataset, &rule.column)?;
        dataset.retain_rows(|row| match row[col].as_text() {
            Some(value) => !re.is_match(&value),
            None => true,
        });
        debug!("After date-like exclusion on '{}': {} rows", rule.column, dataset.len());
    }

    if let (Some(rule), Some(re)) = (&rules.require_pattern, &require) {
        let col = column(&dataset, &rule.column)?;
        dataset.retain_rows(|row| match row[col].as_text() {
            Some(value) => re.find(&value).is_some_and(|m| m.start() == 0),
            None => false,
        });
        debug!("After required pattern on '{}': {} rows", rule.column, dataset.len());
    }

    if !rules.require_non_null.is_empty() {
        let cols: Vec<usize> = rules
            .require_non_null
            .iter()
            .map(|name| column(&dataset, name))
            .collect::<Result<_, _>>()?;
        dataset.retain_rows(|row| cols.iter().all(|&c| !row[c].is_null()));
        debug!("After non-null check: {} rows", dataset.len());
    }

    for name in &rules.title_case {
        match dataset.column_index(name) {
            Some(col) => dataset.map_column(col, |cell| match cell {
                Cell::Text(s) => Cell::Text(title_case(s)),
                other => other.clone(),
            }),
            None => debug!("Title-case column '{}' not present; skipped", name),
        }
    }

    info!(
        "Row filter kept {}/{} rows ({} removed)",
        dataset.len(),
        before,
        before - dataset.len()
    );
    Ok(dataset)
}

fn column(dataset: &Dataset, name: &str) -> Result<usize, ArtfetchError> {
    dataset
        .column_index(name)
        .ok_or_else(|| ArtfetchError::MissingColumns {
            missing: vec![name.to_string()],
            available: dataset.columns().to_vec(),
        })
}

/// Upper-case the first letter of every alphabetic run, lower-case the rest.
///
/// `"ACME medical-supplies"` → `"Acme Medical-Supplies"`.
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for ch in s.chars() {
        if ch.is_alphabetic() {
            if prev_alpha {
                out.extend(ch.to_lowercase());
            } else {
                out.extend(ch.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(ch);
            prev_alpha = false;
        }
    }
    out
}
