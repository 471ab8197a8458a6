//! Schema inference from CSV row samples.
//!
//! Samples are normalized into one CSV table, the header row is detected, and
//! each column is classified by strict type guessing: a column is an integer
//! (or a decimal) only when every non-empty sampled value parses as one.
//! Configured date and string overrides then take precedence over the guess.

use indexmap::IndexMap;
use snafu::prelude::*;
use tracing::{debug, info};

use super::normalize::samples_to_table;
use super::{ColumnSchema, SchemaFragment};
use crate::config::TableSpec;
use crate::error::{InferenceError, TableParseSnafu};
use crate::types::RowSample;

/// Rows may have this many fewer non-empty cells than the modal row and
/// still be taken as the header.
const HEADER_TOLERANCE: usize = 1;

/// Coarse type guessed for a column, ordered from most to least specific.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuessedType {
    Integer,
    Decimal,
    String,
}

impl From<GuessedType> for ColumnSchema {
    fn from(guess: GuessedType) -> Self {
        match guess {
            GuessedType::Integer => ColumnSchema::Integer,
            GuessedType::Decimal => ColumnSchema::Number,
            GuessedType::String => ColumnSchema::String,
        }
    }
}

/// Infer a schema fragment from row samples.
///
/// The fragment has exactly one entry per detected header column. With
/// `guess_types` off every column is a nullable string and values are not
/// inspected. Otherwise `date_overrides` win over `string_overrides`, which
/// win over the guessed type.
///
/// A malformed sample table is returned as an error; it is never recovered
/// from here.
pub fn infer_schema(
    samples: &[RowSample],
    table: &TableSpec,
) -> Result<SchemaFragment, InferenceError> {
    let buffer = samples_to_table(samples)?;
    let rows = parse_table(&buffer)?;

    let (offset, headers) = detect_header(&rows);
    let data = rows.get(offset + 1..).unwrap_or_default();

    if !table.guess_types {
        info!(
            table = %table.table_name,
            "Type guessing is turned off (guess_types is false) - all columns will be strings"
        );
        return Ok(headers
            .into_iter()
            .map(|header| (header, ColumnSchema::String))
            .collect());
    }

    let guesses = guess_column_types(data, headers.len());
    debug!(
        table = %table.table_name,
        "Guessed {} column types from {} sampled rows",
        guesses.len(),
        data.len()
    );

    Ok(headers
        .into_iter()
        .zip(guesses)
        .map(|(header, guess)| {
            let schema = if table.date_overrides.contains(&header) {
                ColumnSchema::DateTime
            } else if table.string_overrides.contains(&header) {
                ColumnSchema::String
            } else {
                guess.into()
            };
            (header, schema)
        })
        .collect())
}

/// Parse a CSV buffer into rows of cells. Rows may differ in width.
fn parse_table(buffer: &[u8]) -> Result<Vec<Vec<String>>, InferenceError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_reader(buffer);

    reader
        .records()
        .map(|record| {
            record
                .map(|r| r.iter().map(str::to_string).collect())
                .context(TableParseSnafu)
        })
        .collect()
}

fn filled_cells(row: &[String]) -> usize {
    row.iter().filter(|cell| !cell.is_empty()).count()
}

/// Find the header row and its offset.
///
/// The modal number of non-empty cells is taken over rows with more than one
/// filled cell; the header is the first row within [`HEADER_TOLERANCE`] of it.
/// No rows at all yields an empty header at offset 0.
pub fn detect_header(rows: &[Vec<String>]) -> (usize, Vec<String>) {
    let mut counts: IndexMap<usize, usize> = IndexMap::new();
    for row in rows {
        let filled = filled_cells(row);
        if filled > 1 {
            *counts.entry(filled).or_default() += 1;
        }
    }

    // First-seen width wins ties.
    let modal = counts
        .iter()
        .fold(None, |best: Option<(usize, usize)>, (&width, &count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((width, count)),
        })
        .map(|(width, _)| width)
        .unwrap_or(0);

    rows.iter()
        .position(|row| filled_cells(row) + HEADER_TOLERANCE >= modal)
        .map(|offset| (offset, rows[offset].clone()))
        .unwrap_or_default()
}

/// Per-column state of strict guessing.
#[derive(Debug, Clone, Copy)]
struct Candidate {
    seen_value: bool,
    integer: bool,
    decimal: bool,
}

impl Candidate {
    fn new() -> Self {
        Self {
            seen_value: false,
            integer: true,
            decimal: true,
        }
    }

    fn update(&mut self, value: &str) {
        if value.is_empty() {
            return;
        }
        self.seen_value = true;
        let trimmed = value.trim();
        self.integer = self.integer && is_integer(trimmed);
        self.decimal = self.decimal && is_decimal(trimmed);
    }

    fn decide(self) -> GuessedType {
        if !self.seen_value {
            GuessedType::String
        } else if self.integer {
            GuessedType::Integer
        } else if self.decimal {
            GuessedType::Decimal
        } else {
            GuessedType::String
        }
    }
}

/// An integer, or a finite float with no fractional part such as `3.0`.
fn is_integer(value: &str) -> bool {
    value.parse::<i64>().is_ok()
        || value
            .parse::<f64>()
            .is_ok_and(|f| f.is_finite() && f.fract() == 0.0)
}

/// A finite decimal number.
fn is_decimal(value: &str) -> bool {
    value.parse::<f64>().is_ok_and(f64::is_finite)
}

/// Strictly guess one type per column.
///
/// Empty cells are ignored. A column without any value, including columns
/// beyond the width of every row, is a string.
pub fn guess_column_types(rows: &[Vec<String>], width: usize) -> Vec<GuessedType> {
    let mut candidates = vec![Candidate::new(); width];
    for row in rows {
        for (candidate, value) in candidates.iter_mut().zip(row) {
            candidate.update(value);
        }
    }
    candidates.into_iter().map(Candidate::decide).collect()
}
