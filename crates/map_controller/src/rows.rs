//! Conversion of raw store rows into validated reports.

use serde_json::Value;
use shared::{
    domain::{Coordinate, CoordinateError, Report},
    protocol::CellValue,
};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RowError {
    #[error("row has {0} cells, expected at least 3")]
    TooShort(usize),
    #[error("timestamp cell is not text")]
    Timestamp,
    #[error("{axis} cell {value} is not a number")]
    NotNumeric { axis: &'static str, value: String },
    #[error(transparent)]
    OutOfRange(#[from] CoordinateError),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedRows {
    pub reports: Vec<Report>,
    pub skipped: usize,
}

/// Malformed rows (a header row included) are skipped and counted rather
/// than turned into NaN pins.
pub fn parse_rows(rows: &[Vec<CellValue>]) -> ParsedRows {
    let mut parsed = ParsedRows::default();
    for (index, row) in rows.iter().enumerate() {
        match parse_row(row) {
            Ok(report) => parsed.reports.push(report),
            Err(err) => {
                tracing::warn!(row = index + 1, "skipping malformed report row: {err}");
                parsed.skipped += 1;
            }
        }
    }
    parsed
}

pub fn parse_row(row: &[CellValue]) -> Result<Report, RowError> {
    let [timestamp, latitude, longitude, ..] = row else {
        return Err(RowError::TooShort(row.len()));
    };

    let timestamp = match timestamp {
        Value::String(text) => text.clone(),
        Value::Number(number) => number.to_string(),
        _ => return Err(RowError::Timestamp),
    };
    let latitude = numeric_cell("latitude", latitude)?;
    let longitude = numeric_cell("longitude", longitude)?;

    Ok(Report::new(timestamp, Coordinate::new(latitude, longitude)?))
}

fn numeric_cell(axis: &'static str, cell: &CellValue) -> Result<f64, RowError> {
    let value = match cell {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse::<f64>().ok(),
        _ => None,
    };
    value
        .filter(|value| value.is_finite())
        .ok_or_else(|| RowError::NotNumeric {
            axis,
            value: cell.to_string(),
        })
}

#[cfg(test)]
#[path = "tests/rows_tests.rs"]
mod tests;
