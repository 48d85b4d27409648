use std::ops::RangeInclusive;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::protocol::CellValue;

pub const LATITUDE_RANGE: RangeInclusive<f64> = -90.0..=90.0;
pub const LONGITUDE_RANGE: RangeInclusive<f64> = -180.0..=180.0;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum CoordinateError {
    #[error("latitude {0} is outside [-90, 90]")]
    Latitude(f64),
    #[error("longitude {0} is outside [-180, 180]")]
    Longitude(f64),
}

/// A WGS84 position. Construction through [`Coordinate::new`] guarantees both
/// components are finite and inside their valid ranges.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, CoordinateError> {
        // NaN fails `contains`, so non-finite values are rejected here too.
        if !LATITUDE_RANGE.contains(&latitude) {
            return Err(CoordinateError::Latitude(latitude));
        }
        if !LONGITUDE_RANGE.contains(&longitude) {
            return Err(CoordinateError::Longitude(longitude));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }
}

/// A timestamped coordinate submitted by a user. Reports carry no id; the
/// backing store identifies them by row position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub timestamp: String,
    pub latitude: f64,
    pub longitude: f64,
}

impl Report {
    pub fn new(timestamp: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            timestamp: timestamp.into(),
            latitude: coordinate.latitude,
            longitude: coordinate.longitude,
        }
    }

    pub fn submitted_at(at: DateTime<Utc>, coordinate: Coordinate) -> Self {
        Self::new(report_timestamp(at), coordinate)
    }

    /// Row layout in the backing store: `[timestamp, latitude, longitude]`.
    /// Coordinates go out as JSON numbers.
    pub fn to_row(&self) -> Vec<CellValue> {
        vec![
            CellValue::from(self.timestamp.clone()),
            CellValue::from(self.latitude),
            CellValue::from(self.longitude),
        ]
    }
}

/// ISO-8601 UTC with millisecond precision, e.g. `2024-05-01T09:30:00.125Z`.
pub fn report_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;
