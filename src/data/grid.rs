//! Point extraction from decoded forecast grids
//!
//! Decoding of the binary grid files happens outside this crate. This
//! module takes already-decoded fields, picks the grid point nearest to
//! the forecast location and assembles one observation row per file.

use chrono::{DateTime, Utc};
use ndarray::Array2;
use std::collections::BTreeMap;
use tracing::{debug, warn};

use super::observation::{Column, ObservationTable};
use super::units::GridVariable;
use crate::error::{ForecastError, Result};

/// Latitude/longitude axes of a regular grid
#[derive(Debug, Clone)]
pub struct GridAxes {
    pub latitudes: Vec<f64>,
    pub longitudes: Vec<f64>,
}

impl GridAxes {
    pub fn new(latitudes: Vec<f64>, longitudes: Vec<f64>) -> Self {
        Self {
            latitudes,
            longitudes,
        }
    }

    /// Indices of the grid point nearest to `(lat, lon)`
    ///
    /// Longitudes are compared on the circle, so a target of -84.4 matches
    /// a grid stored as 0..360 at 275.6.
    pub fn nearest(&self, lat: f64, lon: f64) -> Option<(usize, usize)> {
        let lat_idx = nearest_index(&self.latitudes, |v| (v - lat).abs())?;
        let lon_idx = nearest_index(&self.longitudes, |v| longitude_distance(v, lon))?;
        Some((lat_idx, lon_idx))
    }
}

fn nearest_index(values: &[f64], distance: impl Fn(f64) -> f64) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .filter(|(_, v)| v.is_finite())
        .min_by(|(_, a), (_, b)| distance(**a).total_cmp(&distance(**b)))
        .map(|(i, _)| i)
}

fn longitude_distance(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

/// A decoded 2-D field, rows by latitude and columns by longitude
#[derive(Debug, Clone)]
pub struct GridField {
    pub short_name: String,
    pub values: Array2<f64>,
}

/// Contents of one decoded grid file
#[derive(Debug, Clone)]
pub struct GridFile {
    pub valid_time: DateTime<Utc>,
    pub axes: GridAxes,
    pub fields: Vec<GridField>,
}

/// One extracted row: valid time plus raw values keyed by variable
#[derive(Debug, Clone, PartialEq)]
pub struct GridRecord {
    pub timestamp: DateTime<Utc>,
    pub values: BTreeMap<GridVariable, f64>,
}

/// Extracts the point nearest to a fixed target location
#[derive(Debug, Clone, Copy)]
pub struct PointExtractor {
    pub target_lat: f64,
    pub target_lon: f64,
}

impl Default for PointExtractor {
    fn default() -> Self {
        // Atlanta, GA
        Self {
            target_lat: 33.749,
            target_lon: -84.388,
        }
    }
}

impl PointExtractor {
    pub fn new(target_lat: f64, target_lon: f64) -> Self {
        Self {
            target_lat,
            target_lon,
        }
    }

    /// Pull the known variables out of a decoded file
    ///
    /// Unknown fields are ignored. A file without any known variable is an
    /// error so that it can be logged and skipped by the caller.
    pub fn extract(&self, file: &GridFile) -> Result<GridRecord> {
        let (lat_idx, lon_idx) = file
            .axes
            .nearest(self.target_lat, self.target_lon)
            .ok_or_else(|| ForecastError::data("grid has empty coordinate axes"))?;

        let mut values = BTreeMap::new();
        for field in &file.fields {
            let Some(var) = GridVariable::from_short_name(&field.short_name) else {
                debug!("Ignoring grid field '{}'", field.short_name);
                continue;
            };
            let value = field.values.get((lat_idx, lon_idx)).copied().ok_or_else(|| {
                ForecastError::data(format!(
                    "field '{}' has shape {:?}, smaller than its axes",
                    field.short_name,
                    field.values.dim()
                ))
            })?;
            values.insert(var, value);
        }

        if values.is_empty() {
            return Err(ForecastError::data(format!(
                "no known variables in grid valid at {}",
                file.valid_time
            )));
        }

        Ok(GridRecord {
            timestamp: file.valid_time,
            values,
        })
    }
}

/// Build an observation table from extracted records
///
/// Failed records are logged and skipped. Values are converted to table
/// units and rows are sorted by timestamp; a variable absent from a record
/// becomes a missing value.
pub fn observations_from_records<I>(records: I) -> Result<ObservationTable>
where
    I: IntoIterator<Item = Result<GridRecord>>,
{
    let mut rows = Vec::new();
    let mut skipped = 0usize;

    for record in records {
        match record {
            Ok(rec) => rows.push(rec),
            Err(e) => {
                warn!("Skipping grid record: {}", e);
                skipped += 1;
            }
        }
    }

    if rows.is_empty() {
        return Err(ForecastError::data(format!(
            "no data extracted from grid records ({} failed)",
            skipped
        )));
    }

    rows.sort_by_key(|r| r.timestamp);

    let present: Vec<GridVariable> = GridVariable::ALL
        .into_iter()
        .filter(|var| rows.iter().any(|r| r.values.contains_key(var)))
        .collect();

    let columns = present
        .iter()
        .map(|var| {
            let values = rows
                .iter()
                .map(|r| r.values.get(var).map(|raw| var.to_table_units(*raw)))
                .collect();
            Column::new(var.column_name(), values)
        })
        .collect();

    let timestamps = rows.iter().map(|r| r.timestamp).collect();
    ObservationTable::new(Some(timestamps), columns)
}
