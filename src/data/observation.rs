//! Observation table: timestamped rows of numeric weather variables

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use csv::{Reader, Writer};
use std::collections::HashSet;
use std::io::Read;
use std::path::Path;

use crate::error::{ForecastError, Result};

/// Name of the timestamp column in tabular files
pub const TIMESTAMP_COLUMN: &str = "timestamp";

/// Output format for timestamps written back to CSV
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// A named numeric column; `None` marks a missing value
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Option<f64>>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Option<f64>>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Column without missing values
    pub fn dense(name: impl Into<String>, values: Vec<f64>) -> Self {
        Self::new(name, values.into_iter().map(Some).collect())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_none()).count()
    }
}

/// Raw, possibly unordered table of weather observations
///
/// The timestamp column is optional so that tables produced by other tools
/// can be loaded and inspected; windowing requires it.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationTable {
    timestamps: Option<Vec<DateTime<Utc>>>,
    columns: Vec<Column>,
}

impl ObservationTable {
    /// Create a table, checking that all columns have the same length
    pub fn new(timestamps: Option<Vec<DateTime<Utc>>>, columns: Vec<Column>) -> Result<Self> {
        let expected = match (&timestamps, columns.first()) {
            (Some(ts), _) => ts.len(),
            (None, Some(col)) => col.len(),
            (None, None) => 0,
        };

        let mut seen = HashSet::new();
        for col in &columns {
            if col.name == TIMESTAMP_COLUMN {
                return Err(ForecastError::data(
                    "'timestamp' cannot be used as a numeric column name",
                ));
            }
            if !seen.insert(col.name.as_str()) {
                return Err(ForecastError::data(format!(
                    "duplicate column '{}'",
                    col.name
                )));
            }
            if col.len() != expected {
                return Err(ForecastError::data(format!(
                    "column '{}' has {} values, expected {}",
                    col.name,
                    col.len(),
                    expected
                )));
            }
        }

        Ok(Self {
            timestamps,
            columns,
        })
    }

    pub fn len(&self) -> usize {
        match (&self.timestamps, self.columns.first()) {
            (Some(ts), _) => ts.len(),
            (None, Some(col)) => col.len(),
            (None, None) => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub(crate) fn into_parts(self) -> (Option<Vec<DateTime<Utc>>>, Vec<Column>) {
        (self.timestamps, self.columns)
    }

    /// Load a table from a CSV file
    pub fn from_csv<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|e| ForecastError::io(path, e))?;
        Self::from_reader(file)
    }

    /// Parse a table from any CSV source
    ///
    /// Empty cells and `NaN` are read as missing values.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut reader = Reader::from_reader(reader);
        let headers = reader
            .headers()
            .map_err(|e| ForecastError::data(format!("invalid CSV header: {}", e)))?
            .clone();

        let ts_index = headers.iter().position(|h| h.trim() == TIMESTAMP_COLUMN);
        let mut timestamps = ts_index.map(|_| Vec::new());
        let mut columns: Vec<Column> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| Some(*i) != ts_index)
            .map(|(_, h)| Column::new(h.trim(), Vec::new()))
            .collect();

        for (row, record) in reader.records().enumerate() {
            let record =
                record.map_err(|e| ForecastError::data(format!("row {}: {}", row + 1, e)))?;

            let mut col_idx = 0;
            for (i, field) in record.iter().enumerate() {
                if Some(i) == ts_index {
                    if let Some(ts) = timestamps.as_mut() {
                        ts.push(parse_timestamp(field)?);
                    }
                    continue;
                }
                let column = columns.get_mut(col_idx).ok_or_else(|| {
                    ForecastError::data(format!("row {} has more fields than the header", row + 1))
                })?;
                column.values.push(parse_value(field).ok_or_else(|| {
                    ForecastError::data(format!(
                        "row {}: column '{}' has non-numeric value '{}'",
                        row + 1,
                        column.name,
                        field
                    ))
                })?);
                col_idx += 1;
            }
        }

        Self::new(timestamps, columns)
    }

    /// Write the table as CSV, timestamp first
    pub fn to_csv<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|e| ForecastError::io(parent, e))?;
            }
        }

        let to_data = |e: csv::Error| ForecastError::data(format!("CSV write failed: {}", e));
        let mut writer = Writer::from_path(path).map_err(to_data)?;

        let mut header: Vec<&str> = Vec::with_capacity(self.columns.len() + 1);
        if self.timestamps.is_some() {
            header.push(TIMESTAMP_COLUMN);
        }
        header.extend(self.columns.iter().map(|c| c.name.as_str()));
        writer.write_record(&header).map_err(to_data)?;

        for row in 0..self.len() {
            let mut record: Vec<String> = Vec::with_capacity(header.len());
            if let Some(ts) = &self.timestamps {
                record.push(ts[row].format(TIMESTAMP_FORMAT).to_string());
            }
            for col in &self.columns {
                record.push(col.values[row].map(|v| v.to_string()).unwrap_or_default());
            }
            writer.write_record(&record).map_err(to_data)?;
        }

        writer.flush().map_err(|e| ForecastError::io(path, e))?;
        Ok(())
    }
}

/// Parse a timestamp in RFC 3339 or `YYYY-MM-DD[ T]HH:MM:SS[.f]` (UTC) form
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(ForecastError::data(format!("unparseable timestamp '{}'", raw)))
}

fn parse_value(raw: &str) -> Option<Option<f64>> {
    let raw = raw.trim();
    if raw.is_empty() || raw.eq_ignore_ascii_case("nan") {
        return Some(None);
    }
    raw.parse::<f64>().ok().map(|v| if v.is_nan() { None } else { Some(v) })
}
