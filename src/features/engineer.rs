//! Cleaning, cyclical time features and window slicing

use chrono::{DateTime, Datelike, Timelike, Utc};
use ndarray::{s, Array1, Array2, Array3, ArrayView1};
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use tracing::{debug, info};

use super::scaler::StandardScaler;
use crate::data::{Column, ObservationTable};
use crate::error::{ForecastError, Result};

/// Raw hour-of-day column, kept in the table but never fed to the model
pub const HOUR_COLUMN: &str = "hour";
/// Raw 1-based day-of-year column, kept in the table but never fed to the model
pub const DAY_OF_YEAR_COLUMN: &str = "day_of_year";
/// Cyclical encodings appended by [`FeatureEngineer::prepare`]
pub const CYCLICAL_COLUMNS: [&str; 4] = ["hour_sin", "hour_cos", "day_sin", "day_cos"];
/// Default forecast target
pub const DEFAULT_TARGET: &str = "temperature";

/// Cleaned table: strictly increasing timestamps, no missing values
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedTable {
    timestamps: Option<Vec<DateTime<Utc>>>,
    names: Vec<String>,
    /// rows x columns
    values: Array2<f64>,
}

impl PreparedTable {
    pub fn len(&self) -> usize {
        self.values.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn timestamps(&self) -> Option<&[DateTime<Utc>]> {
        self.timestamps.as_deref()
    }

    pub fn column_names(&self) -> &[String] {
        &self.names
    }

    pub fn column(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        self.names
            .iter()
            .position(|n| n == name)
            .map(|idx| self.values.column(idx))
    }

    /// Matrix of the named columns, in the given order
    pub fn select(&self, names: &[String]) -> Result<Array2<f64>> {
        let mut out = Array2::zeros((self.len(), names.len()));
        for (j, name) in names.iter().enumerate() {
            let col = self
                .column(name)
                .ok_or_else(|| ForecastError::data(format!("missing feature column '{}'", name)))?;
            out.column_mut(j).assign(&col);
        }
        Ok(out)
    }

    fn head(&self, rows: usize) -> Self {
        Self {
            timestamps: self
                .timestamps
                .as_ref()
                .map(|ts| ts[..rows.min(ts.len())].to_vec()),
            names: self.names.clone(),
            values: self.values.slice(s![..rows.min(self.len()), ..]).to_owned(),
        }
    }
}

/// Rows that training windows read from; the only valid input for fitting
#[derive(Debug, Clone)]
pub struct TrainingPartition {
    table: PreparedTable,
}

impl TrainingPartition {
    pub fn table(&self) -> &PreparedTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

/// Chronological train/validation split over windows
#[derive(Debug, Clone)]
pub struct ChronologicalSplit {
    pub train: TrainingPartition,
    /// Windows whose inputs and targets lie entirely in `train`
    pub train_windows: usize,
    pub total_windows: usize,
}

impl ChronologicalSplit {
    pub fn val_windows(&self) -> usize {
        self.total_windows - self.train_windows
    }
}

/// Input windows with their standardized targets
#[derive(Debug, Clone)]
pub struct SequenceSet {
    /// (windows, sequence_length, features)
    pub inputs: Array3<f64>,
    /// Standardized target per window
    pub targets: Array1<f64>,
    /// Timestamp of each target row
    pub timestamps: Vec<DateTime<Utc>>,
    pub feature_columns: Vec<String>,
}

impl SequenceSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn n_features(&self) -> usize {
        self.inputs.dim().2
    }

    /// Split into `[0, at)` and `[at, len)`
    pub fn split_at(&self, at: usize) -> (SequenceSet, SequenceSet) {
        let at = at.min(self.len());
        let head = SequenceSet {
            inputs: self.inputs.slice(s![..at, .., ..]).to_owned(),
            targets: self.targets.slice(s![..at]).to_owned(),
            timestamps: self.timestamps[..at].to_vec(),
            feature_columns: self.feature_columns.clone(),
        };
        let tail = SequenceSet {
            inputs: self.inputs.slice(s![at.., .., ..]).to_owned(),
            targets: self.targets.slice(s![at..]).to_owned(),
            timestamps: self.timestamps[at..].to_vec(),
            feature_columns: self.feature_columns.clone(),
        };
        (head, tail)
    }
}

/// Turns observation tables into standardized model windows
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureEngineer {
    /// Number of timesteps per input window
    pub sequence_length: usize,
    /// Steps between the window's last row and its target row
    pub forecast_horizon: usize,
    /// Name of the forecast target column
    pub target_column: String,
    scaler: Option<StandardScaler>,
}

impl FeatureEngineer {
    /// Create an engineer forecasting `temperature`
    ///
    /// With the 3-hourly grid, the defaults of 8 and 8 mean "use the last
    /// 24 hours to predict 24 hours ahead".
    pub fn new(sequence_length: usize, forecast_horizon: usize) -> Self {
        Self {
            sequence_length,
            forecast_horizon,
            target_column: DEFAULT_TARGET.to_string(),
            scaler: None,
        }
    }

    pub fn with_target(mut self, target: impl Into<String>) -> Self {
        self.target_column = target.into();
        self
    }

    /// Restore a previously fitted scaler
    pub fn with_scaler(mut self, scaler: StandardScaler) -> Result<Self> {
        if scaler.target() != self.target_column {
            return Err(ForecastError::data(format!(
                "scaler target '{}' does not match configured target '{}'",
                scaler.target(),
                self.target_column
            )));
        }
        self.scaler = Some(scaler);
        Ok(self)
    }

    pub fn scaler(&self) -> Option<&StandardScaler> {
        self.scaler.as_ref()
    }

    pub fn into_scaler(self) -> Option<StandardScaler> {
        self.scaler
    }

    /// Number of windows a table of `rows` rows yields
    pub fn window_count(&self, rows: usize) -> usize {
        (rows + 1).saturating_sub(self.sequence_length + self.forecast_horizon)
    }

    /// Index of the target row for window `i`
    pub fn target_index(&self, i: usize) -> usize {
        i + self.sequence_length + self.forecast_horizon - 1
    }

    /// Minimum rows needed for one window
    pub fn min_rows(&self) -> usize {
        self.sequence_length + self.forecast_horizon
    }

    /// Clean a raw table
    ///
    /// Sorts by timestamp, drops repeated timestamps (first wins), derives
    /// `hour`, `day_of_year` and their sine/cosine encodings, then fills gaps
    /// forward and finally backward for leading gaps.
    pub fn prepare(&self, table: ObservationTable) -> Result<PreparedTable> {
        let input_rows = table.len();
        let (timestamps, mut columns) = table.into_parts();

        let timestamps = match timestamps {
            Some(ts) => {
                let keep = dedup_sorted_order(&ts);
                columns = columns
                    .into_iter()
                    .map(|col| Column::new(col.name, keep.iter().map(|&i| col.values[i]).collect()))
                    .collect();
                let ts: Vec<DateTime<Utc>> = keep.iter().map(|&i| ts[i]).collect();

                for (name, values) in time_features(&ts) {
                    upsert(&mut columns, Column::dense(name, values));
                }
                Some(ts)
            }
            None => {
                debug!("Table has no timestamp column; skipping time features");
                None
            }
        };

        let rows = timestamps
            .as_ref()
            .map(Vec::len)
            .or_else(|| columns.first().map(Column::len))
            .unwrap_or(0);

        let mut values = Array2::zeros((rows, columns.len()));
        let mut names = Vec::with_capacity(columns.len());
        for (j, col) in columns.into_iter().enumerate() {
            let filled = fill_forward_backward(&col.values).ok_or_else(|| {
                ForecastError::data(format!("column '{}' has no values", col.name))
            })?;
            values.column_mut(j).assign(&Array1::from(filled));
            names.push(col.name);
        }

        if rows < input_rows {
            info!(
                "Dropped {} duplicate timestamps ({} rows remain)",
                input_rows - rows,
                rows
            );
        }

        Ok(PreparedTable {
            timestamps,
            names,
            values,
        })
    }

    /// Model input columns, target first
    ///
    /// All numeric columns except the raw `hour` and `day_of_year`; the
    /// cyclical encodings stay. The configured target is moved to position
    /// 0, which is the slot the predictor inverts.
    pub fn feature_columns(&self, table: &PreparedTable) -> Result<Vec<String>> {
        if table.column(&self.target_column).is_none() {
            return Err(ForecastError::data(format!(
                "target column '{}' not found in table (columns: {:?})",
                self.target_column,
                table.column_names()
            )));
        }

        let mut columns = vec![self.target_column.clone()];
        columns.extend(
            table
                .column_names()
                .iter()
                .filter(|name| {
                    name.as_str() != self.target_column
                        && name.as_str() != HOUR_COLUMN
                        && name.as_str() != DAY_OF_YEAR_COLUMN
                })
                .cloned(),
        );
        Ok(columns)
    }

    /// Split a prepared table chronologically before any fitting happens
    ///
    /// The first `floor(windows * train_fraction)` windows are for training.
    /// The partition holds exactly the rows those windows touch, so the
    /// scaler never sees a validation target.
    pub fn split(&self, table: &PreparedTable, train_fraction: f64) -> Result<ChronologicalSplit> {
        if !(train_fraction > 0.0 && train_fraction < 1.0) {
            return Err(ForecastError::data(format!(
                "train fraction must be in (0, 1), got {}",
                train_fraction
            )));
        }
        self.check_lengths()?;
        self.require_timestamps(table)?;

        let total_windows = self.window_count(table.len());
        if total_windows == 0 {
            return Err(ForecastError::insufficient_rows(
                table.len(),
                self.sequence_length,
                self.forecast_horizon,
            ));
        }

        let train_windows = (total_windows as f64 * train_fraction).floor() as usize;
        if train_windows == 0 {
            return Err(ForecastError::data(format!(
                "{} windows leave no training windows at train fraction {}",
                total_windows, train_fraction
            )));
        }

        let partition_rows = train_windows + self.sequence_length + self.forecast_horizon - 1;
        Ok(ChronologicalSplit {
            train: TrainingPartition {
                table: table.head(partition_rows),
            },
            train_windows,
            total_windows,
        })
    }

    /// Fit the scaler on a training partition
    pub fn fit(&mut self, partition: &TrainingPartition) -> Result<&StandardScaler> {
        let columns = self.feature_columns(partition.table())?;
        let matrix = partition.table().select(&columns)?;
        let scaler = StandardScaler::fit(&matrix, columns, &self.target_column)?;
        info!(
            "Fitted scaler on {} rows x {} features",
            matrix.nrows(),
            scaler.n_features()
        );
        Ok(self.scaler.insert(scaler))
    }

    /// Fit on the partition and return its windows
    pub fn fit_transform(&mut self, partition: &TrainingPartition) -> Result<SequenceSet> {
        self.fit(partition)?;
        self.transform(partition.table())
    }

    /// Standardize with the fitted scaler and slice every valid window
    ///
    /// Returns an empty set when the table is too short; callers decide
    /// whether that is fatal.
    pub fn transform(&self, table: &PreparedTable) -> Result<SequenceSet> {
        self.check_lengths()?;
        let scaler = self
            .scaler
            .as_ref()
            .ok_or_else(|| ForecastError::data("scaler is not fitted"))?;
        let timestamps = self.require_timestamps(table)?;

        let columns = self.feature_columns(table)?;
        scaler.check_columns(&columns)?;
        let scaled = scaler.transform(&table.select(&columns)?)?;

        let count = self.window_count(table.len());
        let n_features = columns.len();
        let mut inputs = Array3::zeros((count, self.sequence_length, n_features));
        let mut targets = Array1::zeros(count);
        let mut target_times = Vec::with_capacity(count);

        for i in 0..count {
            inputs
                .slice_mut(s![i, .., ..])
                .assign(&scaled.slice(s![i..i + self.sequence_length, ..]));
            let t = self.target_index(i);
            targets[i] = scaled[[t, 0]];
            target_times.push(timestamps[t]);
        }

        Ok(SequenceSet {
            inputs,
            targets,
            timestamps: target_times,
            feature_columns: columns,
        })
    }

    /// The most recent `sequence_length` rows, unscaled, in `columns` order
    pub fn latest_window(&self, table: &PreparedTable, columns: &[String]) -> Result<Array2<f64>> {
        self.check_lengths()?;
        if table.len() < self.sequence_length {
            return Err(ForecastError::data(format!(
                "need {} rows for an input window, table has {}",
                self.sequence_length,
                table.len()
            )));
        }
        let start = table.len() - self.sequence_length;
        Ok(table.select(columns)?.slice(s![start.., ..]).to_owned())
    }

    fn check_lengths(&self) -> Result<()> {
        if self.sequence_length == 0 || self.forecast_horizon == 0 {
            return Err(ForecastError::data(format!(
                "sequence_length and forecast_horizon must be positive, got {} and {}",
                self.sequence_length, self.forecast_horizon
            )));
        }
        Ok(())
    }

    fn require_timestamps<'a>(&self, table: &'a PreparedTable) -> Result<&'a [DateTime<Utc>]> {
        table
            .timestamps()
            .ok_or_else(|| ForecastError::data("missing timestamp column"))
    }
}

/// Indices that sort `ts` ascending, keeping the first of each duplicate
fn dedup_sorted_order(ts: &[DateTime<Utc>]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..ts.len()).collect();
    // stable sort keeps original order among equal timestamps
    order.sort_by_key(|&i| ts[i]);
    order.dedup_by_key(|i| ts[*i]);
    order
}

fn time_features(ts: &[DateTime<Utc>]) -> Vec<(&'static str, Vec<f64>)> {
    let hours: Vec<f64> = ts.iter().map(|t| t.hour() as f64).collect();
    let days: Vec<f64> = ts.iter().map(|t| t.ordinal() as f64).collect();

    let angle = |values: &[f64], period: f64, f: fn(f64) -> f64| -> Vec<f64> {
        values.iter().map(|v| f(2.0 * PI * v / period)).collect()
    };

    vec![
        (CYCLICAL_COLUMNS[0], angle(&hours, 24.0, f64::sin)),
        (CYCLICAL_COLUMNS[1], angle(&hours, 24.0, f64::cos)),
        (CYCLICAL_COLUMNS[2], angle(&days, 365.0, f64::sin)),
        (CYCLICAL_COLUMNS[3], angle(&days, 365.0, f64::cos)),
        (HOUR_COLUMN, hours),
        (DAY_OF_YEAR_COLUMN, days),
    ]
}

fn upsert(columns: &mut Vec<Column>, column: Column) {
    match columns.iter_mut().find(|c| c.name == column.name) {
        Some(existing) => *existing = column,
        None => columns.push(column),
    }
}

/// Forward fill, then backward fill the leading gap; `None` if all missing
fn fill_forward_backward(values: &[Option<f64>]) -> Option<Vec<f64>> {
    let first = values.iter().flatten().next().copied()?;
    let mut last = first;
    Some(
        values
            .iter()
            .map(|v| {
                if let Some(v) = v {
                    last = *v;
                }
                last
            })
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn timestamps(n: usize) -> Vec<DateTime<Utc>> {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        (0..n).map(|i| start + Duration::hours(3 * i as i64)).collect()
    }

    fn table(n: usize) -> ObservationTable {
        let temp: Vec<f64> = (0..n).map(|i| 10.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let hum: Vec<f64> = (0..n).map(|i| 60.0 + i as f64).collect();
        ObservationTable::new(
            Some(timestamps(n)),
            vec![Column::dense("humidity", hum), Column::dense("temperature", temp)],
        )
        .unwrap()
    }

    #[test]
    fn test_window_count() {
        let fe = FeatureEngineer::new(8, 8);
        assert_eq!(fe.window_count(20), 5);
        assert_eq!(fe.window_count(16), 1);
        assert_eq!(fe.window_count(15), 0);
        assert_eq!(fe.window_count(0), 0);
    }

    #[test]
    fn test_zero_lengths_are_rejected() {
        let mut fitted = FeatureEngineer::new(2, 1);
        let prepared = fitted.prepare(table(10)).unwrap();
        let split = fitted.split(&prepared, 0.8).unwrap();
        fitted.fit(&split.train).unwrap();
        let scaler = fitted.into_scaler().unwrap();

        for (l, h) in [(0, 0), (0, 2), (2, 0)] {
            let fe = FeatureEngineer::new(l, h).with_scaler(scaler.clone()).unwrap();
            assert!(matches!(fe.split(&prepared, 0.8), Err(ForecastError::Data(_))));
            assert!(matches!(fe.transform(&prepared), Err(ForecastError::Data(_))));
            let columns = scaler.feature_names().to_vec();
            assert!(fe.latest_window(&prepared, &columns).is_err());
        }
    }

    #[test]
    fn test_prepare_sorts_and_dedups() {
        let ts = timestamps(3);
        let raw = ObservationTable::new(
            Some(vec![ts[2], ts[0], ts[2], ts[1]]),
            vec![Column::dense("temperature", vec![3.0, 1.0, 99.0, 2.0])],
        )
        .unwrap();

        let prepared = FeatureEngineer::new(1, 1).prepare(raw).unwrap();
        assert_eq!(prepared.timestamps().unwrap(), &ts[..]);
        let temp = prepared.column("temperature").unwrap();
        assert_eq!(temp.to_vec(), vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_prepare_cyclical_features() {
        let ts = vec![Utc.with_ymd_and_hms(2024, 1, 1, 6, 0, 0).unwrap()];
        let raw =
            ObservationTable::new(Some(ts), vec![Column::dense("temperature", vec![1.0])]).unwrap();
        let prepared = FeatureEngineer::new(1, 1).prepare(raw).unwrap();

        let hour_sin = prepared.column("hour_sin").unwrap()[0];
        let hour_cos = prepared.column("hour_cos").unwrap()[0];
        let day_sin = prepared.column("day_sin").unwrap()[0];
        assert!((hour_sin - 1.0).abs() < 1e-12);
        assert!(hour_cos.abs() < 1e-12);
        assert!((day_sin - (2.0 * PI / 365.0).sin()).abs() < 1e-12);
        assert_eq!(prepared.column(HOUR_COLUMN).unwrap()[0], 6.0);
        assert_eq!(prepared.column(DAY_OF_YEAR_COLUMN).unwrap()[0], 1.0);
    }

    #[test]
    fn test_prepare_fills_missing_values() {
        let raw = ObservationTable::new(
            Some(timestamps(5)),
            vec![Column::new(
                "temperature",
                vec![None, Some(2.0), None, Some(4.0), None],
            )],
        )
        .unwrap();
        let prepared = FeatureEngineer::new(1, 1).prepare(raw).unwrap();
        assert_eq!(
            prepared.column("temperature").unwrap().to_vec(),
            vec![2.0, 2.0, 2.0, 4.0, 4.0]
        );
    }

    #[test]
    fn test_prepare_rejects_empty_column() {
        let raw = ObservationTable::new(
            Some(timestamps(2)),
            vec![Column::new("temperature", vec![None, None])],
        )
        .unwrap();
        assert!(FeatureEngineer::new(1, 1).prepare(raw).is_err());
    }

    #[test]
    fn test_feature_columns_put_target_first() {
        let fe = FeatureEngineer::new(8, 8);
        let prepared = fe.prepare(table(20)).unwrap();
        let columns = fe.feature_columns(&prepared).unwrap();

        assert_eq!(columns[0], "temperature");
        assert_eq!(columns[1], "humidity");
        assert!(!columns.iter().any(|c| c == HOUR_COLUMN || c == DAY_OF_YEAR_COLUMN));
        for name in CYCLICAL_COLUMNS {
            assert!(columns.iter().any(|c| c == name));
        }
    }

    #[test]
    fn test_missing_target_is_data_error() {
        let fe = FeatureEngineer::new(2, 1).with_target("dewpoint");
        let prepared = fe.prepare(table(10)).unwrap();
        assert!(matches!(
            fe.feature_columns(&prepared),
            Err(ForecastError::Data(_))
        ));
    }

    #[test]
    fn test_twenty_rows_give_five_windows() {
        let mut fe = FeatureEngineer::new(8, 8);
        let prepared = fe.prepare(table(20)).unwrap();
        let split = fe.split(&prepared, 0.8).unwrap();
        assert_eq!(split.total_windows, 5);
        assert_eq!(split.train_windows, 4);
        assert_eq!(split.val_windows(), 1);
        assert_eq!(split.train.len(), 4 + 8 + 8 - 1);

        fe.fit(&split.train).unwrap();
        let windows = fe.transform(&prepared).unwrap();
        assert_eq!(windows.len(), 5);
        assert_eq!(windows.inputs.dim(), (5, 8, windows.feature_columns.len()));
    }

    #[test]
    fn test_target_alignment() {
        let mut fe = FeatureEngineer::new(3, 2);
        let prepared = fe.prepare(table(12)).unwrap();
        let split = fe.split(&prepared, 0.5).unwrap();
        fe.fit(&split.train).unwrap();
        let windows = fe.transform(&prepared).unwrap();

        let scaler = fe.scaler().unwrap();
        let temp = prepared.column("temperature").unwrap();
        let all_ts = prepared.timestamps().unwrap();
        for i in 0..windows.len() {
            let t = i + 3 + 2 - 1;
            assert_eq!(windows.timestamps[i], all_ts[t]);
            let restored = scaler.inverse_transform_target(windows.targets[i]).unwrap();
            assert!((restored - temp[t]).abs() < 1e-9);
        }
    }

    #[test]
    fn test_too_few_rows() {
        let mut fe = FeatureEngineer::new(8, 8);
        let prepared = fe.prepare(table(15)).unwrap();
        assert!(matches!(
            fe.split(&prepared, 0.8),
            Err(ForecastError::Data(_))
        ));

        // a scaler fitted elsewhere yields an empty set, not an error
        let bigger = fe.prepare(table(20)).unwrap();
        let split = fe.split(&bigger, 0.8).unwrap();
        fe.fit(&split.train).unwrap();
        assert!(fe.transform(&prepared).unwrap().is_empty());
    }

    #[test]
    fn test_windowing_without_timestamps_fails() {
        let raw = ObservationTable::new(
            None,
            vec![Column::dense("temperature", (0..20).map(|i| i as f64).collect())],
        )
        .unwrap();
        let fe = FeatureEngineer::new(8, 8);
        let prepared = fe.prepare(raw).unwrap();
        let err = fe.split(&prepared, 0.8).unwrap_err();
        assert!(err.to_string().contains("timestamp"));
    }

    #[test]
    fn test_scaler_fits_only_training_rows() {
        let mut fe = FeatureEngineer::new(2, 1);
        let prepared = fe.prepare(table(12)).unwrap();
        let split = fe.split(&prepared, 0.5).unwrap();
        fe.fit(&split.train).unwrap();

        let rows = split.train.len();
        let hum = prepared.column("humidity").unwrap();
        let expected = hum.slice(s![..rows]).mean().unwrap();
        let scaler = fe.scaler().unwrap();
        let idx = scaler
            .feature_names()
            .iter()
            .position(|n| n == "humidity")
            .unwrap();
        assert!((scaler.means()[idx] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_split_at() {
        let mut fe = FeatureEngineer::new(2, 1);
        let prepared = fe.prepare(table(12)).unwrap();
        let split = fe.split(&prepared, 0.5).unwrap();
        let windows = {
            fe.fit(&split.train).unwrap();
            fe.transform(&prepared).unwrap()
        };
        let (train, val) = windows.split_at(split.train_windows);
        assert_eq!(train.len() + val.len(), windows.len());
        assert_eq!(val.timestamps[0], windows.timestamps[split.train_windows]);
    }
}
