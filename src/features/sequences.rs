//! Train/validation window sets and their on-disk layout

use ndarray::{Array1, Array3};
use ndarray_npy::{read_npy, write_npy, ReadNpyError};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use super::engineer::{FeatureEngineer, PreparedTable, SequenceSet};
use super::scaler::StandardScaler;
use crate::error::{ForecastError, Result};

const X_TRAIN: &str = "X_train.npy";
const Y_TRAIN: &str = "y_train.npy";
const X_VAL: &str = "X_val.npy";
const Y_VAL: &str = "y_val.npy";
const METADATA: &str = "metadata.json";
/// File name of the scaler inside a sequence directory
pub const SCALER_FILE: &str = "scaler.json";

/// Describes a saved set of windows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SequenceMetadata {
    pub sequence_length: usize,
    pub forecast_horizon: usize,
    pub n_features: usize,
    pub feature_columns: Vec<String>,
    pub target_column: String,
    pub train_samples: usize,
    pub val_samples: usize,
}

/// Everything the trainer needs: windows, scaler and metadata
#[derive(Debug, Clone)]
pub struct SequenceArtifacts {
    pub x_train: Array3<f64>,
    pub y_train: Array1<f64>,
    pub x_val: Array3<f64>,
    pub y_val: Array1<f64>,
    pub metadata: SequenceMetadata,
    pub scaler: StandardScaler,
}

impl SequenceArtifacts {
    /// Split, fit on the training partition, then window the full table
    ///
    /// Fails when the table is too short for a single window or when the
    /// split leaves either side empty.
    pub fn build(
        engineer: &mut FeatureEngineer,
        table: &PreparedTable,
        train_fraction: f64,
    ) -> Result<Self> {
        let split = engineer.split(table, train_fraction)?;
        if split.val_windows() == 0 {
            return Err(ForecastError::data(format!(
                "{} windows leave no validation windows at train fraction {}",
                split.total_windows, train_fraction
            )));
        }

        engineer.fit(&split.train)?;
        let windows = engineer.transform(table)?;
        let (train, val) = windows.split_at(split.train_windows);

        let scaler = engineer
            .scaler()
            .cloned()
            .ok_or_else(|| ForecastError::data("scaler is not fitted"))?;

        info!(
            "Built {} training and {} validation windows from {} rows",
            train.len(),
            val.len(),
            table.len()
        );

        Ok(Self::from_sets(engineer, train, val, scaler))
    }

    fn from_sets(
        engineer: &FeatureEngineer,
        train: SequenceSet,
        val: SequenceSet,
        scaler: StandardScaler,
    ) -> Self {
        let metadata = SequenceMetadata {
            sequence_length: engineer.sequence_length,
            forecast_horizon: engineer.forecast_horizon,
            n_features: train.n_features(),
            feature_columns: train.feature_columns.clone(),
            target_column: engineer.target_column.clone(),
            train_samples: train.len(),
            val_samples: val.len(),
        };
        Self {
            x_train: train.inputs,
            y_train: train.targets,
            x_val: val.inputs,
            y_val: val.targets,
            metadata,
            scaler,
        }
    }

    /// Write arrays, metadata and scaler into `dir`
    pub fn save<P: AsRef<Path>>(&self, dir: P) -> Result<()> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir).map_err(|e| ForecastError::io(dir, e))?;

        save_array(&dir.join(X_TRAIN), |p| write_npy(p, &self.x_train))?;
        save_array(&dir.join(Y_TRAIN), |p| write_npy(p, &self.y_train))?;
        save_array(&dir.join(X_VAL), |p| write_npy(p, &self.x_val))?;
        save_array(&dir.join(Y_VAL), |p| write_npy(p, &self.y_val))?;

        let path = dir.join(METADATA);
        let json = serde_json::to_string_pretty(&self.metadata)
            .map_err(|e| ForecastError::data(format!("cannot serialize metadata: {}", e)))?;
        fs::write(&path, json).map_err(|e| ForecastError::io(&path, e))?;

        self.scaler.save(dir.join(SCALER_FILE))?;
        info!("Saved sequences to {}", dir.display());
        Ok(())
    }

    /// Load a directory written by [`save`](Self::save)
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let dir = dir.as_ref();
        let metadata = SequenceMetadata::load(dir.join(METADATA))?;
        let scaler = StandardScaler::load(dir.join(SCALER_FILE))?;
        scaler.check_columns(&metadata.feature_columns)?;

        let x_train: Array3<f64> = load_array(&dir.join(X_TRAIN))?;
        let y_train: Array1<f64> = load_array(&dir.join(Y_TRAIN))?;
        let x_val: Array3<f64> = load_array(&dir.join(X_VAL))?;
        let y_val: Array1<f64> = load_array(&dir.join(Y_VAL))?;

        let artifacts = Self {
            x_train,
            y_train,
            x_val,
            y_val,
            metadata,
            scaler,
        };
        artifacts.check_shapes()?;
        Ok(artifacts)
    }

    fn check_shapes(&self) -> Result<()> {
        let m = &self.metadata;
        let expect = |name: &str, got: (usize, usize, usize), n: usize| {
            if got != (n, m.sequence_length, m.n_features) {
                return Err(ForecastError::data(format!(
                    "{} has shape {:?}, metadata expects ({}, {}, {})",
                    name, got, n, m.sequence_length, m.n_features
                )));
            }
            Ok(())
        };
        expect(X_TRAIN, self.x_train.dim(), m.train_samples)?;
        expect(X_VAL, self.x_val.dim(), m.val_samples)?;
        if self.y_train.len() != m.train_samples || self.y_val.len() != m.val_samples {
            return Err(ForecastError::data(format!(
                "target counts ({}, {}) disagree with metadata ({}, {})",
                self.y_train.len(),
                self.y_val.len(),
                m.train_samples,
                m.val_samples
            )));
        }
        Ok(())
    }
}

impl SequenceMetadata {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|e| ForecastError::io(path, e))?;
        serde_json::from_str(&json)
            .map_err(|e| ForecastError::data(format!("invalid metadata {}: {}", path.display(), e)))
    }
}

fn save_array<E: std::fmt::Display>(
    path: &Path,
    write: impl FnOnce(&Path) -> std::result::Result<(), E>,
) -> Result<()> {
    write(path).map_err(|e| ForecastError::write_failed(path, e))
}

fn load_array<T>(path: &Path) -> Result<T>
where
    T: ndarray_npy::ReadNpyExt,
{
    if !path.exists() {
        return Err(ForecastError::io(
            path,
            std::io::Error::new(std::io::ErrorKind::NotFound, "array file not found"),
        ));
    }
    read_npy(path).map_err(|e| match e {
        ReadNpyError::Io(source) => ForecastError::io(path, source),
        other => ForecastError::data(format!("cannot read {}: {}", path.display(), other)),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{Column, ObservationTable};
    use chrono::{Duration, TimeZone, Utc};

    fn prepared(rows: usize, engineer: &FeatureEngineer) -> PreparedTable {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
        let ts = (0..rows).map(|i| start + Duration::hours(3 * i as i64)).collect();
        let temp = (0..rows).map(|i| 12.0 + (i as f64 / 3.0).cos() * 4.0).collect();
        let pressure = (0..rows).map(|i| 1010.0 + (i % 5) as f64).collect();
        let table = ObservationTable::new(
            Some(ts),
            vec![
                Column::dense("temperature", temp),
                Column::dense("pressure", pressure),
            ],
        )
        .unwrap();
        engineer.prepare(table).unwrap()
    }

    #[test]
    fn test_build_counts() {
        let mut engineer = FeatureEngineer::new(8, 8);
        let table = prepared(20, &engineer);
        let artifacts = SequenceArtifacts::build(&mut engineer, &table, 0.8).unwrap();

        assert_eq!(artifacts.metadata.train_samples, 4);
        assert_eq!(artifacts.metadata.val_samples, 1);
        assert_eq!(artifacts.x_train.dim(), (4, 8, artifacts.metadata.n_features));
        assert_eq!(artifacts.metadata.feature_columns[0], "temperature");
    }

    #[test]
    fn test_build_fails_without_windows() {
        let mut engineer = FeatureEngineer::new(8, 8);
        let table = prepared(15, &engineer);
        let err = SequenceArtifacts::build(&mut engineer, &table, 0.8).unwrap_err();
        assert!(err.to_string().contains("at least 16"));
    }

    #[test]
    fn test_build_fails_without_training_windows() {
        let mut engineer = FeatureEngineer::new(8, 8);
        let table = prepared(16, &engineer);
        assert!(SequenceArtifacts::build(&mut engineer, &table, 0.99).is_err());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut engineer = FeatureEngineer::new(4, 2);
        let table = prepared(30, &engineer);
        let artifacts = SequenceArtifacts::build(&mut engineer, &table, 0.75).unwrap();
        artifacts.save(dir.path()).unwrap();

        for name in [X_TRAIN, Y_TRAIN, X_VAL, Y_VAL, METADATA, SCALER_FILE] {
            assert!(dir.path().join(name).exists(), "{} missing", name);
        }

        let loaded = SequenceArtifacts::load(dir.path()).unwrap();
        assert_eq!(loaded.metadata, artifacts.metadata);
        assert_eq!(loaded.scaler, artifacts.scaler);
        assert_eq!(loaded.x_train, artifacts.x_train);
        assert_eq!(loaded.y_val, artifacts.y_val);
    }

    #[test]
    fn test_unwritable_array_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut engineer = FeatureEngineer::new(4, 2);
        let table = prepared(30, &engineer);
        let artifacts = SequenceArtifacts::build(&mut engineer, &table, 0.75).unwrap();

        // a directory squatting on the array's file name
        fs::create_dir_all(dir.path().join(X_TRAIN)).unwrap();
        let Err(ForecastError::Io { path, .. }) = artifacts.save(dir.path()) else {
            panic!("expected an I/O error");
        };
        assert_eq!(path, dir.path().join(X_TRAIN));
    }

    #[test]
    fn test_load_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let result = SequenceArtifacts::load(dir.path().join("nope"));
        assert!(matches!(result, Err(ForecastError::Io { .. })));
    }
}
