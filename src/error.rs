//! Error taxonomy shared by the pipeline
//!
//! Every library operation returns [`ForecastError`]. The four categories
//! map onto the stages that can fail: data preparation, file access,
//! artifact loading and runtime inference.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pipeline error
#[derive(Error, Debug)]
pub enum ForecastError {
    /// Malformed or insufficient input data, feature order mismatches
    #[error("data error: {0}")]
    Data(String),

    /// Missing or unreadable input/output paths
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Absent, corrupt or incompatible checkpoint/scaler artifacts
    #[error("model load error: {0}")]
    ModelLoad(String),

    /// Shape mismatches and backend failures at inference time
    #[error("prediction error: {0}")]
    Prediction(String),
}

impl ForecastError {
    pub fn data(msg: impl Into<String>) -> Self {
        ForecastError::Data(msg.into())
    }

    pub fn model_load(msg: impl Into<String>) -> Self {
        ForecastError::ModelLoad(msg.into())
    }

    pub fn prediction(msg: impl Into<String>) -> Self {
        ForecastError::Prediction(msg.into())
    }

    /// Wrap an `std::io::Error` together with the path it concerns
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ForecastError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// A write that failed inside a tensor or array encoder
    pub fn write_failed(path: impl AsRef<Path>, err: impl std::fmt::Display) -> Self {
        Self::io(path, std::io::Error::other(err.to_string()))
    }

    /// Not enough cleaned rows to form a single window
    pub fn insufficient_rows(rows: usize, sequence_length: usize, forecast_horizon: usize) -> Self {
        ForecastError::Data(format!(
            "not enough data to create sequences: {} rows, need at least {} (sequence_length {} + forecast_horizon {})",
            rows,
            sequence_length + forecast_horizon,
            sequence_length,
            forecast_horizon
        ))
    }
}

impl From<tch::TchError> for ForecastError {
    fn from(err: tch::TchError) -> Self {
        ForecastError::Prediction(err.to_string())
    }
}

/// Result alias used across the crate
pub type Result<T> = std::result::Result<T, ForecastError>;
