//! Single-window temperature prediction from a saved checkpoint

use chrono::{DateTime, Duration, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tch::{nn, Tensor};
use tracing::info;

use super::device::{to_host_f64, ComputeBackend};
use crate::data::units::celsius_to_fahrenheit;
use crate::error::{ForecastError, Result};
use crate::features::{FeatureEngineer, PreparedTable, SequenceMetadata, StandardScaler};
use crate::model::{Mode, ModelConfig, WeatherLstm};
use crate::training::{Checkpoint, CheckpointMeta};

/// Hours between consecutive rows of the gridded input
pub const HOURS_PER_STEP: u32 = 3;

/// Reported with every prediction until a calibrated estimate exists
///
/// This is a fixed number, not derived from the model or the data.
/// TODO: replace with an interval from validation residuals.
pub const PLACEHOLDER_CONFIDENCE: f64 = 0.85;

/// A single forecast
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub temperature_celsius: f64,
    pub temperature_fahrenheit: f64,
    /// Lead time of the forecast
    pub forecast_hours: u32,
    /// See [`PLACEHOLDER_CONFIDENCE`]
    pub confidence: f64,
    /// Valid time of the forecast, when the input window carried timestamps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_timestamp: Option<DateTime<Utc>>,
}

/// Loaded model plus the scaler it was trained with
///
/// Immutable after loading; share it behind an `Arc`.
#[derive(Debug)]
pub struct Predictor {
    model: WeatherLstm,
    // keeps the parameters alive for `model`
    _vs: nn::VarStore,
    scaler: StandardScaler,
    metadata: SequenceMetadata,
    backend: ComputeBackend,
}

impl Predictor {
    /// Load a checkpoint directory and a scaler file
    ///
    /// The backend is the first available entry of `backends`.
    pub fn load<P, Q>(checkpoint_dir: P, scaler_path: Q, backends: &[ComputeBackend]) -> Result<Self>
    where
        P: AsRef<Path>,
        Q: AsRef<Path>,
    {
        let checkpoint = Checkpoint::new(checkpoint_dir.as_ref());
        let meta = checkpoint.load_meta().map_err(artifact_error)?;
        let scaler = StandardScaler::load(scaler_path).map_err(artifact_error)?;
        check_compatibility(&meta, &scaler)?;

        let backend = ComputeBackend::probe(backends)?;
        let mut vs = nn::VarStore::new(backend.device());
        let model = WeatherLstm::new(&vs.root(), meta.model_config.clone())
            .map_err(|e| ForecastError::model_load(e.to_string()))?;
        checkpoint.load_weights(&mut vs)?;
        vs.freeze();

        info!(
            "Loaded model from {} (epoch {}, val_loss {:.6}) on {}",
            checkpoint.dir().display(),
            meta.epoch,
            meta.val_loss,
            backend
        );

        Ok(Self {
            model,
            _vs: vs,
            scaler,
            metadata: meta.metadata,
            backend,
        })
    }

    pub fn backend(&self) -> ComputeBackend {
        self.backend
    }

    pub fn model_config(&self) -> &ModelConfig {
        self.model.config()
    }

    pub fn metadata(&self) -> &SequenceMetadata {
        &self.metadata
    }

    pub fn feature_columns(&self) -> &[String] {
        self.scaler.feature_names()
    }

    pub fn sequence_length(&self) -> usize {
        self.metadata.sequence_length
    }

    pub fn forecast_horizon(&self) -> usize {
        self.metadata.forecast_horizon
    }

    /// Lead time in hours of every prediction this model makes
    pub fn forecast_hours(&self) -> u32 {
        self.metadata.forecast_horizon as u32 * HOURS_PER_STEP
    }

    /// Feature engineer configured like the one used for training
    pub fn engineer(&self) -> Result<FeatureEngineer> {
        FeatureEngineer::new(self.metadata.sequence_length, self.metadata.forecast_horizon)
            .with_target(self.metadata.target_column.clone())
            .with_scaler(self.scaler.clone())
    }

    /// Predict from one unscaled window of shape (sequence_length, features)
    ///
    /// Columns must be in [`feature_columns`](Self::feature_columns) order.
    pub fn predict(&self, window: &Array2<f64>) -> Result<PredictionResult> {
        let expected = (self.metadata.sequence_length, self.scaler.n_features());
        if window.dim() != expected {
            return Err(ForecastError::prediction(format!(
                "input window has shape {:?}, expected {:?}",
                window.dim(),
                expected
            )));
        }

        let scaled = self.scaler.transform(window)?;
        let values: Vec<f32> = scaled.iter().map(|&v| v as f32).collect();
        let x = Tensor::from_slice(&values)
            .f_view([1, expected.0 as i64, expected.1 as i64])?
            .f_to_device(self.backend.device())?;

        let output = tch::no_grad(|| self.model.forward(&x, Mode::Inference));
        let standardized = to_host_f64(&output)?
            .first()
            .copied()
            .ok_or_else(|| ForecastError::prediction("model returned an empty output"))?;

        let celsius = self.scaler.inverse_transform_target(standardized)?;
        Ok(PredictionResult {
            temperature_celsius: celsius,
            temperature_fahrenheit: celsius_to_fahrenheit(celsius),
            forecast_hours: self.forecast_hours(),
            confidence: PLACEHOLDER_CONFIDENCE,
            target_timestamp: None,
        })
    }

    /// Predict from the most recent rows of a prepared table
    pub fn predict_from_table(&self, table: &PreparedTable) -> Result<PredictionResult> {
        let window = self
            .engineer()?
            .latest_window(table, self.scaler.feature_names())?;
        let mut result = self.predict(&window)?;

        result.target_timestamp = table
            .timestamps()
            .and_then(|ts| ts.last())
            .map(|last| *last + Duration::hours(i64::from(result.forecast_hours)));
        Ok(result)
    }
}

/// An artifact that cannot be read is a load failure, not a plain I/O error
fn artifact_error(err: ForecastError) -> ForecastError {
    match err {
        ForecastError::Io { path, source } => ForecastError::model_load(format!(
            "cannot read {}: {}",
            path.display(),
            source
        )),
        other => other,
    }
}

fn check_compatibility(meta: &CheckpointMeta, scaler: &StandardScaler) -> Result<()> {
    if scaler.feature_names() != meta.metadata.feature_columns.as_slice() {
        return Err(ForecastError::model_load(format!(
            "scaler features {:?} do not match checkpoint features {:?}",
            scaler.feature_names(),
            meta.metadata.feature_columns
        )));
    }
    if scaler.target() != meta.metadata.target_column {
        return Err(ForecastError::model_load(format!(
            "scaler target '{}' does not match checkpoint target '{}'",
            scaler.target(),
            meta.metadata.target_column
        )));
    }
    Ok(())
}
