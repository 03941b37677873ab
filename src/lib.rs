//! # Weather LSTM
//!
//! Near-term temperature forecasting at a fixed location from a short
//! history of gridded weather observations.
//!
//! ## Modules
//!
//! - `data`: Observation tables, grid point extraction and unit conversions
//! - `features`: Cleaning, cyclical time features, scaling and windowing
//! - `model`: Stacked LSTM network with a feed-forward head
//! - `training`: Training loop, early stopping and checkpoints
//! - `inference`: Backend selection and single-window prediction
//! - `service`: HTTP forecast endpoint
//! - `utils`: Configuration, logging and metrics
//!
//! ## Example
//!
//! ```no_run
//! use weather_lstm::{Checkpoint, FeatureEngineer, ObservationTable, SequenceArtifacts, Trainer};
//! use weather_lstm::{ModelConfig, TrainingConfig};
//!
//! fn main() -> anyhow::Result<()> {
//!     let table = ObservationTable::from_csv("data/processed/atlanta_timeseries.csv")?;
//!
//!     let mut engineer = FeatureEngineer::new(8, 8);
//!     let prepared = engineer.prepare(table)?;
//!     let sequences = SequenceArtifacts::build(&mut engineer, &prepared, 0.8)?;
//!
//!     let trainer = Trainer::new(TrainingConfig::default(), tch::Device::Cpu);
//!     let summary = trainer.train(
//!         &sequences,
//!         ModelConfig::new(sequences.metadata.n_features),
//!         &Checkpoint::new("models/checkpoints/best_model"),
//!     )?;
//!     println!("best validation loss {:.6}", summary.best_val_loss);
//!     Ok(())
//! }
//! ```

pub mod data;
pub mod error;
pub mod features;
pub mod inference;
pub mod model;
pub mod service;
pub mod training;
pub mod utils;

// Re-export main types for convenience
pub use data::{GridVariable, ObservationTable, PointExtractor};
pub use error::{ForecastError, Result};
pub use features::{FeatureEngineer, PreparedTable, SequenceArtifacts, StandardScaler};
pub use inference::{ComputeBackend, PredictionResult, Predictor};
pub use model::{Mode, ModelConfig, WeatherLstm};
pub use service::AppContext;
pub use training::{Checkpoint, Trainer, TrainingConfig, TrainingSummary};
pub use utils::{setup_logging, Config};
