//! Feature engineering for the forecasting pipeline
//!
//! - [`FeatureEngineer`] cleans tables, derives time encodings and windows
//! - [`StandardScaler`] holds the fitted standardization
//! - [`SequenceArtifacts`] is the train/validation bundle saved between stages

mod engineer;
mod scaler;
mod sequences;

pub use engineer::{
    ChronologicalSplit, FeatureEngineer, PreparedTable, SequenceSet, TrainingPartition,
    CYCLICAL_COLUMNS, DAY_OF_YEAR_COLUMN, DEFAULT_TARGET, HOUR_COLUMN,
};
pub use scaler::{StandardScaler, SCALER_SCHEMA_VERSION};
pub use sequences::{SequenceArtifacts, SequenceMetadata, SCALER_FILE};
