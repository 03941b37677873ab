//! Training infrastructure
//!
//! This module provides:
//! - Mini-batch loading of window arrays
//! - Adam with exportable state and the checkpoint directory format
//! - Early stopping and the epoch loop

mod checkpoint;
mod dataset;
mod early_stopping;
mod optimizer;
mod trainer;

pub use checkpoint::{
    Checkpoint, CheckpointMeta, CHECKPOINT_FILE, CHECKPOINT_SCHEMA_VERSION, OPTIMIZER_FILE,
    WEIGHTS_FILE,
};
pub use dataset::{DataLoader, WindowDataset};
pub use early_stopping::{EarlyStopping, Verdict};
pub use optimizer::{Adam, AdamState};
pub use trainer::{EpochMetrics, StopReason, Trainer, TrainingConfig, TrainingSummary};
