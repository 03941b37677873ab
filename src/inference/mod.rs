//! Inference
//!
//! This module provides:
//! - Ordered compute backend probing
//! - The predictor that reverses standardization and converts units

mod device;
mod predictor;

pub use device::{to_host_f64, ComputeBackend};
pub use predictor::{PredictionResult, Predictor, HOURS_PER_STEP, PLACEHOLDER_CONFIDENCE};
