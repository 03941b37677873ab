//! Recurrent forecasting model
//!
//! This module provides:
//! - The architecture configuration persisted with checkpoints
//! - The stacked LSTM network with its feed-forward head

mod config;
mod network;

pub use config::ModelConfig;
pub use network::{Mode, WeatherLstm};
