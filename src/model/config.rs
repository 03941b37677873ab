//! Architecture configuration stored with every checkpoint

use serde::{Deserialize, Serialize};

use crate::error::{ForecastError, Result};

/// Shape of the recurrent forecaster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of input features per timestep
    pub input_size: usize,
    /// Width of every LSTM layer
    pub hidden_size: usize,
    /// Number of stacked LSTM layers
    pub num_layers: usize,
    /// Dropout between LSTM layers and inside the head
    pub dropout: f64,
}

impl ModelConfig {
    /// Create a configuration with the default architecture
    pub fn new(input_size: usize) -> Self {
        Self {
            input_size,
            hidden_size: 64,
            num_layers: 2,
            dropout: 0.2,
        }
    }

    pub fn with_hidden_size(mut self, hidden_size: usize) -> Self {
        self.hidden_size = hidden_size;
        self
    }

    pub fn with_num_layers(mut self, num_layers: usize) -> Self {
        self.num_layers = num_layers;
        self
    }

    pub fn with_dropout(mut self, dropout: f64) -> Self {
        self.dropout = dropout;
        self
    }

    /// Width of the hidden layer in the feed-forward head
    pub fn head_size(&self) -> usize {
        self.hidden_size / 2
    }

    pub fn validate(&self) -> Result<()> {
        if self.input_size == 0 {
            return Err(ForecastError::data("input_size must be positive"));
        }
        if self.hidden_size < 2 {
            return Err(ForecastError::data(format!(
                "hidden_size must be at least 2, got {}",
                self.hidden_size
            )));
        }
        if self.num_layers == 0 {
            return Err(ForecastError::data("num_layers must be positive"));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(ForecastError::data(format!(
                "dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        Ok(())
    }
}
