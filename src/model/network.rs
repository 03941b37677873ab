//! Stacked LSTM regressor
//!
//! Each layer is its own single-layer `nn::LSTM` so that dropout between
//! layers follows the explicit [`Mode`] passed to `forward` instead of a flag
//! fixed at construction time.

use tch::nn::{self, RNN};
use tch::Tensor;

use super::config::ModelConfig;
use crate::error::Result;

/// Whether stochastic layers are active
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Train,
    Inference,
}

impl Mode {
    pub fn is_train(self) -> bool {
        matches!(self, Mode::Train)
    }
}

/// LSTM stack followed by a two-layer feed-forward head
#[derive(Debug)]
pub struct WeatherLstm {
    layers: Vec<nn::LSTM>,
    fc1: nn::Linear,
    fc2: nn::Linear,
    config: ModelConfig,
}

impl WeatherLstm {
    /// Register all parameters under `vs`
    pub fn new(vs: &nn::Path, config: ModelConfig) -> Result<Self> {
        config.validate()?;

        let hidden = config.hidden_size as i64;
        let rnn_config = nn::RNNConfig {
            batch_first: true,
            ..Default::default()
        };

        let layers = (0..config.num_layers)
            .map(|i| {
                let input = if i == 0 {
                    config.input_size as i64
                } else {
                    hidden
                };
                nn::lstm(vs / format!("lstm_{}", i), input, hidden, rnn_config)
            })
            .collect();

        let head = config.head_size() as i64;
        let fc1 = nn::linear(vs / "fc1", hidden, head, Default::default());
        let fc2 = nn::linear(vs / "fc2", head, 1, Default::default());

        Ok(Self {
            layers,
            fc1,
            fc2,
            config,
        })
    }

    /// Forward pass
    ///
    /// # Arguments
    /// * `x` - Input tensor of shape (batch, sequence_length, features)
    /// * `mode` - Dropout is applied only in [`Mode::Train`]
    ///
    /// # Returns
    /// Standardized target predictions of shape (batch,)
    pub fn forward(&self, x: &Tensor, mode: Mode) -> Tensor {
        let train = mode.is_train();
        let last = self.layers.len() - 1;

        let mut out = x.shallow_clone();
        for (i, layer) in self.layers.iter().enumerate() {
            let (seq, _) = layer.seq(&out);
            out = if i < last && self.config.dropout > 0.0 {
                seq.dropout(self.config.dropout, train)
            } else {
                seq
            };
        }

        // hidden state of the top layer at the final timestep
        let summary = out.select(1, -1);

        summary
            .apply(&self.fc1)
            .relu()
            .dropout(self.config.dropout, train)
            .apply(&self.fc2)
            .squeeze_dim(-1)
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }
}
