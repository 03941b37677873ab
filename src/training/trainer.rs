//! Training loop for the weather forecaster
//!
//! Each epoch trains on shuffled mini-batches, validates on the held-out
//! windows in inference mode, and writes a checkpoint whenever the
//! validation loss strictly improves. Training stops on the epoch cap or
//! when patience runs out; the best weights are never rolled back into
//! memory, the checkpoint on disk is the result.

use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use std::fmt;
use tch::{nn, Device, Tensor};
use tracing::{debug, info, warn};

use super::checkpoint::{Checkpoint, CheckpointMeta, CHECKPOINT_SCHEMA_VERSION};
use super::dataset::{DataLoader, WindowDataset};
use super::early_stopping::{EarlyStopping, Verdict};
use super::optimizer::Adam;
use crate::error::{ForecastError, Result};
use crate::features::SequenceArtifacts;
use crate::inference::to_host_f64;
use crate::model::{Mode, ModelConfig, WeatherLstm};
use crate::utils::metrics::{mae, mse, rmse};

/// Training configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Maximum number of epochs
    pub epochs: usize,
    /// Batch size
    pub batch_size: usize,
    /// Learning rate
    pub learning_rate: f64,
    /// Epochs without improvement before stopping
    pub patience: usize,
    /// Seed for shuffling and weight initialization
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 100,
            batch_size: 2,
            learning_rate: 0.001,
            patience: 20,
            seed: None,
        }
    }
}

/// Losses and bookkeeping for one epoch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EpochMetrics {
    /// 1-based epoch number
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub val_rmse: f64,
    pub val_mae: f64,
    /// Best validation loss after this epoch
    pub best_val_loss: f64,
    /// Whether this epoch produced a new checkpoint
    pub improved: bool,
}

impl fmt::Display for EpochMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Epoch {} - Train Loss: {:.6}, Val Loss: {:.6}, Val RMSE: {:.4}, Val MAE: {:.4}",
            self.epoch, self.train_loss, self.val_loss, self.val_rmse, self.val_mae
        )
    }
}

/// Why the loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StopReason {
    /// Patience ran out at this epoch
    EarlyStopping { epoch: usize },
    /// All configured epochs ran
    EpochLimit,
}

/// Result of a training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingSummary {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch of the saved checkpoint; `None` if no epoch ever improved
    pub best_epoch: Option<usize>,
    pub best_val_loss: f64,
    pub stop_reason: StopReason,
    pub parameter_count: i64,
}

impl TrainingSummary {
    /// Number of checkpoints written during the run
    pub fn checkpoints_written(&self) -> usize {
        self.epochs.iter().filter(|m| m.improved).count()
    }
}

/// Trainer for the weather LSTM
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
}

impl Trainer {
    /// Create a new trainer
    pub fn new(config: TrainingConfig, device: Device) -> Self {
        info!("Using device: {:?}", device);
        Self { config, device }
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train a fresh model on `data`, saving the best epoch to `checkpoint`
    pub fn train(
        &self,
        data: &SequenceArtifacts,
        model_config: ModelConfig,
        checkpoint: &Checkpoint,
    ) -> Result<TrainingSummary> {
        if self.config.batch_size == 0 {
            return Err(ForecastError::data("batch_size must be positive"));
        }
        if model_config.input_size != data.metadata.n_features {
            return Err(ForecastError::data(format!(
                "model expects {} features, sequences have {}",
                model_config.input_size, data.metadata.n_features
            )));
        }

        let train_set = WindowDataset::new(data.x_train.clone(), data.y_train.clone());
        let val_set = WindowDataset::new(data.x_val.clone(), data.y_val.clone());
        if train_set.is_empty() {
            return Err(ForecastError::data("no training windows"));
        }
        if val_set.is_empty() {
            return Err(ForecastError::data("no validation windows"));
        }

        if let Some(seed) = self.config.seed {
            tch::manual_seed(seed as i64);
        }

        let vs = nn::VarStore::new(self.device);
        let model = WeatherLstm::new(&vs.root(), model_config.clone())?;
        let mut optimizer = Adam::new(&vs, self.config.learning_rate);

        let parameter_count = vs
            .trainable_variables()
            .iter()
            .map(Tensor::numel)
            .sum::<usize>() as i64;
        info!(
            "Training on {} windows, validating on {} ({} parameters)",
            train_set.len(),
            val_set.len(),
            parameter_count
        );

        let mut loader = match self.config.seed {
            Some(seed) => DataLoader::seeded(train_set.len(), self.config.batch_size, true, seed),
            None => DataLoader::new(train_set.len(), self.config.batch_size, true),
        };
        let mut stopper = EarlyStopping::new(self.config.patience);
        debug!("Early stopping patience: {} epochs", stopper.patience());
        let mut history = Vec::new();
        let mut best_epoch = None;
        let mut stop_reason = StopReason::EpochLimit;

        // Progress bar
        let pb = ProgressBar::new(self.config.epochs as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
                .map_err(|e| ForecastError::data(format!("invalid progress template: {}", e)))?
                .progress_chars("#>-"),
        );

        for epoch in 1..=self.config.epochs {
            loader.reset();
            let train_loss = self.train_epoch(&model, &mut optimizer, &train_set, &mut loader)?;
            let (val_loss, val_rmse, val_mae) = self.evaluate(&model, &val_set)?;

            let verdict = stopper.observe(val_loss);
            let improved = verdict == Verdict::Improved;

            if improved {
                let meta = CheckpointMeta {
                    schema_version: CHECKPOINT_SCHEMA_VERSION,
                    epoch,
                    train_loss,
                    val_loss,
                    model_config: model_config.clone(),
                    metadata: data.metadata.clone(),
                    optimizer: optimizer.state().clone(),
                };
                checkpoint.save(&vs, &optimizer, &meta)?;
                best_epoch = Some(epoch);
            }

            let metrics = EpochMetrics {
                epoch,
                train_loss,
                val_loss,
                val_rmse,
                val_mae,
                best_val_loss: stopper.best(),
                improved,
            };
            info!("{}", metrics);
            if improved {
                info!("  Saved best model (val_loss: {:.6})", val_loss);
            }
            history.push(metrics);

            pb.set_message(format!("val {:.4}", val_loss));
            pb.inc(1);

            if verdict == Verdict::Stop {
                warn!(
                    "Early stopping after {} epochs, {} without improvement",
                    epoch,
                    stopper.counter()
                );
                stop_reason = StopReason::EarlyStopping { epoch };
                break;
            }
        }

        pb.finish_with_message("Training complete");
        info!("Best validation loss: {:.6}", stopper.best());

        Ok(TrainingSummary {
            epochs: history,
            best_epoch,
            best_val_loss: stopper.best(),
            stop_reason,
            parameter_count,
        })
    }

    /// Train for one epoch, returning the mean batch loss
    fn train_epoch(
        &self,
        model: &WeatherLstm,
        optimizer: &mut Adam,
        data: &WindowDataset,
        loader: &mut DataLoader,
    ) -> Result<f64> {
        let mut total_loss = 0.0;
        let mut num_batches = 0;

        for batch_indices in loader.by_ref() {
            let (x, y) = data.get_batch(&batch_indices, self.device);

            let pred = model.forward(&x, Mode::Train);
            let loss = pred.mse_loss(&y, tch::Reduction::Mean);

            optimizer.zero_grad();
            loss.backward();
            optimizer.step();

            total_loss += f64::try_from(&loss)?;
            num_batches += 1;
        }

        Ok(total_loss / num_batches.max(1) as f64)
    }

    /// Evaluate on validation set: (mse, rmse, mae)
    fn evaluate(&self, model: &WeatherLstm, data: &WindowDataset) -> Result<(f64, f64, f64)> {
        let loader = DataLoader::new(data.len(), self.config.batch_size, false);
        let mut predictions = Vec::with_capacity(data.len());

        tch::no_grad(|| -> Result<()> {
            for batch_indices in loader {
                let (x, _) = data.get_batch(&batch_indices, self.device);
                let pred = model.forward(&x, Mode::Inference);
                predictions.extend(to_host_f64(&pred)?);
            }
            Ok(())
        })?;

        let targets = data.targets.to_vec();
        Ok((
            mse(&targets, &predictions),
            rmse(&targets, &predictions),
            mae(&targets, &predictions),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_training_config_default() {
        let config = TrainingConfig::default();
        assert_eq!(config.epochs, 100);
        assert_eq!(config.batch_size, 2);
        assert_eq!(config.patience, 20);
    }

    #[test]
    fn test_stop_reason_serialization() {
        let json = serde_json::to_string(&StopReason::EarlyStopping { epoch: 7 }).unwrap();
        assert_eq!(json, r#"{"kind":"early_stopping","epoch":7}"#);
    }
}
