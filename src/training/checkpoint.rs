//! Best-model checkpoint directory
//!
//! A checkpoint is three files in one directory:
//! - `weights.ot`: the model's `VarStore`
//! - `optimizer.ot`: Adam moment buffers
//! - `checkpoint.json`: epoch, losses, architecture, data metadata and
//!   optimizer hyperparameters
//!
//! Each file is written to a temporary name and renamed into place.

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tch::nn;
use tracing::debug;

use super::optimizer::{Adam, AdamState};
use crate::error::{ForecastError, Result};
use crate::features::SequenceMetadata;
use crate::model::ModelConfig;

/// Version written into every `checkpoint.json`
pub const CHECKPOINT_SCHEMA_VERSION: u32 = 1;

pub const WEIGHTS_FILE: &str = "weights.ot";
pub const OPTIMIZER_FILE: &str = "optimizer.ot";
pub const CHECKPOINT_FILE: &str = "checkpoint.json";

/// Everything in a checkpoint except the tensors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckpointMeta {
    pub schema_version: u32,
    /// 1-based epoch at which this checkpoint was saved
    pub epoch: usize,
    pub train_loss: f64,
    pub val_loss: f64,
    pub model_config: ModelConfig,
    pub metadata: SequenceMetadata,
    pub optimizer: AdamState,
}

impl CheckpointMeta {
    /// Read and validate `checkpoint.json` from a checkpoint directory
    pub fn load<P: AsRef<Path>>(dir: P) -> Result<Self> {
        let path = dir.as_ref().join(CHECKPOINT_FILE);
        let json = fs::read_to_string(&path).map_err(|e| ForecastError::io(&path, e))?;
        let meta: Self = serde_json::from_str(&json).map_err(|e| {
            ForecastError::model_load(format!("invalid checkpoint {}: {}", path.display(), e))
        })?;

        if meta.schema_version != CHECKPOINT_SCHEMA_VERSION {
            return Err(ForecastError::model_load(format!(
                "unsupported checkpoint schema version {} (expected {})",
                meta.schema_version, CHECKPOINT_SCHEMA_VERSION
            )));
        }
        if meta.model_config.input_size != meta.metadata.n_features {
            return Err(ForecastError::model_load(format!(
                "checkpoint model expects {} features, metadata lists {}",
                meta.model_config.input_size, meta.metadata.n_features
            )));
        }
        Ok(meta)
    }
}

/// Handle on a checkpoint directory
#[derive(Debug, Clone)]
pub struct Checkpoint {
    dir: PathBuf,
}

impl Checkpoint {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn weights_path(&self) -> PathBuf {
        self.dir.join(WEIGHTS_FILE)
    }

    pub fn optimizer_path(&self) -> PathBuf {
        self.dir.join(OPTIMIZER_FILE)
    }

    /// True when all three files are present
    pub fn exists(&self) -> bool {
        self.dir.join(CHECKPOINT_FILE).is_file()
            && self.weights_path().is_file()
            && self.optimizer_path().is_file()
    }

    /// Persist weights, optimizer state and metadata
    pub fn save(&self, vs: &nn::VarStore, optimizer: &Adam, meta: &CheckpointMeta) -> Result<()> {
        fs::create_dir_all(&self.dir).map_err(|e| ForecastError::io(&self.dir, e))?;

        self.write_atomic(WEIGHTS_FILE, |tmp| {
            vs.save(tmp).map_err(|e| ForecastError::write_failed(tmp, e))
        })?;
        self.write_atomic(OPTIMIZER_FILE, |tmp| optimizer.save(tmp))?;

        let json = serde_json::to_string_pretty(meta)
            .map_err(|e| ForecastError::data(format!("cannot serialize checkpoint: {}", e)))?;
        self.write_atomic(CHECKPOINT_FILE, |tmp| {
            fs::write(tmp, &json).map_err(|e| ForecastError::io(tmp, e))
        })?;

        debug!("Wrote checkpoint for epoch {} to {}", meta.epoch, self.dir.display());
        Ok(())
    }

    /// Load weights into an already constructed model's `VarStore`
    pub fn load_weights(&self, vs: &mut nn::VarStore) -> Result<()> {
        let path = self.weights_path();
        if !path.is_file() {
            return Err(ForecastError::model_load(format!(
                "checkpoint weights not found at {}",
                path.display()
            )));
        }
        vs.load(&path).map_err(|e| {
            ForecastError::model_load(format!("cannot load weights from {}: {}", path.display(), e))
        })
    }

    pub fn load_meta(&self) -> Result<CheckpointMeta> {
        CheckpointMeta::load(&self.dir)
    }

    fn write_atomic<F>(&self, name: &str, write: F) -> Result<()>
    where
        F: FnOnce(&Path) -> Result<()>,
    {
        let target = self.dir.join(name);
        let tmp = self.dir.join(format!("{}.tmp", name));
        write(&tmp)?;
        fs::rename(&tmp, &target).map_err(|e| ForecastError::io(&target, e))
    }
}
