//! Adam with exportable state
//!
//! `tch::nn::Optimizer` does not expose its moment buffers, so checkpoints
//! could not resume training. This implementation keeps the first and second
//! moments as named tensors that are saved next to the weights.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use tch::{nn, Tensor};

use crate::error::{ForecastError, Result};

/// Adam hyperparameters and step count, as stored in checkpoint metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdamState {
    pub learning_rate: f64,
    pub beta1: f64,
    pub beta2: f64,
    pub epsilon: f64,
    pub step: u64,
}

impl AdamState {
    pub fn new(learning_rate: f64) -> Self {
        Self {
            learning_rate,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-8,
            step: 0,
        }
    }
}

struct Slot {
    name: String,
    param: Tensor,
    m: Tensor,
    v: Tensor,
}

/// Adam (Adaptive Moment Estimation) over every variable of a `VarStore`
pub struct Adam {
    state: AdamState,
    slots: Vec<Slot>,
}

impl Adam {
    pub fn new(vs: &nn::VarStore, learning_rate: f64) -> Self {
        let mut variables: Vec<(String, Tensor)> = vs.variables().into_iter().collect();
        variables.sort_by(|a, b| a.0.cmp(&b.0));

        let slots = variables
            .into_iter()
            .map(|(name, param)| Slot {
                m: param.zeros_like(),
                v: param.zeros_like(),
                name,
                param,
            })
            .collect();

        Self {
            state: AdamState::new(learning_rate),
            slots,
        }
    }

    pub fn state(&self) -> &AdamState {
        &self.state
    }

    pub fn zero_grad(&mut self) {
        for slot in &mut self.slots {
            slot.param.zero_grad();
        }
    }

    /// Apply one update from the gradients currently stored on the parameters
    pub fn step(&mut self) {
        self.state.step += 1;
        let AdamState {
            learning_rate,
            beta1,
            beta2,
            epsilon,
            step,
        } = self.state.clone();
        let t = step as i32;
        let bias1 = 1.0 - beta1.powi(t);
        let bias2 = 1.0 - beta2.powi(t);

        tch::no_grad(|| {
            for slot in &mut self.slots {
                let grad = slot.param.grad();
                if !grad.defined() {
                    continue;
                }

                slot.m = &slot.m * beta1 + &grad * (1.0 - beta1);
                slot.v = &slot.v * beta2 + grad.square() * (1.0 - beta2);

                let m_hat = &slot.m / bias1;
                let v_hat = &slot.v / bias2;
                let update = m_hat / (v_hat.sqrt() + epsilon) * learning_rate;
                let _ = slot.param.g_sub_(&update);
            }
        });
    }

    /// Write the moment buffers as named tensors
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let named: Vec<(String, &Tensor)> = self
            .slots
            .iter()
            .flat_map(|slot| {
                [
                    (format!("m.{}", slot.name), &slot.m),
                    (format!("v.{}", slot.name), &slot.v),
                ]
            })
            .collect();
        let path = path.as_ref();
        Tensor::save_multi(named.as_slice(), path)
            .map_err(|e| ForecastError::write_failed(path, e))
    }

    /// Restore moment buffers and step count written by [`save`](Self::save)
    pub fn load<P: AsRef<Path>>(&mut self, path: P, state: AdamState) -> Result<()> {
        let path = path.as_ref();
        let mut named: HashMap<String, Tensor> = Tensor::load_multi(path)
            .map_err(|e| {
                ForecastError::model_load(format!("cannot read {}: {}", path.display(), e))
            })?
            .into_iter()
            .collect();

        for slot in &mut self.slots {
            let device = slot.param.device();
            for (prefix, buffer) in [("m", &mut slot.m), ("v", &mut slot.v)] {
                let key = format!("{}.{}", prefix, slot.name);
                let tensor = named.remove(&key).ok_or_else(|| {
                    ForecastError::model_load(format!("optimizer state is missing '{}'", key))
                })?;
                if tensor.size() != slot.param.size() {
                    return Err(ForecastError::model_load(format!(
                        "optimizer state '{}' has shape {:?}, parameter has {:?}",
                        key,
                        tensor.size(),
                        slot.param.size()
                    )));
                }
                *buffer = tensor.to_device(device);
            }
        }

        self.state = state;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tch::{Device, Kind};

    fn quadratic_store() -> (nn::VarStore, Tensor) {
        let vs = nn::VarStore::new(Device::Cpu);
        let w = vs.root().f_zeros("w", &[3]).unwrap();
        (vs, w)
    }

    #[test]
    fn test_step_moves_towards_minimum() {
        let (vs, w) = quadratic_store();
        let target = Tensor::from_slice(&[1.0f32, -2.0, 0.5]);
        let mut adam = Adam::new(&vs, 0.1);

        let initial = (&w - &target).square().sum(Kind::Float).double_value(&[]);
        for _ in 0..50 {
            adam.zero_grad();
            let loss = (&w - &target).square().sum(Kind::Float);
            loss.backward();
            adam.step();
        }
        let last = (&w - &target).square().sum(Kind::Float).double_value(&[]);

        assert!(last < initial * 0.1);
        assert_eq!(adam.state().step, 50);
    }

    #[test]
    fn test_first_step_size_is_learning_rate() {
        let (vs, w) = quadratic_store();
        let mut adam = Adam::new(&vs, 0.01);
        adam.zero_grad();
        let loss = (&w - Tensor::from_slice(&[1.0f32, 1.0, 1.0])).square().sum(Kind::Float);
        loss.backward();
        adam.step();
        // bias-corrected first step is lr * sign(grad)
        assert!((w.double_value(&[0]) - 0.01).abs() < 1e-6);
    }

    #[test]
    fn test_save_and_load_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimizer.ot");

        let (vs, w) = quadratic_store();
        let mut adam = Adam::new(&vs, 0.05);
        adam.zero_grad();
        (&w - 1.0).square().sum(Kind::Float).backward();
        adam.step();
        adam.save(&path).unwrap();

        let (vs2, _) = quadratic_store();
        let mut restored = Adam::new(&vs2, 0.05);
        restored.load(&path, adam.state().clone()).unwrap();
        assert_eq!(restored.state(), adam.state());
        assert!(restored.slots[0].m.allclose(&adam.slots[0].m, 1e-9, 1e-9, false));
    }

    #[test]
    fn test_save_into_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let (vs, _) = quadratic_store();
        let adam = Adam::new(&vs, 0.1);
        let result = adam.save(dir.path().join("absent").join("optimizer.ot"));
        assert!(matches!(result, Err(ForecastError::Io { .. })));
    }

    #[test]
    fn test_load_rejects_foreign_state() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("optimizer.ot");
        Tensor::save_multi(&[("m.other", &Tensor::zeros([1], (Kind::Float, Device::Cpu)))], &path)
            .unwrap();

        let (vs, _) = quadratic_store();
        let mut adam = Adam::new(&vs, 0.1);
        let result = adam.load(&path, AdamState::new(0.1));
        assert!(matches!(result, Err(ForecastError::ModelLoad(_))));
    }
}
