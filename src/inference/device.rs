//! Compute backend selection

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tch::{Device, Kind, Tensor};
use tracing::debug;

use crate::error::{ForecastError, Result};

/// A place to run tensors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeBackend {
    /// Apple Metal
    Mps,
    /// First CUDA device
    Cuda,
    Cpu,
}

impl ComputeBackend {
    /// Preference order used when none is configured
    pub const DEFAULT_ORDER: [ComputeBackend; 3] =
        [ComputeBackend::Mps, ComputeBackend::Cuda, ComputeBackend::Cpu];

    pub fn is_available(self) -> bool {
        match self {
            ComputeBackend::Mps => tch::utils::has_mps(),
            ComputeBackend::Cuda => tch::Cuda::is_available(),
            ComputeBackend::Cpu => true,
        }
    }

    pub fn device(self) -> Device {
        match self {
            ComputeBackend::Mps => Device::Mps,
            ComputeBackend::Cuda => Device::Cuda(0),
            ComputeBackend::Cpu => Device::Cpu,
        }
    }

    /// First available backend in `order`
    pub fn probe(order: &[ComputeBackend]) -> Result<ComputeBackend> {
        for backend in order {
            if backend.is_available() {
                debug!("Selected compute backend {}", backend);
                return Ok(*backend);
            }
            debug!("Compute backend {} is not available", backend);
        }
        Err(ForecastError::prediction(format!(
            "no compute backend available among {:?}",
            order
        )))
    }
}

/// Copy a tensor from any backend into host `f64` values
///
/// The tensor moves to the CPU before the cast since MPS has no float64.
pub fn to_host_f64(tensor: &Tensor) -> Result<Vec<f64>> {
    let host = tensor.f_to_device(Device::Cpu)?.f_to_kind(Kind::Double)?;
    Ok(Vec::<f64>::try_from(&host.f_flatten(0, -1)?)?)
}

impl fmt::Display for ComputeBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComputeBackend::Mps => "mps",
            ComputeBackend::Cuda => "cuda",
            ComputeBackend::Cpu => "cpu",
        };
        f.write_str(name)
    }
}

impl FromStr for ComputeBackend {
    type Err = ForecastError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mps" => Ok(ComputeBackend::Mps),
            "cuda" | "gpu" => Ok(ComputeBackend::Cuda),
            "cpu" => Ok(ComputeBackend::Cpu),
            other => Err(ForecastError::data(format!("unknown compute backend '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cpu_is_always_available() {
        assert_eq!(
            ComputeBackend::probe(&[ComputeBackend::Cpu]).unwrap(),
            ComputeBackend::Cpu
        );
        assert!(ComputeBackend::probe(&ComputeBackend::DEFAULT_ORDER)
            .unwrap()
            .is_available());
    }

    #[test]
    fn test_empty_order_fails() {
        assert!(matches!(
            ComputeBackend::probe(&[]),
            Err(ForecastError::Prediction(_))
        ));
    }

    #[test]
    fn test_host_copy_from_every_available_backend() {
        for backend in ComputeBackend::DEFAULT_ORDER {
            if !backend.is_available() {
                continue;
            }
            let t = Tensor::from_slice(&[1.5f32, -2.0, 0.25]).to_device(backend.device());
            assert_eq!(to_host_f64(&t).unwrap(), vec![1.5, -2.0, 0.25], "{}", backend);
        }
    }

    #[test]
    fn test_host_copy_flattens() {
        let t = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 4.0]).view([2, 2]);
        assert_eq!(to_host_f64(&t).unwrap(), vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_parse_and_display() {
        for backend in ComputeBackend::DEFAULT_ORDER {
            assert_eq!(backend.to_string().parse::<ComputeBackend>().unwrap(), backend);
        }
        assert!("tpu".parse::<ComputeBackend>().is_err());
    }
}
