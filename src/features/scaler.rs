//! Per-feature standardization with an explicit, versioned file format

use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::error::{ForecastError, Result};

/// Version written into every scaler file
pub const SCALER_SCHEMA_VERSION: u32 = 1;

/// Standard deviations below this are treated as zero variance
const MIN_STD: f64 = 10.0 * f64::EPSILON;

/// Fitted standardization parameters
///
/// Position 0 of `feature_names` is always the named `target`; that is the
/// slot read when a single predicted value is inverted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardScaler {
    schema_version: u32,
    target: String,
    feature_names: Vec<String>,
    means: Vec<f64>,
    stds: Vec<f64>,
}

impl StandardScaler {
    /// Estimate means and population standard deviations column-wise
    pub fn fit(data: &Array2<f64>, feature_names: Vec<String>, target: &str) -> Result<Self> {
        if data.nrows() == 0 {
            return Err(ForecastError::data("cannot fit scaler on an empty matrix"));
        }
        if data.ncols() != feature_names.len() {
            return Err(ForecastError::data(format!(
                "matrix has {} columns but {} feature names were given",
                data.ncols(),
                feature_names.len()
            )));
        }
        if feature_names.first().map(String::as_str) != Some(target) {
            return Err(ForecastError::data(format!(
                "target '{}' must be the first feature, got {:?}",
                target,
                feature_names.first()
            )));
        }

        let means = data
            .mean_axis(Axis(0))
            .ok_or_else(|| ForecastError::data("cannot fit scaler on an empty matrix"))?;
        let stds = data.std_axis(Axis(0), 0.0);

        if means.iter().chain(stds.iter()).any(|v| !v.is_finite()) {
            return Err(ForecastError::data(
                "scaler statistics are not finite; input contains NaN or infinite values",
            ));
        }

        Ok(Self {
            schema_version: SCALER_SCHEMA_VERSION,
            target: target.to_string(),
            feature_names,
            means: means.to_vec(),
            stds: stds.to_vec(),
        })
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn target(&self) -> &str {
        &self.target
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn means(&self) -> &[f64] {
        &self.means
    }

    pub fn stds(&self) -> &[f64] {
        &self.stds
    }

    /// Divisors actually applied; zero-variance columns use 1
    fn scales(&self) -> Array1<f64> {
        self.stds
            .iter()
            .map(|&s| if s.abs() < MIN_STD { 1.0 } else { s })
            .collect()
    }

    /// Fail unless `names` matches the fitted feature order exactly
    pub fn check_columns(&self, names: &[String]) -> Result<()> {
        if names.len() != self.n_features() {
            return Err(ForecastError::data(format!(
                "scaler was fitted on {} features, got {}",
                self.n_features(),
                names.len()
            )));
        }
        if let Some((i, (expected, got))) = self
            .feature_names
            .iter()
            .zip(names)
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(ForecastError::data(format!(
                "feature order mismatch at position {}: scaler has '{}', input has '{}'",
                i, expected, got
            )));
        }
        Ok(())
    }

    fn check_width(&self, data: &Array2<f64>) -> Result<()> {
        if data.ncols() != self.n_features() {
            return Err(ForecastError::data(format!(
                "scaler was fitted on {} features, input has {} columns",
                self.n_features(),
                data.ncols()
            )));
        }
        Ok(())
    }

    /// Standardize every column: `(x - mean) / std`
    pub fn transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(data)?;
        let means = Array1::from(self.means.clone());
        Ok((data - &means) / &self.scales())
    }

    /// Undo [`transform`](Self::transform): `x * std + mean`
    pub fn inverse_transform(&self, data: &Array2<f64>) -> Result<Array2<f64>> {
        self.check_width(data)?;
        let means = Array1::from(self.means.clone());
        Ok(data * &self.scales() + &means)
    }

    /// Recover the target value from a single standardized scalar
    ///
    /// The scalar is placed at index 0 of an otherwise zero row and the full
    /// inverse transform is applied. This is only correct because each
    /// feature is scaled independently of the others.
    pub fn inverse_transform_target(&self, value: f64) -> Result<f64> {
        let mut row = Array2::zeros((1, self.n_features()));
        row[[0, 0]] = value;
        let restored = self.inverse_transform(&row)?;
        Ok(restored[[0, 0]])
    }

    /// Write the scaler as pretty JSON
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ForecastError::data(format!("cannot serialize scaler: {}", e)))?;
        std::fs::write(path, json).map_err(|e| ForecastError::io(path, e))
    }

    /// Read a scaler written by [`save`](Self::save)
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| ForecastError::io(path, e))?;
        let scaler: Self = serde_json::from_str(&json).map_err(|e| {
            ForecastError::model_load(format!("invalid scaler file {}: {}", path.display(), e))
        })?;
        scaler.validate()?;
        Ok(scaler)
    }

    fn validate(&self) -> Result<()> {
        if self.schema_version != SCALER_SCHEMA_VERSION {
            return Err(ForecastError::model_load(format!(
                "unsupported scaler schema version {} (expected {})",
                self.schema_version, SCALER_SCHEMA_VERSION
            )));
        }
        let n = self.feature_names.len();
        if n == 0 || self.means.len() != n || self.stds.len() != n {
            return Err(ForecastError::model_load(format!(
                "scaler vectors disagree: {} names, {} means, {} stds",
                n,
                self.means.len(),
                self.stds.len()
            )));
        }
        if self.feature_names[0] != self.target {
            return Err(ForecastError::model_load(format!(
                "scaler target '{}' is not the first feature",
                self.target
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn fitted() -> StandardScaler {
        let data = array![[10.0, 80.0, 1.0], [20.0, 60.0, 1.0], [30.0, 70.0, 1.0]];
        StandardScaler::fit(&data, names(&["temperature", "humidity", "flag"]), "temperature")
            .unwrap()
    }

    #[test]
    fn test_fit_statistics() {
        let scaler = fitted();
        assert!((scaler.means()[0] - 20.0).abs() < 1e-12);
        // population std of 10, 20, 30
        assert!((scaler.stds()[0] - (200.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert_eq!(scaler.stds()[2], 0.0);
    }

    #[test]
    fn test_transform_zero_mean_unit_variance() {
        let data = array![[10.0, 80.0, 1.0], [20.0, 60.0, 1.0], [30.0, 70.0, 1.0]];
        let scaled = fitted().transform(&data).unwrap();

        let means = scaled.mean_axis(Axis(0)).unwrap();
        let stds = scaled.std_axis(Axis(0), 0.0);
        assert!(means.iter().all(|m| m.abs() < 1e-12));
        assert!((stds[0] - 1.0).abs() < 1e-12);
        assert!((stds[1] - 1.0).abs() < 1e-12);
        // zero-variance column is centred, not divided by zero
        assert!(scaled.column(2).iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_inverse_transform_restores_input() {
        let scaler = fitted();
        let data = array![[12.5, 65.0, 1.0], [-3.0, 99.0, 1.0]];
        let restored = scaler
            .inverse_transform(&scaler.transform(&data).unwrap())
            .unwrap();
        for (a, b) in restored.iter().zip(data.iter()) {
            assert!((a - b).abs() < 1e-9);
        }
    }

    #[test]
    fn test_inverse_transform_target() {
        let scaler = fitted();
        let std = scaler.stds()[0];
        let value = scaler.inverse_transform_target(1.5).unwrap();
        assert!((value - (20.0 + 1.5 * std)).abs() < 1e-12);
    }

    #[test]
    fn test_column_count_mismatch_is_data_error() {
        let scaler = fitted();
        let narrow = array![[1.0, 2.0]];
        assert!(matches!(scaler.transform(&narrow), Err(ForecastError::Data(_))));
        assert!(matches!(
            scaler.check_columns(&names(&["temperature", "humidity"])),
            Err(ForecastError::Data(_))
        ));
    }

    #[test]
    fn test_column_order_mismatch_is_data_error() {
        let scaler = fitted();
        let result = scaler.check_columns(&names(&["temperature", "flag", "humidity"]));
        assert!(matches!(result, Err(ForecastError::Data(_))));
        assert!(scaler
            .check_columns(&names(&["temperature", "humidity", "flag"]))
            .is_ok());
    }

    #[test]
    fn test_target_must_be_first() {
        let data = array![[1.0, 2.0], [3.0, 4.0]];
        let result = StandardScaler::fit(&data, names(&["humidity", "temperature"]), "temperature");
        assert!(result.is_err());
    }

    #[test]
    fn test_save_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");

        let scaler = fitted();
        scaler.save(&path).unwrap();
        let loaded = StandardScaler::load(&path).unwrap();
        assert_eq!(loaded, scaler);

        let json = std::fs::read_to_string(&path).unwrap();
        assert!(json.contains("\"schema_version\": 1"));
        assert!(json.contains("\"feature_names\""));
    }

    #[test]
    fn test_load_rejects_unknown_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scaler.json");
        std::fs::write(
            &path,
            r#"{"schema_version":99,"target":"t","feature_names":["t"],"means":[0.0],"stds":[1.0]}"#,
        )
        .unwrap();
        assert!(matches!(
            StandardScaler::load(&path),
            Err(ForecastError::ModelLoad(_))
        ));
    }
}
