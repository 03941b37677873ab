//! Regression metrics over standardized targets

/// Mean squared error; 0 for empty input
pub fn mse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p) * (t - p)))
}

/// Root mean squared error
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mse(y_true, y_pred).sqrt()
}

/// Mean absolute error
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> f64 {
    mean(y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()))
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, n) = values.fold((0.0, 0usize), |(s, n), v| (s + v, n + 1));
    if n == 0 {
        0.0
    } else {
        sum / n as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics() {
        let y_true = [1.0, 2.0, 3.0];
        let y_pred = [1.0, 3.0, 1.0];
        assert!((mse(&y_true, &y_pred) - 5.0 / 3.0).abs() < 1e-12);
        assert!((rmse(&y_true, &y_pred) - (5.0f64 / 3.0).sqrt()).abs() < 1e-12);
        assert!((mae(&y_true, &y_pred) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(mse(&[], &[]), 0.0);
        assert_eq!(mae(&[], &[]), 0.0);
    }
}
