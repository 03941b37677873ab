//! Patience-based early stopping on validation loss

/// Outcome of observing one epoch's validation loss
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// Strictly better than every previous epoch
    Improved,
    /// No improvement, patience not yet exhausted
    Continue,
    /// No improvement for `patience` consecutive epochs
    Stop,
}

/// Tracks the best validation loss and the epochs since it was reached
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    counter: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            counter: 0,
        }
    }

    /// Record a validation loss
    ///
    /// Equal losses do not count as improvement. NaN never improves.
    pub fn observe(&mut self, val_loss: f64) -> Verdict {
        if val_loss < self.best {
            self.best = val_loss;
            self.counter = 0;
            return Verdict::Improved;
        }

        self.counter += 1;
        if self.counter >= self.patience {
            Verdict::Stop
        } else {
            Verdict::Continue
        }
    }

    pub fn best(&self) -> f64 {
        self.best
    }

    pub fn counter(&self) -> usize {
        self.counter
    }

    pub fn patience(&self) -> usize {
        self.patience
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_finite_loss_improves() {
        let mut stopper = EarlyStopping::new(3);
        assert_eq!(stopper.best(), f64::INFINITY);
        assert_eq!(stopper.observe(1.0), Verdict::Improved);
        assert_eq!(stopper.best(), 1.0);
    }

    #[test]
    fn test_equal_loss_is_not_improvement() {
        let mut stopper = EarlyStopping::new(3);
        stopper.observe(1.0);
        assert_eq!(stopper.observe(1.0), Verdict::Continue);
        assert_eq!(stopper.counter(), 1);
    }

    #[test]
    fn test_stops_exactly_at_patience() {
        let mut stopper = EarlyStopping::new(2);
        stopper.observe(0.5);
        assert_eq!(stopper.observe(0.6), Verdict::Continue);
        assert_eq!(stopper.observe(0.7), Verdict::Stop);
    }

    #[test]
    fn test_improvement_resets_counter() {
        let mut stopper = EarlyStopping::new(2);
        stopper.observe(1.0);
        stopper.observe(1.5);
        assert_eq!(stopper.observe(0.9), Verdict::Improved);
        assert_eq!(stopper.counter(), 0);
        assert_eq!(stopper.observe(1.0), Verdict::Continue);
    }

    #[test]
    fn test_best_is_non_increasing() {
        let mut stopper = EarlyStopping::new(100);
        let mut previous = stopper.best();
        for loss in [3.0, 2.0, 2.5, 1.0, f64::NAN, 1.2, 0.4] {
            stopper.observe(loss);
            assert!(stopper.best() <= previous);
            previous = stopper.best();
        }
        assert_eq!(stopper.best(), 0.4);
    }
}
