//! Mini-batching of window arrays into tensors

use ndarray::{Array1, Array3, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use tch::{Device, Tensor};

/// Windows and targets kept as `f64` arrays until batched
#[derive(Debug, Clone)]
pub struct WindowDataset {
    /// (samples, sequence_length, features)
    pub features: Array3<f64>,
    pub targets: Array1<f64>,
}

impl WindowDataset {
    pub fn new(features: Array3<f64>, targets: Array1<f64>) -> Self {
        Self { features, targets }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Gather `indices` into `(x, y)` float tensors on `device`
    pub fn get_batch(&self, indices: &[usize], device: Device) -> (Tensor, Tensor) {
        let (_, window, features) = self.features.dim();

        let x: Vec<f32> = self
            .features
            .select(Axis(0), indices)
            .iter()
            .map(|&v| v as f32)
            .collect();
        let y: Vec<f32> = indices.iter().map(|&i| self.targets[i] as f32).collect();

        let x = Tensor::from_slice(&x)
            .view([indices.len() as i64, window as i64, features as i64])
            .to_device(device);
        let y = Tensor::from_slice(&y).to_device(device);
        (x, y)
    }
}

/// Yields batches of sample indices, optionally shuffled
pub struct DataLoader {
    indices: Vec<usize>,
    batch_size: usize,
    current_pos: usize,
    shuffle: bool,
    rng: StdRng,
}

impl DataLoader {
    /// Create a new data loader
    pub fn new(dataset_size: usize, batch_size: usize, shuffle: bool) -> Self {
        Self::with_rng(dataset_size, batch_size, shuffle, StdRng::from_entropy())
    }

    /// Create a loader whose shuffling is reproducible
    pub fn seeded(dataset_size: usize, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        Self::with_rng(dataset_size, batch_size, shuffle, StdRng::seed_from_u64(seed))
    }

    fn with_rng(dataset_size: usize, batch_size: usize, shuffle: bool, mut rng: StdRng) -> Self {
        let mut indices: Vec<usize> = (0..dataset_size).collect();
        if shuffle {
            indices.shuffle(&mut rng);
        }

        Self {
            indices,
            batch_size: batch_size.max(1),
            current_pos: 0,
            shuffle,
            rng,
        }
    }

    /// Get number of batches
    pub fn num_batches(&self) -> usize {
        (self.indices.len() + self.batch_size - 1) / self.batch_size
    }

    /// Reset the loader for a new epoch
    pub fn reset(&mut self) {
        self.current_pos = 0;
        if self.shuffle {
            self.indices.shuffle(&mut self.rng);
        }
    }

    /// Get next batch of indices
    pub fn next_batch(&mut self) -> Option<Vec<usize>> {
        if self.current_pos >= self.indices.len() {
            return None;
        }

        let end = (self.current_pos + self.batch_size).min(self.indices.len());
        let batch = self.indices[self.current_pos..end].to_vec();
        self.current_pos = end;

        Some(batch)
    }
}

impl Iterator for DataLoader {
    type Item = Vec<usize>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_batch()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_num_batches() {
        let loader = DataLoader::new(5, 2, false);
        assert_eq!(loader.num_batches(), 3);
    }

    #[test]
    fn test_iteration_covers_all_samples() {
        let mut loader = DataLoader::seeded(10, 3, true, 7);
        let batches: Vec<_> = loader.by_ref().collect();
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[3].len(), 1);

        let mut seen: Vec<usize> = batches.into_iter().flatten().collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..10).collect::<Vec<_>>());
    }

    #[test]
    fn test_unshuffled_order() {
        let batches: Vec<_> = DataLoader::new(4, 3, false).collect();
        assert_eq!(batches, vec![vec![0, 1, 2], vec![3]]);
    }

    #[test]
    fn test_reset_starts_new_epoch() {
        let mut loader = DataLoader::seeded(6, 4, true, 1);
        assert_eq!(loader.by_ref().count(), 2);
        loader.reset();
        assert_eq!(loader.by_ref().count(), 2);
    }

    #[test]
    fn test_get_batch_shapes() {
        let features = Array3::from_shape_fn((4, 3, 2), |(i, t, f)| (i * 100 + t * 10 + f) as f64);
        let targets = Array1::from(vec![0.0, 1.0, 2.0, 3.0]);
        let dataset = WindowDataset::new(features, targets);

        let (x, y) = dataset.get_batch(&[2, 0], Device::Cpu);
        assert_eq!(x.size(), vec![2, 3, 2]);
        assert_eq!(Vec::<f32>::try_from(&y).unwrap(), vec![2.0, 0.0]);
        assert_eq!(x.double_value(&[0, 1, 1]), 211.0);
        assert_eq!(x.double_value(&[1, 2, 0]), 20.0);
    }
}
