//! Batch sources feeding the round functions.

use std::num::NonZeroUsize;

use ndarray::{s, Array2, Axis};
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rand_distr::{Distribution, Normal, StandardNormal};

use crate::{GanErr, Result};

/// Standard normal generator inputs, `(batch_size, noise_dim)` per batch.
#[derive(Debug, Clone)]
pub struct NoiseBatches {
    rng: StdRng,
    batch_size: usize,
    noise_dim: usize,
    remaining: Option<usize>,
}

impl NoiseBatches {
    /// Creates an endless source of noise batches.
    pub fn new(batch_size: NonZeroUsize, noise_dim: NonZeroUsize, seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            batch_size: batch_size.get(),
            noise_dim: noise_dim.get(),
            remaining: None,
        }
    }

    /// Stops the source after `n` batches.
    pub fn limit(self, n: usize) -> Self {
        Self {
            remaining: Some(n),
            ..self
        }
    }
}

impl Iterator for NoiseBatches {
    type Item = Array2<f32>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(remaining) = &mut self.remaining {
            if *remaining == 0 {
                return None;
            }
            *remaining -= 1;
        }

        let rng = &mut self.rng;
        let batch = Array2::from_shape_simple_fn((self.batch_size, self.noise_dim), || {
            StandardNormal.sample(rng)
        });
        Some(batch)
    }
}

/// A dataset fully held in memory, one example per row.
#[derive(Debug, Clone)]
pub struct InMemoryDataset {
    data: Array2<f32>,
}

impl InMemoryDataset {
    pub fn new(data: Array2<f32>) -> Self {
        Self { data }
    }

    /// Samples `rows` examples from an isotropic normal distribution centered at `mean`.
    pub fn normal<R: Rng>(rows: usize, mean: &[f32], std_dev: f32, rng: &mut R) -> Result<Self> {
        if !std_dev.is_finite() || std_dev < 0. {
            return Err(GanErr::InvalidConfig(format!(
                "standard deviation must be a non-negative number, got {std_dev}"
            )));
        }

        let normal = Normal::new(0., std_dev)
            .map_err(|e| GanErr::InvalidConfig(format!("invalid standard deviation: {e}")))?;

        let data = Array2::from_shape_fn((rows, mean.len()), |(_, j)| {
            mean[j] + normal.sample(rng)
        });
        Ok(Self { data })
    }

    pub fn len(&self) -> usize {
        self.data.nrows()
    }

    pub fn is_empty(&self) -> bool {
        self.data.nrows() == 0
    }

    pub fn data(&self) -> &Array2<f32> {
        &self.data
    }

    /// Shuffles the examples in place.
    pub fn shuffle<R: Rng>(&mut self, rng: &mut R) {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.shuffle(rng);
        self.data = self.data.select(Axis(0), &order);
    }

    /// Yields consecutive batches of `batch_size` rows, the last one possibly shorter.
    pub fn batches(&self, batch_size: NonZeroUsize) -> impl Iterator<Item = Array2<f32>> + '_ {
        let batch_size = batch_size.get();
        (0..self.len())
            .step_by(batch_size)
            .map(move |start| {
                let end = (start + batch_size).min(self.len());
                self.data.slice(s![start..end, ..]).to_owned()
            })
    }
}
