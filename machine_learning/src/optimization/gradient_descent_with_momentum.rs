use ndarray::Zip;

use super::{Optimizer, check_pairs, check_slots, zeros_like};
use crate::{Result, tensor::Tensor};

#[derive(Debug, Clone)]
pub struct GradientDescentWithMomentum {
    learning_rate: f32,
    momentum: f32,
    velocity: Vec<Tensor>,
    iterations: u64,
}

impl GradientDescentWithMomentum {
    /// Creates a new `GradientDescentWithMomentum` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `momentum` - Hyperparameter to the optimization algorithm.
    ///
    /// # Returns
    /// A new `GradientDescentWithMomentum` instance.
    pub fn new(learning_rate: f32, momentum: f32) -> Self {
        Self {
            learning_rate,
            momentum,
            velocity: Vec::new(),
            iterations: 0,
        }
    }
}

impl Optimizer for GradientDescentWithMomentum {
    fn apply_gradients(&mut self, grads: &[Tensor], vars: &mut [&mut Tensor]) -> Result<()> {
        check_pairs(grads, vars)?;

        if self.velocity.is_empty() {
            self.velocity = zeros_like(vars);
        }
        check_slots(&self.velocity, vars)?;

        let lr = self.learning_rate;
        let mu = self.momentum;

        for ((p, g), v) in vars.iter_mut().zip(grads).zip(self.velocity.iter_mut()) {
            Zip::from(&mut **p).and(g).and(v).for_each(|p, &g, v| {
                *v = (mu * *v) + g;
                *p -= lr * *v;
            });
        }

        self.iterations += 1;
        Ok(())
    }

    fn iterations(&self) -> u64 {
        self.iterations
    }
}
