use super::{Optimizer, check_pairs};
use crate::{Result, tensor::Tensor};

/// Gradient descent optimization algorithm.
#[derive(Debug, Clone)]
pub struct GradientDescent {
    learning_rate: f32,
    iterations: u64,
}

impl GradientDescent {
    /// Creates a new `GradientDescent` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    ///
    /// # Returns
    /// A new `GradientDescent` instance.
    pub fn new(learning_rate: f32) -> Self {
        Self {
            learning_rate,
            iterations: 0,
        }
    }

    pub fn learning_rate(&self) -> f32 {
        self.learning_rate
    }
}

impl Optimizer for GradientDescent {
    /// Makes a step in the opposite direction of the gradient, with a length of `learning_rate`.
    fn apply_gradients(&mut self, grads: &[Tensor], vars: &mut [&mut Tensor]) -> Result<()> {
        check_pairs(grads, vars)?;

        let lr = self.learning_rate;
        for (v, g) in vars.iter_mut().zip(grads) {
            v.scaled_add(-lr, g);
        }

        self.iterations += 1;
        Ok(())
    }

    fn iterations(&self) -> u64 {
        self.iterations
    }
}
