use ndarray::Zip;

use super::{Optimizer, check_pairs, check_slots, zeros_like};
use crate::{Result, tensor::Tensor};

#[derive(Debug, Clone)]
pub struct Adam {
    learning_rate: f32,
    beta1: f32,
    beta2: f32,
    beta1_t: f32,
    beta2_t: f32,
    v: Vec<Tensor>,
    s: Vec<Tensor>,
    epsilon: f32,
    iterations: u64,
}

impl Adam {
    /// Creates a new `Adam` optimizer.
    ///
    /// # Arguments
    /// * `learning_rate` - The small coefficient that modulates the amount of training per update.
    /// * `beta1`, `beta2`, `epsilon` - Hyperparameters to the optimization algorithm.
    ///
    /// # Returns
    /// A new `Adam` instance.
    pub fn new(learning_rate: f32, beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            beta1,
            beta2,
            beta1_t: 1.,
            beta2_t: 1.,
            v: Vec::new(),
            s: Vec::new(),
            epsilon,
            iterations: 0,
        }
    }
}

impl Optimizer for Adam {
    fn apply_gradients(&mut self, grads: &[Tensor], vars: &mut [&mut Tensor]) -> Result<()> {
        check_pairs(grads, vars)?;

        if self.v.is_empty() {
            self.v = zeros_like(vars);
            self.s = zeros_like(vars);
        }
        check_slots(&self.v, vars)?;

        let Self {
            learning_rate: lr,
            beta1: b1,
            beta2: b2,
            epsilon: eps,
            ..
        } = *self;

        self.beta1_t *= b1;
        self.beta2_t *= b2;

        let bc1 = 1. - self.beta1_t;
        let bc2 = 1. - self.beta2_t;
        let step_size = lr * (bc2.sqrt() / bc1);

        let slots = self.v.iter_mut().zip(self.s.iter_mut());
        for ((p, g), (v, s)) in vars.iter_mut().zip(grads).zip(slots) {
            Zip::from(&mut **p)
                .and(g)
                .and(v)
                .and(s)
                .for_each(|p, &g, v, s| {
                    *v = b1 * *v + (1. - b1) * g;
                    *s = b2 * *s + (1. - b2) * g.powi(2);
                    *p -= step_size * *v / (s.sqrt() + eps);
                });
        }

        self.iterations += 1;
        Ok(())
    }

    fn iterations(&self) -> u64 {
        self.iterations
    }
}
