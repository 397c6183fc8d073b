/// Element-wise activation functions usable by a `Dense` layer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ActFn {
    Tanh,
    LeakyRelu { alpha: f32 },
}
use ActFn::*;

impl ActFn {
    pub fn leaky_relu(alpha: f32) -> Self {
        LeakyRelu { alpha }
    }

    /// Evaluates the activation at `z`.
    pub fn f(&self, z: f32) -> f32 {
        match *self {
            Tanh => z.tanh(),
            LeakyRelu { alpha } => {
                if z >= 0. {
                    z
                } else {
                    alpha * z
                }
            }
        }
    }

    /// Evaluates the derivative of the activation at `z`.
    pub fn df(&self, z: f32) -> f32 {
        match *self {
            Tanh => 1. - z.tanh().powi(2),
            LeakyRelu { alpha } => {
                if z >= 0. {
                    1.
                } else {
                    alpha
                }
            }
        }
    }
}
