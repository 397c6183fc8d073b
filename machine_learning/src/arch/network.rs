use ndarray::{Array2, ArrayView2};

use crate::{
    Result,
    tensor::{Tensor, Variable},
};

/// The gradients produced by a backward pass.
#[derive(Debug, Clone)]
pub struct Backward {
    /// One gradient per variable, in the order of `Network::weights`.
    pub weights: Vec<Tensor>,
    /// The gradient with respect to the input of the last forward pass.
    pub input: Array2<f32>,
}

/// A differentiable model with an ordered, stable list of variables.
///
/// `forward` caches whatever it needs so the next `backward` call can compute the
/// gradients of that same pass. Every row of a batch is an independent example.
pub trait Network {
    /// Returns every variable of the network, trainable or not, in a stable order.
    fn weights(&self) -> &[Variable];

    /// Mutable access to the same variables returned by `weights`.
    fn weights_mut(&mut self) -> &mut [Variable];

    /// Makes a forward pass through the network.
    ///
    /// # Arguments
    /// * `x` - A batch of inputs, one example per row.
    ///
    /// # Returns
    /// The outputs for the batch or an error if the input doesn't fit the network.
    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>>;

    /// Back propagates `d`, the gradient of some scalar with respect to the output
    /// of the last forward pass.
    ///
    /// # Returns
    /// The gradients for every variable and for the input.
    fn backward(&mut self, d: ArrayView2<f32>) -> Result<Backward>;

    /// Zero valued gradients, one per variable.
    fn zero_grads(&self) -> Vec<Tensor> {
        self.weights()
            .iter()
            .map(|v| Tensor::zeros(v.value.raw_dim()))
            .collect()
    }
}
