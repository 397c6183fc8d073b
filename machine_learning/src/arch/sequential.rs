use ndarray::{Array2, ArrayView2};
use rand::Rng;

use super::{Backward, Network, layers::Dense};
use crate::{
    MlErr, Result,
    initialization::ParamGen,
    tensor::{Tensor, Variable},
};

/// A sequential model: information flows forward when computing an output and backward when
/// computing the gradients of its layers.
///
/// Every `Dense` layer owns two consecutive variables, its kernel and its bias.
#[derive(Debug, Clone)]
pub struct Sequential {
    layers: Vec<Dense>,
    variables: Vec<Variable>,
}

impl Sequential {
    /// Creates a new `Sequential` with every parameter set to zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    ///
    /// # Returns
    /// A new `Sequential` instance or an error if adjacent layers don't fit together.
    pub fn new<I>(layers: I) -> Result<Self>
    where
        I: IntoIterator<Item = Dense>,
    {
        let layers: Vec<Dense> = layers.into_iter().collect();

        for pair in layers.windows(2) {
            let (_, out) = pair[0].dim();
            let (inp, _) = pair[1].dim();

            if out != inp {
                return Err(MlErr::SizeMismatch {
                    what: "adjacent layers",
                    got: inp,
                    expected: out,
                });
            }
        }

        let variables = layers
            .iter()
            .enumerate()
            .flat_map(|(i, layer)| {
                let [kernel, bias] = layer.param_shapes();
                [
                    Variable::new(format!("dense_{i}/kernel"), Tensor::zeros(kernel)),
                    Variable::new(format!("dense_{i}/bias"), Tensor::zeros(bias)),
                ]
            })
            .collect();

        Ok(Self { layers, variables })
    }

    /// Creates a new `Sequential` sampling its kernels from `kernel_init`, biases start at zero.
    ///
    /// # Arguments
    /// * `layers` - The layers the sequential is composed of.
    /// * `kernel_init` - The generator for the initial kernel values.
    /// * `rng` - A random number generator.
    pub fn initialized<I, R>(layers: I, kernel_init: ParamGen, rng: &mut R) -> Result<Self>
    where
        I: IntoIterator<Item = Dense>,
        R: Rng,
    {
        let mut model = Self::new(layers)?;

        for var in model.variables.iter_mut().step_by(2) {
            var.value = kernel_init.sample(var.value.shape(), rng)?;
        }

        Ok(model)
    }

    /// Marks the kernel and bias of the `layer`-th layer as non-trainable.
    pub fn freeze(&mut self, layer: usize) {
        for var in self.variables.iter_mut().skip(2 * layer).take(2) {
            var.trainable = false;
        }
    }

    /// The amount of features the model expects per example.
    pub fn input_size(&self) -> usize {
        self.layers.first().map_or(0, |l| l.dim().0)
    }

    /// The amount of features the model outputs per example.
    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, |l| l.dim().1)
    }
}

impl Network for Sequential {
    fn weights(&self) -> &[Variable] {
        &self.variables
    }

    fn weights_mut(&mut self) -> &mut [Variable] {
        &mut self.variables
    }

    fn forward(&mut self, x: ArrayView2<f32>) -> Result<Array2<f32>> {
        let mut x = x.to_owned();

        for (layer, params) in self.layers.iter_mut().zip(self.variables.chunks(2)) {
            x = layer.forward(&params[0].value, &params[1].value, x.view())?;
        }

        Ok(x)
    }

    fn backward(&mut self, d: ArrayView2<f32>) -> Result<Backward> {
        let mut weights = Vec::with_capacity(self.variables.len());
        let mut d = d.to_owned();

        let pairs = self.layers.iter_mut().zip(self.variables.chunks(2)).rev();
        for (layer, params) in pairs {
            let (dw, db, dx) = layer.backward(&params[0].value, &params[1].value, d.view())?;
            weights.push(db);
            weights.push(dw);
            d = dx;
        }

        weights.reverse();
        Ok(Backward { weights, input: d })
    }
}
