use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Ix1, Ix2};

use crate::{MlErr, Result, arch::activations::ActFn, tensor::Tensor};

/// A fully connected layer.
///
/// The layer doesn't own its parameters, the owning model hands them in on every
/// pass as a `(n, m)` kernel and a `(m,)` bias.
#[derive(Debug, Clone)]
pub struct Dense {
    dim: (usize, usize),
    act_fn: Option<ActFn>,

    // Forward metadata
    x: Option<Array2<f32>>,
    z: Array2<f32>,
}

impl Dense {
    /// Creates a new `Dense` layer.
    ///
    /// # Arguments
    /// * `dim` - The input and output sizes.
    /// * `act_fn` - An optional activation applied to the affine output.
    pub fn new(dim: (usize, usize), act_fn: Option<ActFn>) -> Self {
        Self {
            dim,
            act_fn,
            x: None,
            z: Array2::zeros((0, dim.1)),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        self.dim
    }

    /// The shapes of the kernel and the bias, in that order.
    pub fn param_shapes(&self) -> [Vec<usize>; 2] {
        [vec![self.dim.0, self.dim.1], vec![self.dim.1]]
    }

    /// Computes `act_fn(x * kernel + bias)` and caches what the backward pass needs.
    pub fn forward(
        &mut self,
        kernel: &Tensor,
        bias: &Tensor,
        x: ArrayView2<f32>,
    ) -> Result<Array2<f32>> {
        if x.ncols() != self.dim.0 {
            return Err(MlErr::SizeMismatch {
                what: "dense layer input",
                got: x.ncols(),
                expected: self.dim.0,
            });
        }

        let (w, b) = self.view_params(kernel, bias)?;
        self.z = x.dot(&w) + &b;
        self.x = Some(x.to_owned());

        let Some(act_fn) = self.act_fn else {
            return Ok(self.z.clone());
        };

        Ok(self.z.mapv(|z| act_fn.f(z)))
    }

    /// Back propagates `d` through the last forward pass.
    ///
    /// # Returns
    /// The kernel gradient, the bias gradient and the input gradient.
    pub fn backward(
        &mut self,
        kernel: &Tensor,
        bias: &Tensor,
        d: ArrayView2<f32>,
    ) -> Result<(Tensor, Tensor, Array2<f32>)> {
        let x = self.x.as_ref().ok_or(MlErr::BackwardBeforeForward)?;

        if d.dim() != self.z.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "dense layer output gradient",
                got: d.shape().to_vec(),
                expected: self.z.shape().to_vec(),
            });
        }

        let mut d = d.to_owned();
        if let Some(act_fn) = self.act_fn {
            d.zip_mut_with(&self.z, |d, &z| *d *= act_fn.df(z));
        }

        let (w, _) = self.view_params(kernel, bias)?;
        let dw = x.t().dot(&d);
        let db = d.sum_axis(Axis(0));
        let dx = d.dot(&w.t());

        Ok((dw.into_dyn(), db.into_dyn(), dx))
    }

    /// Gives a view of the raw parameter tensors as the weights and biases of this layer.
    fn view_params<'a>(
        &self,
        kernel: &'a Tensor,
        bias: &'a Tensor,
    ) -> Result<(ArrayView2<'a, f32>, ArrayView1<'a, f32>)> {
        let [kernel_shape, bias_shape] = self.param_shapes();

        let w = kernel
            .view()
            .into_dimensionality::<Ix2>()
            .ok()
            .filter(|w| w.shape() == kernel_shape.as_slice())
            .ok_or_else(|| MlErr::ShapeMismatch {
                what: "dense layer kernel",
                got: kernel.shape().to_vec(),
                expected: kernel_shape.clone(),
            })?;

        let b = bias
            .view()
            .into_dimensionality::<Ix1>()
            .ok()
            .filter(|b| b.shape() == bias_shape.as_slice())
            .ok_or_else(|| MlErr::ShapeMismatch {
                what: "dense layer bias",
                got: bias.shape().to_vec(),
                expected: bias_shape.clone(),
            })?;

        Ok((w, b))
    }
}
