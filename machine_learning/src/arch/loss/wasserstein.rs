use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::{Rng, SeedableRng, rngs::StdRng};

use super::{Evaluation, GanLossFns};
use crate::{MlErr, Result, arch::Network, tensor::Tensor};

// Step along the input gradient direction used to differentiate the penalty.
const PENALTY_STEP: f32 = 1e-2;

/// Wasserstein GAN losses, optionally with a gradient penalty on the discriminator.
///
/// * generator: `-mean(D(G(z)))`
/// * discriminator: `mean(D(G(z))) - mean(D(x)) + lambda * mean((|grad D(x_hat)| - 1)^2)`
///
/// where `x_hat` interpolates each real example with its fake counterpart at a uniformly
/// sampled point.
///
/// The penalty depends on the discriminator's input gradient, so its own gradient is a
/// mixed second derivative. It is computed as a central difference of parameter gradients
/// taken at `x_hat +- h * u`, `u` being the normalized input gradient; this is exact for
/// networks that are piecewise linear in their input.
#[derive(Debug, Clone)]
pub struct WassersteinGanLossFns {
    grad_penalty_lambda: f32,
    rng: StdRng,
}

impl WassersteinGanLossFns {
    /// Creates a new `WassersteinGanLossFns`.
    ///
    /// # Arguments
    /// * `grad_penalty_lambda` - The penalty coefficient, zero disables the penalty.
    /// * `seed` - The seed for the interpolation points.
    pub fn new(grad_penalty_lambda: f32, seed: u64) -> Self {
        Self {
            grad_penalty_lambda,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn grad_penalty_lambda(&self) -> f32 {
        self.grad_penalty_lambda
    }

    /// Adds the gradient penalty to `eval`.
    fn add_gradient_penalty<D: Network>(
        &mut self,
        discriminator: &mut D,
        fake: ArrayView2<f32>,
        real: ArrayView2<f32>,
        eval: &mut Evaluation,
    ) -> Result<()> {
        let n = real.nrows();
        let lambda = self.grad_penalty_lambda;

        let eps = Array1::from_shape_fn(n, |_| self.rng.random::<f32>());
        let x_hat = &real + &((&fake - &real) * &eps.insert_axis(Axis(1)));

        let out = discriminator.forward(x_hat.view())?;
        let input_grad = discriminator.backward(Array2::ones(out.raw_dim()).view())?.input;

        let norms = input_grad.map_axis(Axis(1), |row| row.dot(&row).sqrt());
        eval.loss += lambda * norms.mapv(|g| (g - 1.).powi(2)).mean().unwrap_or_default();

        // d/dtheta |g_i| = d/dtheta (u_i . grad_x D(x_hat_i)), with u_i held constant.
        let mut direction = input_grad;
        let mut coeffs = Array1::zeros(n);
        for ((mut u, &norm), c) in direction
            .rows_mut()
            .into_iter()
            .zip(&norms)
            .zip(coeffs.iter_mut())
        {
            if norm > 0. {
                u /= norm;
                *c = 2. * lambda * (norm - 1.) / (n as f32 * 2. * PENALTY_STEP);
            } else {
                u.fill(0.);
            }
        }

        let coeffs = coeffs.insert_axis(Axis(1));
        for sign in [1f32, -1.] {
            let x = &x_hat + &(&direction * (sign * PENALTY_STEP));
            let out = discriminator.forward(x.view())?;
            let d = Array2::<f32>::ones(out.raw_dim()) * &coeffs * sign;
            let grads = discriminator.backward(d.view())?.weights;
            accumulate(&mut eval.grads, grads);
        }

        Ok(())
    }
}

impl GanLossFns for WassersteinGanLossFns {
    fn generator_loss<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
    ) -> Result<Evaluation>
    where
        G: Network,
        D: Network,
    {
        let fake = generator.forward(gen_inputs)?;
        let out = discriminator.forward(fake.view())?;
        if out.is_empty() {
            return Ok(Evaluation {
                loss: 0.,
                grads: generator.zero_grads(),
            });
        }

        let scale = -1. / out.len() as f32;
        let d_fake = discriminator
            .backward(Array2::from_elem(out.raw_dim(), scale).view())?
            .input;
        let grads = generator.backward(d_fake.view())?.weights;

        Ok(Evaluation {
            loss: scale * out.sum(),
            grads,
        })
    }

    fn discriminator_loss<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
        real_data: ArrayView2<f32>,
    ) -> Result<Evaluation>
    where
        G: Network,
        D: Network,
    {
        let fake = generator.forward(gen_inputs)?;
        if fake.dim() != real_data.dim() {
            return Err(MlErr::ShapeMismatch {
                what: "fake and real batches",
                got: fake.shape().to_vec(),
                expected: real_data.shape().to_vec(),
            });
        }

        let mut eval = Evaluation {
            loss: 0.,
            grads: discriminator.zero_grads(),
        };
        if fake.is_empty() {
            return Ok(eval);
        }

        for (batch, sign) in [(fake.view(), 1f32), (real_data, -1.)] {
            let out = discriminator.forward(batch)?;
            let scale = sign / out.len() as f32;
            eval.loss += scale * out.sum();

            let d = Array2::from_elem(out.raw_dim(), scale);
            let grads = discriminator.backward(d.view())?.weights;
            accumulate(&mut eval.grads, grads);
        }

        if self.grad_penalty_lambda > 0. {
            self.add_gradient_penalty(discriminator, fake.view(), real_data, &mut eval)?;
        }

        Ok(eval)
    }
}

fn accumulate(acc: &mut [Tensor], grads: Vec<Tensor>) {
    for (a, g) in acc.iter_mut().zip(grads) {
        *a += &g;
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;
    use crate::arch::{Sequential, layers::Dense};

    fn close(a: &Tensor, b: &Tensor, tol: f32) -> bool {
        a.shape() == b.shape() && a.iter().zip(b).all(|(x, y)| (x - y).abs() < tol)
    }

    fn linear(dim: (usize, usize), kernel: Tensor, bias: Tensor) -> Sequential {
        let mut model = Sequential::new([Dense::new(dim, None)]).unwrap();
        model.weights_mut()[0].value = kernel;
        model.weights_mut()[1].value = bias;
        model
    }

    // Identity generator over 2 features.
    fn identity() -> Sequential {
        linear(
            (2, 2),
            array![[1., 0.], [0., 1.]].into_dyn(),
            array![0., 0.].into_dyn(),
        )
    }

    #[test]
    fn generator_loss_pushes_fake_scores_up() {
        let mut generator = identity();
        let mut discriminator = linear(
            (2, 1),
            array![[1.], [2.]].into_dyn(),
            array![0.].into_dyn(),
        );
        let mut loss_fns = WassersteinGanLossFns::new(10., 0);

        let z = array![[1., 1.], [3., 1.]];
        let eval = loss_fns
            .generator_loss(&mut generator, &mut discriminator, z.view())
            .unwrap();

        // D(G(z)) = [3, 5]
        assert!((eval.loss + 4.).abs() < 1e-6);
        // d loss / d kernel_G = -mean over batch of z^T w_D
        let expected = array![[-2., -4.], [-1., -2.]].into_dyn();
        assert!(close(&eval.grads[0], &expected, 1e-5));
    }

    #[test]
    fn penalty_vanishes_for_unit_norm_critic() {
        let mut generator = identity();
        // |w| = 1 so the input gradient has unit norm everywhere.
        let mut discriminator = linear(
            (2, 1),
            array![[0.6], [0.8]].into_dyn(),
            array![0.].into_dyn(),
        );
        let z = array![[1., 0.], [0., 1.]];
        let real = array![[2., 2.], [1., -1.]];

        let mut with_penalty = WassersteinGanLossFns::new(10., 3);
        let mut without = WassersteinGanLossFns::new(0., 3);

        let a = with_penalty
            .discriminator_loss(&mut generator, &mut discriminator, z.view(), real.view())
            .unwrap();
        let b = without
            .discriminator_loss(&mut generator, &mut discriminator, z.view(), real.view())
            .unwrap();

        assert!((a.loss - b.loss).abs() < 1e-5);
        for (ga, gb) in a.grads.iter().zip(&b.grads) {
            assert!(close(ga, gb, 1e-3));
        }
    }

    #[test]
    fn penalty_gradient_for_linear_critic() {
        let mut generator = identity();
        let mut discriminator = linear(
            (2, 1),
            array![[3.], [4.]].into_dyn(),
            array![0.].into_dyn(),
        );
        let z = array![[0., 0.]];
        let real = array![[0., 0.]];
        let mut loss_fns = WassersteinGanLossFns::new(1., 0);

        let eval = loss_fns
            .discriminator_loss(&mut generator, &mut discriminator, z.view(), real.view())
            .unwrap();

        // |w| = 5: penalty (5 - 1)^2 = 16, gradient 2 * 4 * w / 5.
        assert!((eval.loss - 16.).abs() < 1e-3);
        let expected = array![[4.8], [6.4]].into_dyn();
        assert!(close(&eval.grads[0], &expected, 1e-2));
    }

    #[test]
    fn unequal_batches_are_rejected() {
        let mut generator = identity();
        let mut discriminator = linear((2, 1), Tensor::zeros(vec![2, 1]), Tensor::zeros(vec![1]));
        let mut loss_fns = WassersteinGanLossFns::new(10., 0);

        let err = loss_fns.discriminator_loss(
            &mut generator,
            &mut discriminator,
            array![[0., 0.]].view(),
            array![[0., 0.], [1., 1.]].view(),
        );

        assert!(matches!(err, Err(MlErr::ShapeMismatch { .. })));
    }
}
