use ndarray::ArrayView2;

use crate::{Result, arch::Network, tensor::Tensor};

/// A scalar loss together with its gradient.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub loss: f32,
    /// One gradient per variable of the network being trained, in `Network::weights` order.
    pub grads: Vec<Tensor>,
}

/// The generator and discriminator training losses of a GAN.
///
/// Each method runs the complete forward pass through both networks and returns the
/// gradient with respect to the variables of the network being trained only.
pub trait GanLossFns {
    /// The generator loss for a batch of generator inputs, differentiated with respect to
    /// the generator.
    fn generator_loss<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
    ) -> Result<Evaluation>
    where
        G: Network,
        D: Network;

    /// The discriminator loss for a batch of generator inputs and a batch of real data,
    /// differentiated with respect to the discriminator.
    fn discriminator_loss<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
        real_data: ArrayView2<f32>,
    ) -> Result<Evaluation>
    where
        G: Network,
        D: Network;
}
