//! Single-batch training steps binding a GAN loss and an optimizer.

use log::{trace, warn};
use machine_learning::{
    arch::{loss::GanLossFns, Network},
    optimization::Optimizer,
    Tensor,
};
use ndarray::ArrayView2;
use serde::{Deserialize, Serialize};

use crate::{tensor_utils, GanErr, Result};

/// What to do when a step is bound to an optimizer that has already been used.
///
/// A used optimizer holds accumulator state of its own, which would silently diverge
/// from the copy exchanged between server and clients.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrecheckPolicy {
    /// Refuse to bind a used optimizer.
    #[default]
    Strict,
    /// Log a warning and bind it anyway.
    Advisory,
}

impl PrecheckPolicy {
    fn check<O: Optimizer>(self, what: &'static str, optimizer: &O) -> Result<()> {
        if optimizer.is_pristine() {
            return Ok(());
        }

        let iterations = optimizer.iterations();
        match self {
            PrecheckPolicy::Strict => Err(GanErr::PrecheckViolation { what, iterations }),
            PrecheckPolicy::Advisory => {
                warn!("{what} was already used for {iterations} iteration(s), binding it anyway");
                Ok(())
            }
        }
    }
}

/// One step of generator training.
pub trait GeneratorStep {
    /// Trains the generator on a single batch.
    ///
    /// # Arguments
    /// * `generator` - The generator, updated in place.
    /// * `discriminator` - The discriminator, left unchanged.
    /// * `gen_inputs` - A batch of inputs (usually noise) for the generator.
    ///
    /// # Returns
    /// The number of examples trained on.
    fn train<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
    ) -> Result<usize>
    where
        G: Network,
        D: Network;
}

/// One step of discriminator training.
pub trait DiscriminatorStep {
    /// Trains the discriminator on a single batch.
    ///
    /// # Arguments
    /// * `generator` - The generator, left unchanged.
    /// * `discriminator` - The discriminator, updated in place.
    /// * `gen_inputs` - A batch of inputs (usually noise) for the generator.
    /// * `real_data` - A batch of real data, as many rows as `gen_inputs`.
    ///
    /// # Returns
    /// The size of the batch.
    fn train<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
        real_data: ArrayView2<f32>,
    ) -> Result<usize>
    where
        G: Network,
        D: Network;
}

/// A generator step bound to its loss and optimizer.
#[derive(Debug, Clone)]
pub struct TrainGenerator<L, O> {
    loss_fns: L,
    optimizer: O,
}

/// A discriminator step bound to its loss and optimizer.
#[derive(Debug, Clone)]
pub struct TrainDiscriminator<L, O> {
    loss_fns: L,
    optimizer: O,
}

/// Creates a step that trains the generator, binding loss and optimizer.
///
/// # Arguments
/// * `loss_fns` - The generator/discriminator training losses.
/// * `optimizer` - The optimizer for the generator, expected to be unused.
/// * `precheck` - How to react when `optimizer` was already used.
pub fn create_train_generator_fn<L, O>(
    loss_fns: L,
    optimizer: O,
    precheck: PrecheckPolicy,
) -> Result<TrainGenerator<L, O>>
where
    L: GanLossFns,
    O: Optimizer,
{
    precheck.check("generator optimizer", &optimizer)?;
    Ok(TrainGenerator {
        loss_fns,
        optimizer,
    })
}

/// Creates a step that trains the discriminator, binding loss and optimizer.
///
/// # Arguments
/// * `loss_fns` - The generator/discriminator training losses.
/// * `optimizer` - The optimizer for the discriminator, expected to be unused.
/// * `precheck` - How to react when `optimizer` was already used.
pub fn create_train_discriminator_fn<L, O>(
    loss_fns: L,
    optimizer: O,
    precheck: PrecheckPolicy,
) -> Result<TrainDiscriminator<L, O>>
where
    L: GanLossFns,
    O: Optimizer,
{
    precheck.check("discriminator optimizer", &optimizer)?;
    Ok(TrainDiscriminator {
        loss_fns,
        optimizer,
    })
}

impl<L, O> TrainGenerator<L, O> {
    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }
}

impl<L, O> TrainDiscriminator<L, O> {
    pub fn optimizer(&self) -> &O {
        &self.optimizer
    }

    pub fn loss_fns(&self) -> &L {
        &self.loss_fns
    }
}

impl<L: GanLossFns, O: Optimizer> GeneratorStep for TrainGenerator<L, O> {
    fn train<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
    ) -> Result<usize>
    where
        G: Network,
        D: Network,
    {
        let eval = self
            .loss_fns
            .generator_loss(generator, discriminator, gen_inputs)?;
        trace!("generator loss {}", eval.loss);

        apply_to_trainable(&mut self.optimizer, generator, eval.grads)?;
        Ok(gen_inputs.nrows())
    }
}

impl<L: GanLossFns, O: Optimizer> DiscriminatorStep for TrainDiscriminator<L, O> {
    fn train<G, D>(
        &mut self,
        generator: &mut G,
        discriminator: &mut D,
        gen_inputs: ArrayView2<f32>,
        real_data: ArrayView2<f32>,
    ) -> Result<usize>
    where
        G: Network,
        D: Network,
    {
        let eval =
            self.loss_fns
                .discriminator_loss(generator, discriminator, gen_inputs, real_data)?;
        trace!("discriminator loss {}", eval.loss);

        apply_to_trainable(&mut self.optimizer, discriminator, eval.grads)?;
        Ok(real_data.nrows())
    }
}

/// Hands the gradients of the trainable variables of `network` to `optimizer`.
fn apply_to_trainable<N, O>(optimizer: &mut O, network: &mut N, grads: Vec<Tensor>) -> Result<()>
where
    N: Network,
    O: Optimizer,
{
    tensor_utils::assert_same_structure(
        "loss gradients",
        tensor_utils::shapes(&grads),
        network.weights().iter().map(|v| v.shape()),
    )?;

    let (grads, mut vars): (Vec<Tensor>, Vec<&mut Tensor>) = grads
        .into_iter()
        .zip(network.weights_mut().iter_mut())
        .filter(|(_, var)| var.trainable)
        .map(|(grad, var)| (grad, &mut var.value))
        .unzip();

    optimizer.apply_gradients(&grads, &mut vars)?;
    Ok(())
}
