//! The part of a round that runs on every client.

use log::{debug, warn};
use machine_learning::arch::Network;
use ndarray::{s, Array2};

use crate::{
    config::RoundConfig,
    counters::{Counters, NUM_DISCRIMINATOR_TRAIN_EXAMPLES},
    state::{ClientOutput, FromServer},
    tensor_utils,
    train_fns::DiscriminatorStep,
    Result,
};

/// Trains the discriminator on the client's data, starting from the server's weights.
///
/// Builds the discriminator step from `config` and runs `client_computation_with`.
///
/// # Arguments
/// * `gen_inputs_ds` - Batches of generator inputs.
/// * `real_data_ds` - Batches of the client's real data.
/// * `from_server` - The weights broadcast by the server.
/// * `generator` - The client's generator, overwritten with the server's weights.
/// * `discriminator` - The client's discriminator, overwritten and then trained.
/// * `config` - Hyperparameters of the discriminator step.
pub fn client_computation<I, R, G, D>(
    gen_inputs_ds: I,
    real_data_ds: R,
    from_server: &FromServer,
    generator: &mut G,
    discriminator: &mut D,
    config: &RoundConfig,
) -> Result<ClientOutput>
where
    I: IntoIterator<Item = Array2<f32>>,
    R: IntoIterator<Item = Array2<f32>>,
    G: Network,
    D: Network,
{
    let mut train_discriminator_fn = config.discriminator_step()?;
    client_computation_with(
        gen_inputs_ds,
        real_data_ds,
        from_server,
        generator,
        discriminator,
        &mut train_discriminator_fn,
    )
}

/// Same as `client_computation`, with the discriminator step supplied by the caller.
///
/// The datasets are paired batch by batch until the shorter one runs out, and each
/// pair is truncated to its smaller batch. A delta with any NaN or infinite value is
/// replaced by zeros and reported with an update weight of zero.
///
/// # Returns
/// The discriminator weights delta, its update weight and the client counters.
pub fn client_computation_with<I, R, G, D, S>(
    gen_inputs_ds: I,
    real_data_ds: R,
    from_server: &FromServer,
    generator: &mut G,
    discriminator: &mut D,
    train_discriminator_fn: &mut S,
) -> Result<ClientOutput>
where
    I: IntoIterator<Item = Array2<f32>>,
    R: IntoIterator<Item = Array2<f32>>,
    G: Network,
    D: Network,
    S: DiscriminatorStep,
{
    tensor_utils::assign_weights(
        "generator weights from server",
        generator,
        &from_server.generator_weights,
    )?;
    tensor_utils::assign_weights(
        "discriminator weights from server",
        discriminator,
        &from_server.discriminator_weights,
    )?;

    let mut num_examples = 0;
    for (gen_inputs, real_data) in gen_inputs_ds.into_iter().zip(real_data_ds) {
        let rows = gen_inputs.nrows().min(real_data.nrows());
        if rows == 0 {
            continue;
        }

        num_examples += train_discriminator_fn.train(
            generator,
            discriminator,
            gen_inputs.slice(s![..rows, ..]),
            real_data.slice(s![..rows, ..]),
        )?;
    }

    let weights_delta = tensor_utils::subtract(
        "discriminator weights delta",
        &tensor_utils::weights(discriminator),
        &from_server.discriminator_weights,
    )?;
    let (weights_delta, has_non_finite) = tensor_utils::zero_all_if_any_non_finite(weights_delta);

    let update_weight = if has_non_finite {
        warn!("discriminator diverged after {num_examples} examples, dropping the update");
        0.
    } else {
        num_examples as f32
    };
    debug!("client trained on {num_examples} examples");

    let counters = Counters::from_iter([(NUM_DISCRIMINATOR_TRAIN_EXAMPLES, num_examples as u64)]);

    Ok(ClientOutput {
        discriminator_weights_delta: weights_delta,
        update_weight,
        counters,
    })
}
