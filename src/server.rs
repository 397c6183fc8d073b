//! The part of a round that runs on the server, once the client outputs are aggregated.

use log::info;
use machine_learning::{arch::Network, optimization::Optimizer, Tensor};
use ndarray::Array2;

use crate::{
    config::RoundConfig,
    counters::{NUM_DISCRIMINATOR_TRAIN_EXAMPLES, NUM_GENERATOR_TRAIN_EXAMPLES, NUM_ROUNDS},
    state::{ClientOutput, ServerState},
    tensor_utils,
    train_fns::GeneratorStep,
    Result,
};

/// Updates the server state from the aggregated client output.
///
/// Builds the generator step from `config` and runs `server_computation_with`.
///
/// # Arguments
/// * `server_state` - The state at the start of the round, left untouched.
/// * `gen_inputs_ds` - Batches of generator inputs, consumed to completion.
/// * `client_output` - The aggregated output of the clients.
/// * `generator` - The server's generator.
/// * `discriminator` - The server's discriminator.
/// * `server_disc_update_optimizer` - Applies the discriminator delta, kept across rounds.
/// * `config` - Hyperparameters of the generator step.
/// * `new_aggregation_state` - The aggregation state to carry into the next round.
#[allow(clippy::too_many_arguments)]
pub fn server_computation<A, I, G, D, O>(
    server_state: &ServerState<A>,
    gen_inputs_ds: I,
    client_output: &ClientOutput,
    generator: &mut G,
    discriminator: &mut D,
    server_disc_update_optimizer: &mut O,
    config: &RoundConfig,
    new_aggregation_state: A,
) -> Result<ServerState<A>>
where
    I: IntoIterator<Item = Array2<f32>>,
    G: Network,
    D: Network,
    O: Optimizer,
{
    let mut train_generator_fn = config.generator_step()?;
    server_computation_with(
        server_state,
        gen_inputs_ds,
        client_output,
        generator,
        discriminator,
        server_disc_update_optimizer,
        &mut train_generator_fn,
        new_aggregation_state,
    )
}

/// Same as `server_computation`, with the generator step supplied by the caller.
///
/// The delta is applied to every discriminator variable, trainable or not, as the
/// negated gradient of `server_disc_update_optimizer`. Nothing is written to the
/// returned state until the whole round succeeds.
///
/// The update optimizer is stepped before the generator is trained, so if a generator
/// step fails its iteration count and slots have already advanced while the returned
/// state is discarded. Retrying the round with the same optimizer applies the delta
/// on top of that advanced state.
///
/// # Returns
/// The state for the next round.
#[allow(clippy::too_many_arguments)]
pub fn server_computation_with<A, I, G, D, O, S>(
    server_state: &ServerState<A>,
    gen_inputs_ds: I,
    client_output: &ClientOutput,
    generator: &mut G,
    discriminator: &mut D,
    server_disc_update_optimizer: &mut O,
    train_generator_fn: &mut S,
    new_aggregation_state: A,
) -> Result<ServerState<A>>
where
    I: IntoIterator<Item = Array2<f32>>,
    G: Network,
    D: Network,
    O: Optimizer,
    S: GeneratorStep,
{
    let mut counters = server_state.counters.clone();

    tensor_utils::assign_weights(
        "server generator weights",
        generator,
        &server_state.generator_weights,
    )?;
    tensor_utils::assign_weights(
        "server discriminator weights",
        discriminator,
        &server_state.discriminator_weights,
    )?;

    let delta = &client_output.discriminator_weights_delta;
    tensor_utils::assert_same_structure(
        "discriminator weights delta",
        tensor_utils::shapes(delta),
        discriminator.weights().iter().map(|v| v.shape()),
    )?;

    let grads: Vec<Tensor> = delta.iter().map(|d| -d).collect();
    let mut vars: Vec<&mut Tensor> = discriminator
        .weights_mut()
        .iter_mut()
        .map(|v| &mut v.value)
        .collect();
    server_disc_update_optimizer.apply_gradients(&grads, &mut vars)?;

    counters.merge(&client_output.counters);

    let mut num_examples = 0;
    for gen_inputs in gen_inputs_ds {
        num_examples += train_generator_fn.train(generator, discriminator, gen_inputs.view())?;
    }

    counters.add(NUM_GENERATOR_TRAIN_EXAMPLES, num_examples as u64);
    counters.add(NUM_ROUNDS, 1);

    info!(
        "round {} done: {} discriminator / {} generator examples so far",
        counters.get(NUM_ROUNDS).unwrap_or_default(),
        counters.get(NUM_DISCRIMINATOR_TRAIN_EXAMPLES).unwrap_or_default(),
        counters.get(NUM_GENERATOR_TRAIN_EXAMPLES).unwrap_or_default(),
    );

    Ok(ServerState {
        generator_weights: tensor_utils::weights(generator),
        discriminator_weights: tensor_utils::weights(discriminator),
        counters,
        aggregation_state: new_aggregation_state,
    })
}

#[cfg(test)]
mod tests {
    use machine_learning::{
        arch::{layers::Dense, Sequential},
        optimization::{Adam, GradientDescent},
    };
    use ndarray::{array, ArrayView2};

    use super::*;
    use crate::{counters::Counters, state::server_initial_state, GanErr};

    fn models() -> (Sequential, Sequential) {
        let generator = Sequential::new([Dense::new((2, 2), None)]).unwrap();
        let discriminator = Sequential::new([Dense::new((4, 4), None)]).unwrap();
        (generator, discriminator)
    }

    fn zero_output() -> ClientOutput {
        ClientOutput {
            discriminator_weights_delta: vec![Tensor::zeros(vec![4, 4]), Tensor::zeros(vec![4])],
            update_weight: 0.,
            counters: Counters::from_iter([(NUM_DISCRIMINATOR_TRAIN_EXAMPLES, 0)]),
        }
    }

    fn no_inputs() -> Vec<Array2<f32>> {
        Vec::new()
    }

    /// Counts the batches and leaves the models alone.
    struct Counting(usize);

    impl GeneratorStep for Counting {
        fn train<G: Network, D: Network>(
            &mut self,
            _: &mut G,
            _: &mut D,
            gen_inputs: ArrayView2<f32>,
        ) -> Result<usize> {
            self.0 += 1;
            Ok(gen_inputs.nrows())
        }
    }

    #[test]
    fn zero_delta_round_keeps_the_discriminator_and_counts_the_round() {
        let (mut generator, mut discriminator) = models();
        let state: ServerState = server_initial_state(&generator, &discriminator);

        let new_state = server_computation(
            &state,
            no_inputs(),
            &zero_output(),
            &mut generator,
            &mut discriminator,
            &mut GradientDescent::new(1.),
            &RoundConfig::default(),
            (),
        )
        .unwrap();

        assert_eq!(new_state.discriminator_weights, state.discriminator_weights);
        assert_eq!(new_state.generator_weights, state.generator_weights);
        assert_eq!(new_state.counter(NUM_ROUNDS), 1);
        assert_eq!(new_state.counter(NUM_GENERATOR_TRAIN_EXAMPLES), 0);
        assert_eq!(state.counter(NUM_ROUNDS), 0);
    }

    #[test]
    fn stateful_update_optimizer_keeps_a_zero_delta_still() {
        let (mut generator, mut discriminator) = models();
        let state: ServerState = server_initial_state(&generator, &discriminator);
        let mut optimizer = Adam::new(0.1, 0.9, 0.999, 1e-7);

        let mut next = state.clone();
        for _ in 0..2 {
            next = server_computation_with(
                &next,
                no_inputs(),
                &zero_output(),
                &mut generator,
                &mut discriminator,
                &mut optimizer,
                &mut Counting(0),
                (),
            )
            .unwrap();
        }

        assert_eq!(optimizer.iterations(), 2);
        assert_eq!(next.discriminator_weights, state.discriminator_weights);
    }

    #[test]
    fn unit_rate_sgd_adds_the_delta() {
        let (mut generator, mut discriminator) = models();
        let state: ServerState = server_initial_state(&generator, &discriminator);

        let mut output = zero_output();
        output.discriminator_weights_delta[0].fill(0.25);
        output.discriminator_weights_delta[1] = array![1., -1., 0., 2.].into_dyn();

        let new_state = server_computation_with(
            &state,
            no_inputs(),
            &output,
            &mut generator,
            &mut discriminator,
            &mut GradientDescent::new(1.),
            &mut Counting(0),
            (),
        )
        .unwrap();

        let expected: Vec<Tensor> = state
            .discriminator_weights
            .iter()
            .zip(&output.discriminator_weights_delta)
            .map(|(w, d)| w + d)
            .collect();
        assert_eq!(new_state.discriminator_weights, expected);
        assert_eq!(tensor_utils::weights(&discriminator), expected);
    }

    #[test]
    fn frozen_discriminator_variables_are_updated_too() {
        let (mut generator, mut discriminator) = models();
        discriminator.freeze(0);
        let state: ServerState = server_initial_state(&generator, &discriminator);

        let mut output = zero_output();
        output.discriminator_weights_delta[0].fill(1.);

        let new_state = server_computation_with(
            &state,
            no_inputs(),
            &output,
            &mut generator,
            &mut discriminator,
            &mut GradientDescent::new(1.),
            &mut Counting(0),
            (),
        )
        .unwrap();

        assert_ne!(new_state.discriminator_weights[0], state.discriminator_weights[0]);
    }

    #[test]
    fn counters_accumulate_across_rounds() {
        let (mut generator, mut discriminator) = models();
        let mut state: ServerState = server_initial_state(&generator, &discriminator);
        let mut output = zero_output();
        output.counters = Counters::from_iter([(NUM_DISCRIMINATOR_TRAIN_EXAMPLES, 10)]);

        for _ in 0..3 {
            let mut step = Counting(0);
            state = server_computation_with(
                &state,
                vec![Array2::<f32>::zeros((3, 2)), Array2::zeros((2, 2))],
                &output,
                &mut generator,
                &mut discriminator,
                &mut GradientDescent::new(1.),
                &mut step,
                (),
            )
            .unwrap();
            assert_eq!(step.0, 2);
        }

        assert_eq!(state.counter(NUM_ROUNDS), 3);
        assert_eq!(state.counter(NUM_DISCRIMINATOR_TRAIN_EXAMPLES), 30);
        assert_eq!(state.counter(NUM_GENERATOR_TRAIN_EXAMPLES), 15);
    }

    #[test]
    fn generator_steps_move_only_the_generator() {
        let mut generator = Sequential::new([Dense::new((2, 2), None)]).unwrap();
        generator.weights_mut()[0].value = array![[1., 0.], [0., 1.]].into_dyn();
        let mut discriminator = Sequential::new([Dense::new((2, 1), None)]).unwrap();
        discriminator.weights_mut()[0].value = array![[0.5], [-0.5]].into_dyn();
        let state: ServerState = server_initial_state(&generator, &discriminator);

        let output = ClientOutput {
            discriminator_weights_delta: discriminator.zero_grads(),
            update_weight: 0.,
            counters: Counters::new(),
        };

        let new_state = server_computation(
            &state,
            vec![array![[1., 2.], [0., 1.]]],
            &output,
            &mut generator,
            &mut discriminator,
            &mut GradientDescent::new(1.),
            &RoundConfig::default(),
            (),
        )
        .unwrap();

        assert_ne!(new_state.generator_weights, state.generator_weights);
        assert_eq!(new_state.discriminator_weights, state.discriminator_weights);
        assert_eq!(new_state.counter(NUM_GENERATOR_TRAIN_EXAMPLES), 2);
    }

    #[test]
    fn aggregation_state_is_replaced() {
        let (mut generator, mut discriminator) = models();
        let state: ServerState<u32> = server_initial_state(&generator, &discriminator);

        let new_state = server_computation(
            &state,
            no_inputs(),
            &zero_output(),
            &mut generator,
            &mut discriminator,
            &mut GradientDescent::new(1.),
            &RoundConfig::default(),
            7,
        )
        .unwrap();

        assert_eq!(state.aggregation_state, 0);
        assert_eq!(new_state.aggregation_state, 7);
    }

    #[test]
    fn mismatched_delta_is_rejected() {
        let (mut generator, mut discriminator) = models();
        let state: ServerState = server_initial_state(&generator, &discriminator);
        let mut output = zero_output();
        output.discriminator_weights_delta[1] = Tensor::zeros(vec![3]);

        let err = server_computation(
            &state,
            no_inputs(),
            &output,
            &mut generator,
            &mut discriminator,
            &mut GradientDescent::new(1.),
            &RoundConfig::default(),
            (),
        );
        assert!(matches!(err, Err(GanErr::StructuralMismatch { .. })));
    }
}
