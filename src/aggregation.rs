//! Combining many client outputs into the single one the server consumes.

use machine_learning::Tensor;

use crate::{
    counters::Counters,
    state::ClientOutput,
    tensor_utils::{self, shapes},
    GanErr, Result,
};

/// An aggregation process with a state of its own, carried in `ServerState`.
pub trait Aggregator {
    type State;

    /// The state before the first round.
    fn initialize(&self) -> Self::State;

    /// Aggregates the outputs of one round.
    ///
    /// # Arguments
    /// * `outputs` - One output per client that took part in the round.
    /// * `state` - The aggregation state after the previous round.
    ///
    /// # Returns
    /// The combined output and the state for the next round.
    fn aggregate(
        &mut self,
        outputs: &[ClientOutput],
        state: &Self::State,
    ) -> Result<(ClientOutput, Self::State)>;
}

/// Mean of the client deltas weighted by their `update_weight`.
///
/// Counters are summed over every client, including the ones with zero weight.
/// When the total weight is zero the combined delta is all zeros.
#[derive(Debug, Clone, Copy, Default)]
pub struct WeightedMean;

impl Aggregator for WeightedMean {
    type State = ();

    fn initialize(&self) -> Self::State {}

    fn aggregate(
        &mut self,
        outputs: &[ClientOutput],
        _: &Self::State,
    ) -> Result<(ClientOutput, Self::State)> {
        let Some(first) = outputs.first() else {
            return Err(GanErr::EmptyAggregation);
        };

        let structure = &first.discriminator_weights_delta;
        let mut sum: Vec<Tensor> = structure
            .iter()
            .map(|t| Tensor::zeros(t.raw_dim()))
            .collect();
        let mut total_weight = 0.;
        let mut counters = Counters::new();

        for output in outputs {
            tensor_utils::assert_same_structure(
                "client weights delta",
                shapes(&output.discriminator_weights_delta),
                shapes(structure),
            )?;
            counters.merge(&output.counters);

            if output.update_weight == 0. {
                continue;
            }

            total_weight += output.update_weight;
            for (acc, delta) in sum.iter_mut().zip(&output.discriminator_weights_delta) {
                acc.scaled_add(output.update_weight, delta);
            }
        }

        if total_weight > 0. {
            sum.iter_mut().for_each(|t| *t /= total_weight);
        }

        let combined = ClientOutput {
            discriminator_weights_delta: sum,
            update_weight: total_weight,
            counters,
        };
        Ok((combined, ()))
    }
}
