use machine_learning::{arch::Network, Tensor};
use serde::{Deserialize, Serialize};

use crate::{
    counters::{
        Counters, NUM_DISCRIMINATOR_TRAIN_EXAMPLES, NUM_GENERATOR_TRAIN_EXAMPLES, NUM_ROUNDS,
    },
    tensor_utils,
};

/// Data broadcast from the server to the clients at the start of a round.
///
/// Weights follow the order of the models' `Network::weights`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FromServer {
    pub generator_weights: Vec<Tensor>,
    pub discriminator_weights: Vec<Tensor>,
}

/// All the server state that must pass from round to round.
///
/// `aggregation_state` belongs to the aggregation process (a plain mean, or some
/// differentially private variant); the round logic only carries it along.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerState<A = ()> {
    pub generator_weights: Vec<Tensor>,
    pub discriminator_weights: Vec<Tensor>,
    pub counters: Counters,
    pub aggregation_state: A,
}

impl<A> ServerState<A> {
    /// The payload broadcast to the clients for the next round.
    pub fn from_server(&self) -> FromServer {
        FromServer {
            generator_weights: self.generator_weights.clone(),
            discriminator_weights: self.discriminator_weights.clone(),
        }
    }

    /// Shorthand for a counter value, zero when absent.
    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).unwrap_or_default()
    }
}

/// Data sent from a client back to the server, or the aggregate of many of them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientOutput {
    /// `trained - initial` for every discriminator variable.
    pub discriminator_weights_delta: Vec<Tensor>,
    /// The weight of this update when aggregating, zero for a diverged client.
    pub update_weight: f32,
    /// Metrics that are summed across clients.
    pub counters: Counters,
}

/// Returns the initial state of the server.
///
/// # Arguments
/// * `generator` - The freshly initialized generator.
/// * `discriminator` - The freshly initialized discriminator.
pub fn server_initial_state<A, G, D>(generator: &G, discriminator: &D) -> ServerState<A>
where
    A: Default,
    G: Network + ?Sized,
    D: Network + ?Sized,
{
    let counters = [
        (NUM_DISCRIMINATOR_TRAIN_EXAMPLES, 0),
        (NUM_GENERATOR_TRAIN_EXAMPLES, 0),
        (NUM_ROUNDS, 0),
    ]
    .into_iter()
    .collect();

    ServerState {
        generator_weights: tensor_utils::weights(generator),
        discriminator_weights: tensor_utils::weights(discriminator),
        counters,
        aggregation_state: A::default(),
    }
}
