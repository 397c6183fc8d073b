//! In-process federated training: every client runs on a blocking task, the server
//! aggregates their outputs and trains the generator.

use std::{f32::consts::TAU, num::NonZeroUsize, sync::Arc};

use futures::future::try_join_all;
use log::{debug, info};
use machine_learning::{
    arch::{activations::ActFn, layers::Dense, Sequential},
    initialization::ParamGen,
    optimization::GradientDescent,
};
use rand::{rngs::StdRng, SeedableRng};
use tokio::task;

use crate::{
    aggregation::{Aggregator, WeightedMean},
    client::client_computation,
    config::{RoundConfig, SimulationConfig},
    counters::NUM_ROUNDS,
    data::{InMemoryDataset, NoiseBatches},
    server::server_computation,
    state::{server_initial_state, ClientOutput, ServerState},
    tensor_utils, GanErr, Result,
};

/// Builds a fresh model, every call must return the same architecture.
pub type ModelFactory = Arc<dyn Fn() -> Result<Sequential> + Send + Sync>;

const REAL_DATA_STD_DEV: f32 = 0.25;
const REAL_DATA_RADIUS: f32 = 2.;

/// How many examples go into each round.
#[derive(Debug, Clone, Copy)]
pub struct RoundSizes {
    pub batch_size: NonZeroUsize,
    pub noise_dim: NonZeroUsize,
    pub client_batches: usize,
    pub server_batches: usize,
}

pub struct Simulation<Ag: Aggregator = WeightedMean> {
    state: ServerState<Ag::State>,
    generator: Sequential,
    discriminator: Sequential,
    server_disc_update_optimizer: GradientDescent,
    aggregator: Ag,
    clients: Vec<Arc<InMemoryDataset>>,
    make_generator: ModelFactory,
    make_discriminator: ModelFactory,
    round: RoundConfig,
    sizes: RoundSizes,
    seed: u64,
}

impl<Ag: Aggregator> Simulation<Ag> {
    /// Creates a new simulation starting from freshly built server models.
    ///
    /// # Arguments
    /// * `make_generator` - Builds the generator, for the server and for every client.
    /// * `make_discriminator` - Builds the discriminator, for the server and for every client.
    /// * `clients` - The real data of every client.
    /// * `aggregator` - Combines the client outputs of a round.
    /// * `round` - Hyperparameters of the training steps.
    /// * `sizes` - Batch sizes and batch counts of each round.
    /// * `server_update_learning_rate` - Learning rate applying the aggregated delta.
    /// * `seed` - Seed for the generator inputs.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        make_generator: ModelFactory,
        make_discriminator: ModelFactory,
        clients: Vec<InMemoryDataset>,
        aggregator: Ag,
        round: RoundConfig,
        sizes: RoundSizes,
        server_update_learning_rate: f32,
        seed: u64,
    ) -> Result<Self>
    where
        Ag::State: Default,
    {
        round.validate()?;
        if clients.is_empty() {
            return Err(GanErr::InvalidConfig("at least one client is required".into()));
        }

        let generator = make_generator()?;
        let discriminator = make_discriminator()?;
        if generator.input_size() != sizes.noise_dim.get() {
            return Err(GanErr::InvalidConfig(format!(
                "generator expects {} input features but the noise has {}",
                generator.input_size(),
                sizes.noise_dim
            )));
        }
        if generator.output_size() != discriminator.input_size() {
            return Err(GanErr::InvalidConfig(format!(
                "generator outputs {} features but the discriminator expects {}",
                generator.output_size(),
                discriminator.input_size()
            )));
        }
        let mut state: ServerState<Ag::State> = server_initial_state(&generator, &discriminator);
        state.aggregation_state = aggregator.initialize();

        Ok(Self {
            state,
            generator,
            discriminator,
            server_disc_update_optimizer: GradientDescent::new(server_update_learning_rate),
            aggregator,
            clients: clients.into_iter().map(Arc::new).collect(),
            make_generator,
            make_discriminator,
            round,
            sizes,
            seed,
        })
    }

    pub fn state(&self) -> &ServerState<Ag::State> {
        &self.state
    }

    pub fn generator(&self) -> &Sequential {
        &self.generator
    }

    pub fn discriminator(&self) -> &Sequential {
        &self.discriminator
    }

    /// Continues from a previously saved state.
    pub fn resume(&mut self, state: ServerState<Ag::State>) -> Result<()> {
        tensor_utils::assign_weights(
            "checkpoint generator weights",
            &mut self.generator,
            &state.generator_weights,
        )?;
        tensor_utils::assign_weights(
            "checkpoint discriminator weights",
            &mut self.discriminator,
            &state.discriminator_weights,
        )?;

        info!("resuming after {} round(s)", state.counter(NUM_ROUNDS));
        self.state = state;
        Ok(())
    }

    /// Runs a single round: every client in parallel, then aggregation and the server.
    pub async fn run_round(&mut self) -> Result<&ServerState<Ag::State>> {
        let round = self.state.counter(NUM_ROUNDS);
        let from_server = Arc::new(self.state.from_server());
        let sizes = self.sizes;

        let tasks = self.clients.iter().enumerate().map(|(i, dataset)| {
            let dataset = Arc::clone(dataset);
            let from_server = Arc::clone(&from_server);
            let make_generator = Arc::clone(&self.make_generator);
            let make_discriminator = Arc::clone(&self.make_discriminator);
            let seed = derive_seed(self.seed, round, i + 1);
            let config = self.round.with_seed(seed);

            let handle = task::spawn_blocking(move || -> Result<ClientOutput> {
                let mut generator = make_generator()?;
                let mut discriminator = make_discriminator()?;
                let gen_inputs = NoiseBatches::new(sizes.batch_size, sizes.noise_dim, seed)
                    .limit(sizes.client_batches);

                // Every round sees the client's examples in a new order.
                let mut dataset = InMemoryDataset::clone(&dataset);
                dataset.shuffle(&mut StdRng::seed_from_u64(seed));

                let output = client_computation(
                    gen_inputs,
                    dataset.batches(sizes.batch_size),
                    &from_server,
                    &mut generator,
                    &mut discriminator,
                    &config,
                )?;
                debug!("client {i} done with update weight {}", output.update_weight);
                Ok(output)
            });

            async move { handle.await.map_err(|e| GanErr::Task(e.to_string()))? }
        });
        let outputs = try_join_all(tasks).await?;

        let (client_output, aggregation_state) = self
            .aggregator
            .aggregate(&outputs, &self.state.aggregation_state)?;

        let seed = derive_seed(self.seed, round, 0);
        let gen_inputs = NoiseBatches::new(sizes.batch_size, sizes.noise_dim, seed)
            .limit(sizes.server_batches);

        self.state = server_computation(
            &self.state,
            gen_inputs,
            &client_output,
            &mut self.generator,
            &mut self.discriminator,
            &mut self.server_disc_update_optimizer,
            &self.round.with_seed(seed),
            aggregation_state,
        )?;

        Ok(&self.state)
    }

    /// Runs `rounds` rounds back to back.
    pub async fn run(&mut self, rounds: usize) -> Result<&ServerState<Ag::State>> {
        for _ in 0..rounds {
            self.run_round().await?;
        }
        Ok(&self.state)
    }
}

impl Simulation<WeightedMean> {
    /// Builds the toy setup described by `config`: small dense networks and clients
    /// holding gaussian blobs placed around a circle.
    pub fn from_config(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;

        let make_generator = generator_factory(config);
        let make_discriminator = discriminator_factory(config);

        let mut rng = StdRng::seed_from_u64(config.seed);
        let num_clients = config.num_clients.get();
        let clients = (0..num_clients)
            .map(|i| {
                let mean = blob_center(i, num_clients, config.data_dim.get());
                InMemoryDataset::normal(
                    config.examples_per_client,
                    &mean,
                    REAL_DATA_STD_DEV,
                    &mut rng,
                )
            })
            .collect::<Result<Vec<_>>>()?;

        let sizes = RoundSizes {
            batch_size: config.batch_size,
            noise_dim: config.noise_dim,
            client_batches: config.client_batches,
            server_batches: config.server_batches,
        };

        Self::new(
            make_generator,
            make_discriminator,
            clients,
            WeightedMean,
            config.round,
            sizes,
            config.server_update_learning_rate,
            config.seed,
        )
    }
}

fn generator_factory(config: &SimulationConfig) -> ModelFactory {
    let (noise_dim, hidden, data_dim) = (
        config.noise_dim.get(),
        config.hidden_size.get(),
        config.data_dim.get(),
    );
    let seed = config.seed;

    Arc::new(move || -> Result<Sequential> {
        let layers = [
            Dense::new((noise_dim, hidden), Some(ActFn::Tanh)),
            Dense::new((hidden, data_dim), None),
        ];
        let model = Sequential::initialized(
            layers,
            ParamGen::XavierUniform,
            &mut StdRng::seed_from_u64(seed),
        )?;
        Ok(model)
    })
}

fn discriminator_factory(config: &SimulationConfig) -> ModelFactory {
    let (data_dim, hidden) = (config.data_dim.get(), config.hidden_size.get());
    let seed = config.seed.wrapping_add(1);

    Arc::new(move || -> Result<Sequential> {
        let layers = [
            Dense::new((data_dim, hidden), Some(ActFn::leaky_relu(0.2))),
            Dense::new((hidden, 1), None),
        ];
        let model =
            Sequential::initialized(layers, ParamGen::Kaiming, &mut StdRng::seed_from_u64(seed))?;
        Ok(model)
    })
}

/// The center of the `i`-th of `n` blobs on a circle, in the first two dimensions.
fn blob_center(i: usize, n: usize, dim: usize) -> Vec<f32> {
    let angle = TAU * i as f32 / n as f32;
    let mut center = vec![0.; dim];
    center[0] = REAL_DATA_RADIUS * angle.cos();
    if dim > 1 {
        center[1] = REAL_DATA_RADIUS * angle.sin();
    }
    center
}

/// A distinct seed for every round and participant, the server being participant 0.
fn derive_seed(seed: u64, round: u64, participant: usize) -> u64 {
    seed.wrapping_add(round.wrapping_mul(1 << 20))
        .wrapping_add(participant as u64)
}
