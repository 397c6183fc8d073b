use std::{
    fs,
    num::NonZeroUsize,
    path::{Path, PathBuf},
};

use log::info;
use machine_learning::{arch::loss::WassersteinGanLossFns, optimization::GradientDescent};
use serde::{Deserialize, Serialize};

use crate::{
    train_fns::{
        create_train_discriminator_fn, create_train_generator_fn, PrecheckPolicy,
        TrainDiscriminator, TrainGenerator,
    },
    GanErr, Result,
};

/// The steps built by the round functions themselves.
pub type ClientStep = TrainDiscriminator<WassersteinGanLossFns, GradientDescent>;
pub type ServerStep = TrainGenerator<WassersteinGanLossFns, GradientDescent>;

/// Hyperparameters of the training steps run inside a round.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RoundConfig {
    /// The Wasserstein gradient penalty coefficient.
    pub grad_penalty_lambda: f32,
    /// Learning rate of the clients' discriminator optimizer.
    pub client_learning_rate: f32,
    /// Learning rate of the server's generator optimizer.
    pub server_learning_rate: f32,
    pub precheck: PrecheckPolicy,
    /// Seed for the gradient penalty interpolation points.
    pub seed: u64,
}

impl Default for RoundConfig {
    fn default() -> Self {
        Self {
            grad_penalty_lambda: 10.0,
            client_learning_rate: 0.0005,
            server_learning_rate: 0.005,
            precheck: PrecheckPolicy::Strict,
            seed: 0,
        }
    }
}

impl RoundConfig {
    /// Builds a fresh discriminator step for one client round.
    pub fn discriminator_step(&self) -> Result<ClientStep> {
        create_train_discriminator_fn(
            WassersteinGanLossFns::new(self.grad_penalty_lambda, self.seed),
            GradientDescent::new(self.client_learning_rate),
            self.precheck,
        )
    }

    /// Builds a fresh generator step for one server round.
    pub fn generator_step(&self) -> Result<ServerStep> {
        create_train_generator_fn(
            WassersteinGanLossFns::new(self.grad_penalty_lambda, self.seed),
            GradientDescent::new(self.server_learning_rate),
            self.precheck,
        )
    }

    /// Same config with another seed, so that every client samples its own points.
    pub fn with_seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.grad_penalty_lambda.is_finite() || self.grad_penalty_lambda < 0. {
            return Err(GanErr::InvalidConfig(format!(
                "grad_penalty_lambda must be a non-negative number, got {}",
                self.grad_penalty_lambda
            )));
        }

        for (name, lr) in [
            ("client_learning_rate", self.client_learning_rate),
            ("server_learning_rate", self.server_learning_rate),
        ] {
            if !lr.is_finite() || lr <= 0. {
                return Err(GanErr::InvalidConfig(format!(
                    "{name} must be positive, got {lr}"
                )));
            }
        }

        Ok(())
    }
}

/// Settings of the in-process federated training run by the binary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    pub round: RoundConfig,
    pub num_clients: NonZeroUsize,
    pub rounds: usize,
    pub batch_size: NonZeroUsize,
    /// Real examples held by each client.
    pub examples_per_client: usize,
    /// Generator input batches per client round.
    pub client_batches: usize,
    /// Generator input batches per server round.
    pub server_batches: usize,
    pub noise_dim: NonZeroUsize,
    pub data_dim: NonZeroUsize,
    pub hidden_size: NonZeroUsize,
    /// Learning rate of the optimizer applying the aggregated delta, 1.0 replaces the
    /// weights with `old + delta`.
    pub server_update_learning_rate: f32,
    pub seed: u64,
    pub checkpoint: Option<PathBuf>,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            round: RoundConfig::default(),
            num_clients: nonzero(4),
            rounds: 10,
            batch_size: nonzero(16),
            examples_per_client: 128,
            client_batches: 8,
            server_batches: 8,
            noise_dim: nonzero(2),
            data_dim: nonzero(2),
            hidden_size: nonzero(16),
            server_update_learning_rate: 1.0,
            seed: 0,
            checkpoint: None,
        }
    }
}

const fn nonzero(n: usize) -> NonZeroUsize {
    match NonZeroUsize::new(n) {
        Some(n) => n,
        None => NonZeroUsize::MIN,
    }
}

impl SimulationConfig {
    /// Reads a JSON config file, missing fields take their default values.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&raw)?;
        config.validate()?;

        info!("loaded simulation config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.round.validate()?;

        let lr = self.server_update_learning_rate;
        if !lr.is_finite() || lr <= 0. {
            return Err(GanErr::InvalidConfig(format!(
                "server_update_learning_rate must be positive, got {lr}"
            )));
        }

        if self.examples_per_client == 0 {
            return Err(GanErr::InvalidConfig(
                "examples_per_client must be greater than 0".into(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use machine_learning::optimization::Optimizer;

    use super::*;

    #[test]
    fn defaults_match_the_round_protocol() {
        let config = RoundConfig::default();
        assert_eq!(config.grad_penalty_lambda, 10.0);
        assert_eq!(config.client_learning_rate, 0.0005);
        assert_eq!(config.server_learning_rate, 0.005);
        assert_eq!(config.precheck, PrecheckPolicy::Strict);
    }

    #[test]
    fn partial_json_falls_back_to_defaults() {
        let config: SimulationConfig =
            serde_json::from_str(r#"{"rounds": 3, "round": {"precheck": "advisory"}}"#).unwrap();

        assert_eq!(config.rounds, 3);
        assert_eq!(config.round.precheck, PrecheckPolicy::Advisory);
        assert_eq!(config.round.grad_penalty_lambda, 10.0);
        assert_eq!(config.num_clients.get(), 4);
    }

    #[test]
    fn invalid_values_are_rejected() {
        let config = RoundConfig {
            client_learning_rate: 0.,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GanErr::InvalidConfig(_))));

        let config = RoundConfig {
            grad_penalty_lambda: f32::NAN,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(GanErr::InvalidConfig(_))));
    }

    #[test]
    fn fresh_steps_are_built_every_time() {
        let config = RoundConfig::default();
        let step = config.discriminator_step().unwrap();
        assert!(step.optimizer().is_pristine());
        assert_eq!(step.optimizer().learning_rate(), 0.0005);
        assert_eq!(step.loss_fns().grad_penalty_lambda(), 10.0);
    }
}
