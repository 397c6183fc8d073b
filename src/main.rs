use std::env;

use anyhow::Context;
use federated_gan::{
    checkpoint::{load_checkpoint, save_checkpoint},
    config::SimulationConfig,
    simulation::Simulation,
};
use log::info;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => SimulationConfig::load(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => SimulationConfig::default(),
    };

    let mut simulation = Simulation::from_config(&config)?;

    if let Some(path) = config.checkpoint.as_ref().filter(|p| p.exists()) {
        let state = load_checkpoint(path)
            .with_context(|| format!("failed to load checkpoint {}", path.display()))?;
        simulation.resume(state)?;
    }

    info!(
        "training with {} clients for {} rounds",
        config.num_clients, config.rounds
    );

    tokio::select! {
        ret = simulation.run(config.rounds) => {
            let state = ret?;
            info!("done: {}", state.counters);
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT, keeping the last completed round");
        }
    }

    if let Some(path) = &config.checkpoint {
        save_checkpoint(path, simulation.state())?;
    }

    Ok(())
}
