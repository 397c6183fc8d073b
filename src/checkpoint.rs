use std::{fs, path::Path};

use log::info;
use serde::{de::DeserializeOwned, Serialize};

use crate::{state::ServerState, Result};

/// Writes `state` to `path` as pretty printed JSON.
pub fn save_checkpoint<A: Serialize>(path: impl AsRef<Path>, state: &ServerState<A>) -> Result<()> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(state)?;
    fs::write(path, json)?;

    info!("checkpoint saved to {}", path.display());
    Ok(())
}

/// Reads back a state written by `save_checkpoint`.
pub fn load_checkpoint<A: DeserializeOwned>(path: impl AsRef<Path>) -> Result<ServerState<A>> {
    let path = path.as_ref();
    let json = fs::read_to_string(path)?;
    let state = serde_json::from_str(&json)?;

    info!("checkpoint loaded from {}", path.display());
    Ok(state)
}

#[cfg(test)]
mod tests {
    use std::env;

    use machine_learning::arch::{layers::Dense, Sequential};

    use super::*;
    use crate::{counters::NUM_ROUNDS, state::server_initial_state, GanErr};

    #[test]
    fn checkpoint_round_trip() {
        let generator = Sequential::new([Dense::new((2, 3), None)]).unwrap();
        let discriminator = Sequential::new([Dense::new((3, 1), None)]).unwrap();
        let mut state: ServerState = server_initial_state(&generator, &discriminator);
        state.counters.add(NUM_ROUNDS, 4);

        let path = env::temp_dir().join(format!("federated-gan-{}.json", std::process::id()));
        save_checkpoint(&path, &state).unwrap();
        let loaded: ServerState = load_checkpoint(&path).unwrap();
        fs::remove_file(&path).unwrap();

        assert_eq!(loaded, state);
        assert_eq!(loaded.counter(NUM_ROUNDS), 4);
    }

    #[test]
    fn missing_checkpoint_is_an_io_error() {
        let path = env::temp_dir().join("federated-gan-does-not-exist.json");
        let err = load_checkpoint::<()>(path);
        assert!(matches!(err, Err(GanErr::Io(_))));
    }
}
