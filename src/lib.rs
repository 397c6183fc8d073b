//! Round logic for training a GAN with federated learning.
//!
//! Clients train the discriminator on their private data and send back a weighted
//! delta; the server applies the aggregated delta and trains the generator.

pub mod aggregation;
pub mod checkpoint;
pub mod client;
pub mod config;
pub mod counters;
pub mod data;
pub mod error;
pub mod server;
pub mod simulation;
pub mod state;
pub mod tensor_utils;
pub mod train_fns;

pub use client::{client_computation, client_computation_with};
pub use error::{GanErr, Result};
pub use server::{server_computation, server_computation_with};
pub use state::{server_initial_state, ClientOutput, FromServer, ServerState};
pub use tensor_utils::zero_all_if_any_non_finite;
